//! Per-network forwarding database: MAC address to port, with ageing.

use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use codec::MacAddr;
use parking_lot::Mutex;

use crate::clock::Clock;

/// An entry ages out of the table once it has been this long since the
/// owning MAC was last seen as a frame source.
pub const DEFAULT_AGEING: Duration = Duration::from_secs(300);

struct Entry {
    port: u64,
    last_seen: Duration,
}

/// The MAC table for a single network identifier.
///
/// All operations take a single mutex over the whole map; the map is small
/// enough per network that a writer-biased single lock outperforms anything
/// fancier, and it keeps `Discard`'s erase-while-iterating safe by
/// construction.
pub struct Fdb {
    clock: Arc<dyn Clock>,
    ageing: Duration,
    entries: Mutex<HashMap<MacAddr, Entry>>,
}

impl Fdb {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ageing(clock, DEFAULT_AGEING)
    }

    pub fn with_ageing(clock: Arc<dyn Clock>, ageing: Duration) -> Self {
        Self {
            clock,
            ageing,
            entries: Mutex::new(HashMap::default()),
        }
    }

    /// Refreshes `mac`'s timestamp and port if present, else inserts it.
    /// Returns `true` if a new entry was created.
    pub fn insert(&self, port: u64, mac: MacAddr) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        match entries.get_mut(&mac) {
            Some(entry) => {
                entry.last_seen = now;
                entry.port = port;
                false
            }
            None => {
                entries.insert(mac, Entry { port, last_seen: now });
                true
            }
        }
    }

    /// Returns the port bound to `mac`, or `0` if absent or aged out. An
    /// aged entry is erased as a side effect of the lookup that discovers it.
    pub fn lookup(&self, mac: MacAddr) -> u64 {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get(&mac) else {
            return 0;
        };

        if now.saturating_sub(entry.last_seen) > self.ageing {
            entries.remove(&mac);
            return 0;
        }

        entry.port
    }

    /// Erases `mac` if present. Returns whether it existed.
    pub fn delete(&self, mac: MacAddr) -> bool {
        self.entries.lock().remove(&mac).is_some()
    }

    /// Erases every entry bound to `port`. Returns the number removed.
    pub fn discard(&self, port: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.port != port);
        before - entries.len()
    }

    /// Number of live entries, without pruning aged ones.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
