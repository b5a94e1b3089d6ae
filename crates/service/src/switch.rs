//! Switch fabric: port↔network bindings, source learning, and forwarding.
//!
//! The switch never touches a socket. It resolves ports to a destination set
//! and hands frames to a [`Sender`] the caller supplies — an identifier-based
//! callback boundary, not a reference to the registry, so there is no cycle
//! between the two.

use std::sync::Arc;

use ahash::{HashMap, HashSet};
use codec::ethernet::{EthernetView, MIN_FRAME_LEN};
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::fdb::Fdb;

/// `0` is reserved to mean "no network" — a port with no binding.
pub const NO_NETWORK: u32 = 0;

/// Delivers a frame to a single resolved port. The switch never inspects or
/// retains the frame after this call returns.
pub trait Sender: Send + Sync {
    fn send(&self, port: u64, frame: &[u8]);
}

#[derive(Default)]
struct Bindings {
    port_to_network: HashMap<u64, u32>,
    network_to_ports: HashMap<u32, HashSet<u64>>,
}

/// The full switch fabric: bindings plus one FDB per live network.
pub struct Switch {
    clock: Arc<dyn Clock>,
    bindings: RwLock<Bindings>,
    fdbs: RwLock<HashMap<u32, Arc<Fdb>>>,
}

impl Switch {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            bindings: RwLock::new(Bindings::default()),
            fdbs: RwLock::new(HashMap::default()),
        }
    }

    fn fdb_for(&self, network: u32) -> Arc<Fdb> {
        if let Some(fdb) = self.fdbs.read().get(&network) {
            return fdb.clone();
        }

        self.fdbs
            .write()
            .entry(network)
            .or_insert_with(|| Arc::new(Fdb::new(self.clock.clone())))
            .clone()
    }

    /// Binds `port` into `network`. A rebind first flushes the port's FDB
    /// entries in the *old* network. No-op if already bound to `network`.
    pub fn plug(&self, network: u32, port: u64) {
        let mut bindings = self.bindings.write();

        if bindings.port_to_network.get(&port) == Some(&network) {
            return;
        }

        if let Some(old_network) = bindings.port_to_network.remove(&port) {
            if let Some(ports) = bindings.network_to_ports.get_mut(&old_network) {
                ports.remove(&port);
            }
            self.fdb_for(old_network).discard(port);
        }

        bindings.port_to_network.insert(port, network);
        bindings
            .network_to_ports
            .entry(network)
            .or_default()
            .insert(port);
    }

    /// Unbinds `port`, flushing its FDB entries in its (former) network.
    /// Returns whether it had been bound.
    pub fn unplug(&self, port: u64) -> bool {
        let mut bindings = self.bindings.write();

        let Some(network) = bindings.port_to_network.remove(&port) else {
            return false;
        };

        if let Some(ports) = bindings.network_to_ports.get_mut(&network) {
            ports.remove(&port);
        }
        drop(bindings);

        self.fdb_for(network).discard(port);
        true
    }

    /// Purges `port`'s FDB entries without touching the binding itself.
    pub fn flush_fdb(&self, port: u64) {
        let Some(network) = self.bindings.read().port_to_network.get(&port).copied() else {
            return;
        };
        self.fdb_for(network).discard(port);
    }

    pub fn network_of(&self, port: u64) -> Option<u32> {
        self.bindings.read().port_to_network.get(&port).copied()
    }

    /// Drops every binding and every FDB.
    pub fn reset(&self) {
        *self.bindings.write() = Bindings::default();
        self.fdbs.write().clear();
    }

    /// Learns the source, resolves the destination, and calls `sender` for
    /// each outgoing port. Returns `false` if `src_port` is unbound — the
    /// caller's signal to prompt a fresh association — and performs no send
    /// in that case.
    pub fn forward(&self, src_port: u64, frame: &[u8], sender: &dyn Sender) -> bool {
        if frame.len() < MIN_FRAME_LEN {
            return self.network_of(src_port).is_some();
        }

        let Some(network) = self.network_of(src_port) else {
            return false;
        };

        let Some(view) = EthernetView::parse(frame) else {
            return true;
        };

        let fdb = self.fdb_for(network);

        if !view.source().is_broadcast() {
            fdb.insert(src_port, view.source());
        }

        if !view.destination().is_broadcast() {
            let port = fdb.lookup(view.destination());
            if port != 0 {
                sender.send(port, frame);
                return true;
            }
        }

        self.flood(network, src_port, frame, sender);
        true
    }

    fn flood(&self, network: u32, src_port: u64, frame: &[u8], sender: &dyn Sender) {
        let ports: Vec<u64> = match self.bindings.read().network_to_ports.get(&network) {
            Some(ports) => ports.iter().copied().collect(),
            None => return,
        };

        for port in ports {
            if port != src_port {
                sender.send(port, frame);
            }
        }
    }
}
