//! Client registry: dual-indexed socket-address↔port mapping plus per-client
//! liveness bookkeeping and the send path the switch calls back into.
//!
//! Port ids come from a plain [`AtomicU64`] counter seeded at 1, not the
//! bitmap allocator the teacher crate uses for its relay ports — that
//! allocator recycles freed values, which would violate the "strictly
//! increasing, never reused" rule this registry is built to.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use codec::message::Message;
use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::switch::Sender;

/// `0` is reserved as "invalid / not found".
pub const INVALID_PORT: u64 = 0;

/// Per-client liveness and send-buffer state.
pub struct Client {
    pub address: SocketAddr,
    pub port: u64,
    last_seen: Mutex<Duration>,
    last_sent: Mutex<Duration>,
}

impl Client {
    fn new(address: SocketAddr, port: u64, now: Duration) -> Self {
        Self {
            address,
            port,
            last_seen: Mutex::new(now),
            last_sent: Mutex::new(now),
        }
    }

    pub fn touch_seen(&self, now: Duration) {
        *self.last_seen.lock() = now;
    }

    pub fn touch_sent(&self, now: Duration) {
        *self.last_sent.lock() = now;
    }

    pub fn age_seen(&self, now: Duration) -> Duration {
        now.saturating_sub(*self.last_seen.lock())
    }

    pub fn age_sent(&self, now: Duration) -> Duration {
        now.saturating_sub(*self.last_sent.lock())
    }
}

/// Delivers an encoded datagram to the socket address bound to `port`. The
/// registry itself never owns a socket; whatever wires up the real UDP
/// transport implements this.
pub trait Transport: Send + Sync {
    fn deliver(&self, address: SocketAddr, datagram: &[u8]);
}

struct Indexes {
    by_address: HashMap<SocketAddr, u64>,
    by_port: HashMap<u64, Arc<Client>>,
}

impl Default for Indexes {
    fn default() -> Self {
        Self {
            by_address: HashMap::default(),
            by_port: HashMap::default(),
        }
    }
}

/// The server-side client set, indexed both ways, plus the outgoing send
/// path the switch fabric calls into through [`Sender`].
pub struct Registry {
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    next_port: AtomicU64,
    indexes: RwLock<Indexes>,
    scratch: Mutex<bytes::BytesMut>,
}

impl Registry {
    pub fn new(clock: Arc<dyn Clock>, transport: Arc<dyn Transport>) -> Self {
        Self {
            clock,
            transport,
            next_port: AtomicU64::new(1),
            indexes: RwLock::new(Indexes::default()),
            scratch: Mutex::new(bytes::BytesMut::with_capacity(codec::MAX_DATAGRAM_SIZE)),
        }
    }

    /// Like [`Registry::get_or_create`], but also reports whether the
    /// client was just created — the dispatcher needs this to decide
    /// whether to solicit an association.
    pub fn get_or_create_reporting_new(&self, address: SocketAddr) -> (Arc<Client>, bool) {
        if let Some(client) = self.by_address(&address) {
            return (client, false);
        }

        let client = self.get_or_create(address);
        (client, true)
    }

    /// Returns the existing client for `address`, or creates one with the
    /// next monotonic port id.
    pub fn get_or_create(&self, address: SocketAddr) -> Arc<Client> {
        {
            let indexes = self.indexes.read();
            if let Some(client) = indexes
                .by_address
                .get(&address)
                .and_then(|port| indexes.by_port.get(port))
            {
                return client.clone();
            }
        }

        let mut indexes = self.indexes.write();
        if let Some(client) = indexes
            .by_address
            .get(&address)
            .and_then(|port| indexes.by_port.get(port))
        {
            return client.clone();
        }

        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(Client::new(address, port, self.clock.now()));

        indexes.by_address.insert(address, port);
        indexes.by_port.insert(port, client.clone());

        client
    }

    pub fn by_port(&self, port: u64) -> Option<Arc<Client>> {
        self.indexes.read().by_port.get(&port).cloned()
    }

    pub fn by_address(&self, address: &SocketAddr) -> Option<Arc<Client>> {
        let port = *self.indexes.read().by_address.get(address)?;
        self.indexes.read().by_port.get(&port).cloned()
    }

    /// Removes a client from both indexes. The caller is responsible for
    /// unplugging it from the switch first.
    pub fn remove(&self, port: u64) -> Option<Arc<Client>> {
        let mut indexes = self.indexes.write();
        let client = indexes.by_port.remove(&port)?;
        indexes.by_address.remove(&client.address);
        Some(client)
    }

    pub fn len(&self) -> usize {
        self.indexes.read().by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ports(&self) -> Vec<u64> {
        self.indexes.read().by_port.keys().copied().collect()
    }

    fn send_message(&self, port: u64, message: &Message<'_>) {
        let Some(client) = self.by_port(port) else {
            return;
        };

        let mut buf = self.scratch.lock();
        message.encode(&mut buf);
        self.transport.deliver(client.address, &buf);
        client.touch_sent(self.clock.now());
    }

    pub fn send_disconnect(&self, port: u64) {
        self.send_message(port, &Message::Disconnect);
    }

    pub fn send_keepalive(&self, port: u64) {
        self.send_message(port, &Message::KeepaliveRequest);
    }

    pub fn ack_keepalive(&self, port: u64) {
        self.send_message(port, &Message::KeepaliveRespond);
    }

    pub fn send_need_association(&self, port: u64) {
        self.send_message(port, &Message::NeedAssociation);
    }

    pub fn ack_associate(&self, port: u64) {
        self.send_message(port, &Message::AssociateRespond);
    }

    pub fn write_frame(&self, port: u64, frame: &[u8]) {
        self.send_message(port, &Message::EthernetFrame(frame));
    }
}

/// Adapts the registry's `write_frame` as the switch fabric's [`Sender`]
/// hook, so `Switch::forward` never has to know the registry exists.
impl Sender for Registry {
    fn send(&self, port: u64, frame: &[u8]) {
        self.write_frame(port, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use parking_lot::Mutex as PMutex;

    struct RecordingTransport(PMutex<Vec<(SocketAddr, Vec<u8>)>>);

    impl RecordingTransport {
        fn new() -> Self {
            Self(PMutex::new(Vec::new()))
        }
    }

    impl Transport for RecordingTransport {
        fn deliver(&self, address: SocketAddr, datagram: &[u8]) {
            self.0.lock().push((address, datagram.to_vec()));
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn registry() -> (Registry, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        (
            Registry::new(Arc::new(ManualClock::new()), transport.clone()),
            transport,
        )
    }

    #[test]
    fn ports_are_monotonic_and_never_reused() {
        let (registry, _t) = registry();
        let a = registry.get_or_create(addr(1));
        let b = registry.get_or_create(addr(2));
        assert_eq!(a.port, 1);
        assert_eq!(b.port, 2);

        registry.remove(a.port);
        let c = registry.get_or_create(addr(3));
        assert_eq!(c.port, 3, "freed port 1 must not be recycled");
    }

    #[test]
    fn get_or_create_is_stable_for_the_same_address() {
        let (registry, _t) = registry();
        let a = registry.get_or_create(addr(1));
        let a_again = registry.get_or_create(addr(1));
        assert_eq!(a.port, a_again.port);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_clears_both_indexes() {
        let (registry, _t) = registry();
        let a = registry.get_or_create(addr(1));
        assert!(registry.remove(a.port).is_some());
        assert!(registry.by_port(a.port).is_none());
        assert!(registry.by_address(&a.address).is_none());
    }

    #[test]
    fn send_message_updates_last_sent_and_delivers_to_the_right_address() {
        let (registry, transport) = registry();
        let client = registry.get_or_create(addr(1));
        registry.send_keepalive(client.port);

        let sent = transport.0.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, client.address);
        assert_eq!(&sent[0].1[..3], &[0x5E, 0xED, 3]);
    }

    #[test]
    fn sending_to_a_removed_port_is_a_silent_no_op() {
        let (registry, transport) = registry();
        registry.send_keepalive(999);
        assert!(transport.0.lock().is_empty());
    }
}
