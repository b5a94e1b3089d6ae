//! Server-side building blocks for the distributor: the forwarding database,
//! the switch fabric, the client registry, the scavenger, and the dispatch
//! table that ties a decoded datagram to all three.
//!
//! This crate has no socket of its own — see the top-level binary crate for
//! the UDP transport loop. Everything here is plain, synchronously-locked
//! state plus callback boundaries ([`switch::Sender`], [`registry::Transport`])
//! so it can be exercised without a real network in tests.

pub mod clock;
pub mod dispatch;
pub mod fdb;
pub mod registry;
pub mod scavenger;
pub mod switch;

use std::net::SocketAddr;
use std::sync::Arc;

pub use clock::{Clock, SystemClock};
pub use dispatch::Dispatcher;
pub use fdb::Fdb;
pub use registry::{Registry, Transport};
pub use scavenger::Scavenger;
pub use switch::{Sender, Switch};

/// The distributor core: one dispatcher, one scavenger, sharing one
/// registry and one switch. Owns no socket and no task — the binary crate
/// drives `dispatch` per datagram and `scavenge` on a 1s tick.
pub struct Distributor {
    pub registry: Arc<Registry>,
    pub switch: Arc<Switch>,
    pub dispatcher: Dispatcher,
    pub scavenger: Scavenger,
}

impl Distributor {
    pub fn new(clock: Arc<dyn Clock>, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(Registry::new(clock.clone(), transport));
        let switch = Arc::new(Switch::new(clock.clone()));
        let dispatcher = Dispatcher::new(clock.clone(), registry.clone(), switch.clone());
        let scavenger = Scavenger::new(clock, registry.clone(), switch.clone());

        Self {
            registry,
            switch,
            dispatcher,
            scavenger,
        }
    }

    /// Like [`Distributor::new`], but with a real `FrameDecompressor` wired
    /// in so `COMPRESSED_ETHERNET_FRAME` datagrams are decompressed and
    /// forwarded rather than dropped (§4.5).
    pub fn with_decompressor(
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
        decompressor: Arc<dyn dispatch::FrameDecompressor>,
    ) -> Self {
        let registry = Arc::new(Registry::new(clock.clone(), transport));
        let switch = Arc::new(Switch::new(clock.clone()));
        let dispatcher =
            Dispatcher::with_decompressor(clock.clone(), registry.clone(), switch.clone(), decompressor);
        let scavenger = Scavenger::new(clock, registry.clone(), switch.clone());

        Self {
            registry,
            switch,
            dispatcher,
            scavenger,
        }
    }

    /// Handles one inbound datagram. Equivalent to `self.dispatcher.handle`.
    pub fn dispatch(&self, address: SocketAddr, datagram: &[u8]) {
        self.dispatcher.handle(address, datagram);
    }

    /// Runs one scavenger sweep. Equivalent to `self.scavenger.sweep`.
    pub fn scavenge(&self) -> Vec<u64> {
        self.scavenger.sweep()
    }

    /// Drops every client, binding, and FDB entry. Sockets and tasks are
    /// the binary crate's concern; this only clears in-memory state.
    pub fn reset(&self) {
        for port in self.registry.ports() {
            self.registry.remove(port);
        }
        self.switch.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use bytes::BytesMut;
    use codec::message::Message;
    use parking_lot::Mutex;

    struct RecordingTransport(Mutex<Vec<(SocketAddr, Vec<u8>)>>);

    impl RecordingTransport {
        fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }

        fn sent_to(&self, address: SocketAddr) -> Vec<Vec<u8>> {
            self.0
                .lock()
                .iter()
                .filter(|(a, _)| *a == address)
                .map(|(_, bytes)| bytes.clone())
                .collect()
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

    fn encode(message: Message<'_>) -> BytesMut {
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        buf
    }

    fn frame(src: [u8; 6], dst: [u8; 6]) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[0..6].copy_from_slice(&dst);
        frame[6..12].copy_from_slice(&src);
        frame
    }

    /// End-to-end scenario 1 from the testable-properties list: unicast
    /// learning between two associated clients, with a third joining later.
    #[test]
    fn unicast_learning_scenario() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(RecordingTransport::new());
        let distributor = Distributor::new(clock, transport.clone());

        distributor.dispatch(addr(1), &encode(Message::AssociateRequest(7)));
        distributor.dispatch(addr(2), &encode(Message::AssociateRequest(7)));

        let a = distributor.registry.by_address(&addr(1)).unwrap().port;
        let b = distributor.registry.by_address(&addr(2)).unwrap().port;

        let mac_a = [0xAA; 6];
        let mac_b = [0xBB; 6];

        // A -> B, unknown destination: floods, B learns A.
        distributor.dispatch(addr(1), &encode(Message::EthernetFrame(&frame(mac_a, mac_b))));
        assert_eq!(transport.sent_to(addr(2)).last().unwrap()[2], 0);

        // B -> A: now unicast, since A was learned.
        distributor.dispatch(addr(2), &encode(Message::EthernetFrame(&frame(mac_b, mac_a))));
        let to_a = transport.sent_to(addr(1));
        assert_eq!(to_a.last().unwrap()[2], 0);

        // C joins and sends to A: unicast too.
        distributor.dispatch(addr(3), &encode(Message::AssociateRequest(7)));
        let c = distributor.registry.by_address(&addr(3)).unwrap().port;
        let to_b_before_c = transport.sent_to(addr(2)).len();
        distributor.dispatch(addr(3), &encode(Message::EthernetFrame(&frame([0xCC; 6], mac_a))));

        let to_a_after_c = transport.sent_to(addr(1));
        assert_eq!(to_a_after_c.len(), to_a.len() + 1);

        // B should not have received C's frame to A (unicast, not flood).
        assert_eq!(transport.sent_to(addr(2)).len(), to_b_before_c);

        let _ = (a, b, c);
    }

    /// Scenario 2: two networks never see each other's broadcasts.
    #[test]
    fn network_isolation_scenario() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(RecordingTransport::new());
        let distributor = Distributor::new(clock, transport.clone());

        distributor.dispatch(addr(1), &encode(Message::AssociateRequest(7)));
        distributor.dispatch(addr(2), &encode(Message::AssociateRequest(8)));

        distributor.dispatch(
            addr(1),
            &encode(Message::EthernetFrame(&frame([0xAA; 6], [0xFF; 6]))),
        );

        assert!(transport.sent_to(addr(2)).is_empty());
    }

    /// Scenario 6: a disconnect then a frame from the same address re-triggers
    /// association, dropping the frame until the client re-associates.
    #[test]
    fn reassociation_prompt_scenario() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(RecordingTransport::new());
        let distributor = Distributor::new(clock, transport.clone());

        distributor.dispatch(addr(1), &encode(Message::AssociateRequest(7)));
        let first_port = distributor.registry.by_address(&addr(1)).unwrap().port;

        distributor.dispatch(addr(1), &encode(Message::Disconnect));
        assert!(distributor.registry.by_address(&addr(1)).is_none());

        distributor.dispatch(
            addr(1),
            &encode(Message::EthernetFrame(&frame([0xAA; 6], [0xBB; 6]))),
        );

        let second_port = distributor.registry.by_address(&addr(1)).unwrap().port;
        assert_ne!(first_port, second_port, "a fresh port must be issued");
        assert_eq!(
            distributor.switch.network_of(second_port),
            None,
            "the frame must not have implicitly re-associated the port"
        );
    }

    #[test]
    fn reset_clears_everything() {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(RecordingTransport::new());
        let distributor = Distributor::new(clock, transport);

        distributor.dispatch(addr(1), &encode(Message::AssociateRequest(7)));
        distributor.reset();

        assert!(distributor.registry.is_empty());
        assert_eq!(distributor.switch.network_of(1), None);
    }
}
