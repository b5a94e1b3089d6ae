//! Ingest-loop message dispatch: one call per inbound datagram, deciding
//! what it means for the client registry and the switch fabric.
//!
//! Mirrors the teacher's `PacketForwarder` shape (decode once, match on the
//! decoded message, mutate state, optionally emit a reply) but the reply is
//! sent directly through the registry rather than returned, since there is
//! no per-message correlation id to thread back through here.

use std::net::SocketAddr;
use std::sync::Arc;

use codec::message::Message;

use crate::clock::Clock;
use crate::registry::Registry;
use crate::switch::Switch;

/// Decompresses a `COMPRESSED_ETHERNET_FRAME` payload into `scratch`,
/// returning the decompressed length, or `None` on corrupt input.
///
/// The core distributor doesn't ship a decompressor of its own — see
/// `codec::compression` for the client-side counterpart — so this is a
/// narrow seam a caller can wire a real codec into. Absent that, compressed
/// frames are dropped, which matches §7's "compression failure: drop that
/// frame only".
pub trait FrameDecompressor: Send + Sync {
    fn decompress(&self, compressed: &[u8], scratch: &mut [u8]) -> Option<usize>;
}

/// A decompressor that always fails, for servers that never advertise
/// compression support.
pub struct NoDecompression;

impl FrameDecompressor for NoDecompression {
    fn decompress(&self, _compressed: &[u8], _scratch: &mut [u8]) -> Option<usize> {
        None
    }
}

/// Adapts any `codec::compression::FrameCodec` (e.g. the LZ4 implementation)
/// into a [`FrameDecompressor`], so the dispatcher calls `decompress` without
/// depending on which compression algorithm the caller picked.
pub struct CodecDecompressor<C>(pub C);

impl<C: codec::compression::FrameCodec> FrameDecompressor for CodecDecompressor<C> {
    fn decompress(&self, compressed: &[u8], scratch: &mut [u8]) -> Option<usize> {
        self.0.decompress(compressed, scratch)
    }
}

pub struct Dispatcher {
    clock: Arc<dyn Clock>,
    registry: Arc<Registry>,
    switch: Arc<Switch>,
    decompressor: Arc<dyn FrameDecompressor>,
}

impl Dispatcher {
    pub fn new(clock: Arc<dyn Clock>, registry: Arc<Registry>, switch: Arc<Switch>) -> Self {
        Self::with_decompressor(clock, registry, switch, Arc::new(NoDecompression))
    }

    pub fn with_decompressor(
        clock: Arc<dyn Clock>,
        registry: Arc<Registry>,
        switch: Arc<Switch>,
        decompressor: Arc<dyn FrameDecompressor>,
    ) -> Self {
        Self {
            clock,
            registry,
            switch,
            decompressor,
        }
    }

    /// Handles one inbound datagram from `address`. Never panics on
    /// attacker-controlled input; malformed datagrams are logged and
    /// dropped.
    pub fn handle(&self, address: SocketAddr, datagram: &[u8]) {
        let message = match codec::decode(datagram) {
            Ok(message) => message,
            Err(error) => {
                log::warn!("dispatch: dropping malformed datagram from {address}: {error}");
                return;
            }
        };

        let (client, is_new) = self.registry.get_or_create_reporting_new(address);

        if is_new {
            log::info!("dispatch: new client {address} assigned port {}", client.port);
            self.registry.send_need_association(client.port);
        }

        // Disconnect and server-only message types ("unexpected type for
        // state", §7) are excluded: neither may keep a misbehaving peer's
        // last-seen timestamp alive.
        let touches_last_seen = !matches!(
            message,
            Message::Disconnect | Message::AssociateRespond | Message::NeedAssociation
        );
        if touches_last_seen {
            client.touch_seen(self.clock.now());
        }

        match message {
            Message::EthernetFrame(frame) => self.handle_frame(client.port, frame),
            Message::CompressedEthernetFrame(compressed) => {
                self.handle_compressed_frame(client.port, compressed)
            }
            Message::AssociateRequest(network) => {
                self.switch.plug(network, client.port);
                self.registry.ack_associate(client.port);
            }
            Message::KeepaliveRequest => self.registry.ack_keepalive(client.port),
            Message::KeepaliveRespond => {}
            Message::Disconnect => {
                self.switch.unplug(client.port);
                self.registry.remove(client.port);
            }
            Message::AssociateRespond | Message::NeedAssociation => {
                log::warn!("dispatch: {address} sent a server-only message type, dropping");
            }
        }
    }

    fn handle_frame(&self, port: u64, frame: &[u8]) {
        if !self.switch.forward(port, frame, self.registry.as_ref()) {
            self.registry.send_need_association(port);
        }
    }

    fn handle_compressed_frame(&self, port: u64, compressed: &[u8]) {
        let mut scratch = [0u8; codec::compression::MAX_FRAME_SIZE];
        match self.decompressor.decompress(compressed, &mut scratch) {
            Some(len) => self.handle_frame(port, &scratch[..len]),
            None => log::warn!("dispatch: dropping undecompressable frame from port {port}"),
        }
    }
}
