//! Pluggable frame compression (§6 codec interface).
//!
//! The core distributor never compresses or decompresses anything itself —
//! `COMPRESSED_ETHERNET_FRAME` payloads pass through the switch unopened.
//! Compression is purely a client-side, opt-in concern (`-c` flag),
//! expressed here as a narrow trait so the client worker doesn't care which
//! algorithm backs it.

/// A bound on the uncompressed frame size large enough for any MTU a client
/// is likely to configure; frames that don't fit are dropped rather than
/// truncated.
pub const MAX_FRAME_SIZE: usize = 9000;

pub trait FrameCodec: Send + Sync {
    /// Compresses `src` into `dst`, returning the number of bytes written.
    /// Returns `None` if the compressed output would not fit in `dst`.
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Option<usize>;

    /// Decompresses `src` into `dst`, returning the number of bytes written.
    /// Returns `None` on corrupt input or if the decompressed output would
    /// not fit in `dst`.
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Option<usize>;
}

#[cfg(feature = "compression")]
pub use lz4::Lz4FrameCodec;

#[cfg(feature = "compression")]
mod lz4 {
    use super::FrameCodec;

    /// LZ4 block-format codec, matching the "optional LZ4 frame compression"
    /// callout in spec.md §1.
    #[derive(Default)]
    pub struct Lz4FrameCodec;

    impl FrameCodec for Lz4FrameCodec {
        fn compress(&self, src: &[u8], dst: &mut [u8]) -> Option<usize> {
            lz4_flex::block::compress_into(src, dst).ok()
        }

        fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Option<usize> {
            lz4_flex::block::decompress_into(src, dst).ok()
        }
    }

}
