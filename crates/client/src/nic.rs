//! The virtual NIC capability the client core consumes (§6): a TAP device
//! on real hardware, or an in-memory socket-pair stand-in for tests.

use async_trait::async_trait;

/// Blocking read/write of whole Ethernet frames. `Start`/`Stop` from the
/// original interface collapse into construction and `Drop` here — there is
/// nothing left to do once the underlying device is open.
#[async_trait]
pub trait Nic: Send + Sync {
    /// Reads one frame. `Ok(0)` means the device yielded an empty frame and
    /// should be treated like any other read, not EOF.
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Writes one frame, best-effort.
    async fn write(&self, frame: &[u8]) -> std::io::Result<usize>;
}

/// An in-memory NIC backed by a pair of channels, standing in for a real
/// TAP device in tests: whatever is sent on `inbound` is what `read` yields,
/// and whatever `write` sends is observable on `outbound`.
pub struct PairDevice {
    inbound: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<Vec<u8>>>,
    outbound: tokio::sync::mpsc::Sender<Vec<u8>>,
}

impl PairDevice {
    /// Returns the device plus the two channel halves a test uses to drive
    /// it: `inject` feeds frames as if they arrived from the kernel, `capture`
    /// receives frames the client wrote out.
    pub fn new_pair() -> (Self, tokio::sync::mpsc::Sender<Vec<u8>>, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let (inject_tx, inject_rx) = tokio::sync::mpsc::channel(64);
        let (capture_tx, capture_rx) = tokio::sync::mpsc::channel(64);

        let device = Self {
            inbound: tokio::sync::Mutex::new(inject_rx),
            outbound: capture_tx,
        };

        (device, inject_tx, capture_rx)
    }
}

#[async_trait]
impl Nic for PairDevice {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    async fn write(&self, frame: &[u8]) -> std::io::Result<usize> {
        let _ = self.outbound.send(frame.to_vec()).await;
        Ok(frame.len())
    }
}

#[cfg(unix)]
pub use tap::TapDevice;

#[cfg(unix)]
mod tap {
    use super::Nic;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use tun::AsyncDevice;

    /// A real TAP device, opened and brought up at construction time;
    /// failure here is the "resource exhaustion on startup" case from §7
    /// and is fatal, not retried.
    pub struct TapDevice {
        device: Mutex<AsyncDevice>,
    }

    impl TapDevice {
        pub fn open(name: &str, mtu: u16) -> anyhow::Result<Self> {
            let mut config = tun::Configuration::default();
            config.name(name).mtu(mtu as i32).layer(tun::Layer::L2).up();

            let device = tun::create_as_async(&config)?;
            Ok(Self { device: Mutex::new(device) })
        }
    }

    #[async_trait]
    impl Nic for TapDevice {
        async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            use tokio::io::AsyncReadExt;
            self.device.lock().await.read(buf).await
        }

        async fn write(&self, frame: &[u8]) -> std::io::Result<usize> {
            use tokio::io::AsyncWriteExt;
            self.device.lock().await.write(frame).await
        }
    }
}
