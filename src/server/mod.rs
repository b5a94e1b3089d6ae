//! UDP transport loop: reads datagrams, hands them to the distributor core,
//! and drains an outbox of replies back onto the socket.
//!
//! Mirrors `fork_socket` from the teacher's UDP server loop (bind once,
//! `Arc<UdpSocket>`, `recv_from` in a loop, log-and-continue on transient
//! I/O errors) but splits send off into its own task so [`service::Transport`]
//! stays a synchronous callback the dispatcher and scavenger can call
//! without going through `.await`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use service::clock::SystemClock;
use service::dispatch::CodecDecompressor;
use service::{Distributor, Transport};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;

const RECV_BUFFER_SIZE: usize = 65_536;

/// Adapts the distributor's synchronous [`Transport`] hook onto an async
/// UDP socket: `deliver` just enqueues, a separate task drains the queue
/// with real `send_to` calls.
struct UdpTransport {
    outbox: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl Transport for UdpTransport {
    fn deliver(&self, address: SocketAddr, datagram: &[u8]) {
        if self.outbox.send((address, datagram.to_vec())).is_err() {
            log::warn!("vswitch: dropping datagram to {address}: outbox closed");
        }
    }
}

async fn drain_outbox(socket: Arc<UdpSocket>, mut outbox: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>) {
    while let Some((address, datagram)) = outbox.recv().await {
        if let Err(error) = socket.send_to(&datagram, address).await {
            log::warn!("vswitch: udp send error to {address}: {error}");
        }
    }
}

async fn ingest_loop(socket: Arc<UdpSocket>, distributor: Arc<Distributor>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let (size, address) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(error) => {
                log::warn!("vswitch: udp recv error: {error}");
                continue;
            }
        };

        distributor.dispatch(address, &buf[..size]);
    }
}

async fn scavenge_loop(distributor: Arc<Distributor>) {
    let mut ticker = tokio::time::interval(service::scavenger::SWEEP_INTERVAL);

    loop {
        ticker.tick().await;
        let evicted = distributor.scavenge();
        if !evicted.is_empty() {
            log::info!("vswitch: scavenger evicted {} client(s)", evicted.len());
        }
    }
}

/// Owns the socket and the three background tasks (ingest, outbox drain,
/// scavenger). Dropping or calling [`Server::stop`] is the single release
/// point for all of them, and `stop` is idempotent — aborting an
/// already-aborted handle is a no-op.
pub struct Server {
    pub distributor: Arc<Distributor>,
    ingest: JoinHandle<()>,
    outbox: JoinHandle<()>,
    scavenger: JoinHandle<()>,
}

impl Server {
    pub async fn bind(config: &Config) -> Result<Self> {
        let socket = Arc::new(
            UdpSocket::bind(config.socket_addr())
                .await
                .with_context(|| format!("binding udp socket on {}", config.socket_addr()))?,
        );

        let (sender, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(UdpTransport { outbox: sender });
        let decompressor = Arc::new(CodecDecompressor(codec::compression::Lz4FrameCodec));
        let distributor = Arc::new(Distributor::with_decompressor(
            Arc::new(SystemClock::default()),
            transport,
            decompressor,
        ));

        log::info!("vswitch: listening on {}", config.socket_addr());

        let ingest = tokio::spawn(ingest_loop(socket.clone(), distributor.clone()));
        let outbox = tokio::spawn(drain_outbox(socket, receiver));
        let scavenger = tokio::spawn(scavenge_loop(distributor.clone()));

        Ok(Self {
            distributor,
            ingest,
            outbox,
            scavenger,
        })
    }

    /// Stops every background task. Safe to call more than once.
    pub fn stop(&self) {
        self.ingest.abort();
        self.outbox.abort();
        self.scavenger.abort();
    }

    /// Blocks until SIGINT or SIGTERM, then stops the server.
    pub async fn run_until_signal(&self) -> Result<()> {
        wait_for_shutdown_signal().await?;
        log::info!("vswitch: shutdown signal received");
        self.stop();
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
