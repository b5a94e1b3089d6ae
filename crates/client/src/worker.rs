//! Client core: the socket worker, NIC worker, and pinger tasks, plus the
//! state transitions that tie them together.
//!
//! Three logical threads in the original source become three tokio tasks
//! here, each cooperatively cancelled by a `watch` channel rather than a
//! self-pipe — the async equivalent the design notes call out as
//! acceptable provided every blocking point stays interruptible.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use codec::compression::{FrameCodec, MAX_FRAME_SIZE};
use codec::message::Message;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::nic::Nic;
use crate::state::State;

/// Idle period after which the client probes the server.
pub const KEEPALIVE: Duration = Duration::from_secs(60);
/// Silence beyond `KEEPALIVE * RETRIES` means the server is gone.
pub const RETRIES: u32 = 3;
const PING_INTERVAL: Duration = Duration::from_secs(1);
const RECV_BUFFER_SIZE: usize = 65_536;

/// The client's connection to one distributor.
pub struct Client {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    nic: Arc<dyn Nic>,
    network: u32,
    codec: Option<Arc<dyn FrameCodec>>,
    state: Mutex<State>,
    last_sent: Mutex<Instant>,
    last_recv: Mutex<Instant>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Client {
    pub async fn connect(
        server: SocketAddr,
        network: u32,
        nic: Arc<dyn Nic>,
        codec: Option<Arc<dyn FrameCodec>>,
    ) -> anyhow::Result<Arc<Self>> {
        let bind_addr: SocketAddr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let (shutdown, _) = watch::channel(false);
        let now = Instant::now();

        Ok(Arc::new(Self {
            socket,
            server,
            nic,
            network,
            codec,
            state: Mutex::new(State::Idle),
            last_sent: Mutex::new(now),
            last_recv: Mutex::new(now),
            running: AtomicBool::new(true),
            shutdown,
        }))
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Spawns the socket worker, NIC worker, and pinger. Returns their
    /// handles so the caller can await shutdown.
    pub fn spawn(self: &Arc<Self>) -> [JoinHandle<()>; 3] {
        [
            tokio::spawn(self.clone().socket_worker()),
            tokio::spawn(self.clone().nic_worker()),
            tokio::spawn(self.clone().pinger()),
        ]
    }

    /// Requests disconnect and stops every worker. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.send(Message::Disconnect);
        let _ = self.shutdown.send(true);
        *self.state.lock() = State::Idle;
    }

    fn send(&self, message: Message<'_>) {
        let mut buf = BytesMut::new();
        message.encode(&mut buf);
        let socket = self.socket.clone();
        let server = self.server;

        // recv_from/send_to on a connected UDP socket never blocks for long
        // enough to warrant awaiting here inline from sync call sites; fire
        // the datagram on the runtime and record the send timestamp eagerly.
        tokio::spawn(async move {
            if let Err(error) = socket.send_to(&buf, server).await {
                log::warn!("vswitch-client: send error: {error}");
            }
        });

        *self.last_sent.lock() = Instant::now();
    }

    fn touch_sent(&self) {
        *self.last_sent.lock() = Instant::now();
    }

    fn touch_recv(&self) {
        *self.last_recv.lock() = Instant::now();
    }

    fn associate(&self) {
        let mut buf = BytesMut::new();
        Message::AssociateRequest(self.network).encode(&mut buf);
        let socket = self.socket.clone();
        let server = self.server;
        tokio::spawn(async move {
            if let Err(error) = socket.send_to(&buf, server).await {
                log::warn!("vswitch-client: send error: {error}");
            }
        });
        self.touch_sent();
    }

    async fn socket_worker(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((size, from)) if from == self.server => {
                            self.touch_recv();
                            self.handle_datagram(&buf[..size]).await;
                        }
                        Ok((_, from)) => {
                            log::warn!("vswitch-client: dropping datagram from unexpected source {from}");
                        }
                        Err(error) => {
                            log::warn!("vswitch-client: recv error: {error}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_datagram(self: &Arc<Self>, datagram: &[u8]) {
        let message = match codec::decode(datagram) {
            Ok(message) => message,
            Err(error) => {
                log::warn!("vswitch-client: malformed datagram: {error}");
                return;
            }
        };

        let state = self.state();

        match (state, message) {
            (_, Message::KeepaliveRequest) => self.send(Message::KeepaliveRespond),
            (_, Message::Disconnect) => *self.state.lock() = State::Idle,

            (State::Connect, Message::KeepaliveRespond | Message::NeedAssociation) => {
                *self.state.lock() = State::Connected;
                self.associate();
            }

            (State::Connected, Message::AssociateRespond) => {
                *self.state.lock() = State::Associated;
            }

            (State::Associated, Message::EthernetFrame(frame)) => {
                let _ = self.nic.write(frame).await;
            }

            (State::Associated, Message::CompressedEthernetFrame(compressed)) => {
                self.handle_compressed_frame(compressed).await;
            }

            (State::Associated, Message::NeedAssociation) => {
                *self.state.lock() = State::Connected;
                self.associate();
            }

            (_, other) => {
                log::warn!("vswitch-client: out-of-context message {other:?} in state {state:?}");
            }
        }
    }

    async fn handle_compressed_frame(&self, compressed: &[u8]) {
        let Some(codec) = &self.codec else {
            log::warn!("vswitch-client: received compressed frame with no codec configured");
            return;
        };

        let mut scratch = [0u8; MAX_FRAME_SIZE];
        match codec.decompress(compressed, &mut scratch) {
            Some(len) => {
                let _ = self.nic.write(&scratch[..len]).await;
            }
            None => log::warn!("vswitch-client: failed to decompress frame from server"),
        }
    }

    async fn nic_worker(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                read = self.nic.read(&mut buf) => {
                    match read {
                        Ok(0) => continue,
                        Ok(len) => self.forward_from_nic(&buf[..len]).await,
                        Err(error) => log::warn!("vswitch-client: nic read error: {error}"),
                    }
                }
            }
        }
    }

    async fn forward_from_nic(&self, frame: &[u8]) {
        if !self.state().is_associated() {
            log::debug!("vswitch-client: dropping nic frame, not associated yet");
            return;
        }

        let mut buf = BytesMut::new();

        match &self.codec {
            Some(codec) => {
                let mut compressed = vec![0u8; MAX_FRAME_SIZE];
                match codec.compress(frame, &mut compressed) {
                    Some(len) => Message::CompressedEthernetFrame(&compressed[..len]).encode(&mut buf),
                    None => {
                        log::warn!("vswitch-client: compressed frame too large, dropping");
                        return;
                    }
                }
            }
            None => Message::EthernetFrame(frame).encode(&mut buf),
        }

        if let Err(error) = self.socket.send_to(&buf, self.server).await {
            log::warn!("vswitch-client: send error: {error}");
        }
        self.touch_sent();
    }

    async fn pinger(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(PING_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.pinger_tick(),
            }
        }
    }

    fn pinger_tick(&self) {
        let state = self.state();

        // Liveness timeout applies from any state but IDLE: a CONNECT that
        // never hears back from the server must also give up eventually,
        // not retry forever.
        if !matches!(state, State::Idle) {
            let age_recv = Instant::now().duration_since(*self.last_recv.lock());
            if age_recv >= KEEPALIVE * RETRIES {
                log::warn!("vswitch-client: server unresponsive, disconnecting");
                self.send(Message::Disconnect);
                *self.state.lock() = State::Idle;
                return;
            }
        }

        match state {
            State::Idle => {
                *self.state.lock() = State::Connect;
                self.send(Message::KeepaliveRequest);
            }
            State::Connect => {
                self.send(Message::KeepaliveRequest);
            }
            State::Connected | State::Associated => {
                let now = Instant::now();
                let age_sent = now.duration_since(*self.last_sent.lock());
                let age_recv = now.duration_since(*self.last_recv.lock());

                if age_sent >= KEEPALIVE && age_recv >= KEEPALIVE {
                    self.send(Message::KeepaliveRequest);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nic::PairDevice;

    async fn client_pair() -> (Arc<Client>, UdpSocket) {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_socket.local_addr().unwrap();
        let (nic, _inject, _capture) = PairDevice::new_pair();

        let client = Client::connect(server_addr, 7, Arc::new(nic), None).await.unwrap();
        (client, server_socket)
    }

    #[tokio::test]
    async fn pinger_moves_idle_to_connect_and_sends_a_keepalive() {
        let (client, server_socket) = client_pair().await;
        assert_eq!(client.state(), State::Idle);

        client.pinger_tick();
        assert_eq!(client.state(), State::Connect);

        let mut buf = [0u8; 64];
        let (size, _) = tokio::time::timeout(Duration::from_secs(1), server_socket.recv_from(&mut buf))
            .await
            .expect("expected a keepalive datagram")
            .unwrap();
        assert_eq!(buf[2], 3); // KEEPALIVE_REQUEST
        let _ = size;
    }

    #[tokio::test]
    async fn a_stuck_connect_gives_up_and_returns_to_idle() {
        let (client, _server_socket) = client_pair().await;
        *client.state.lock() = State::Connect;
        *client.last_recv.lock() = Instant::now() - KEEPALIVE * RETRIES - Duration::from_secs(1);

        client.pinger_tick();

        assert_eq!(client.state(), State::Idle);
    }

    #[tokio::test]
    async fn associate_respond_moves_connected_to_associated() {
        let (client, _server_socket) = client_pair().await;
        *client.state.lock() = State::Connected;

        client.handle_datagram(&{
            let mut buf = BytesMut::new();
            Message::AssociateRespond.encode(&mut buf);
            buf
        }).await;

        assert_eq!(client.state(), State::Associated);
    }

    #[tokio::test]
    async fn disconnect_from_server_returns_to_idle_from_any_state() {
        let (client, _server_socket) = client_pair().await;
        *client.state.lock() = State::Associated;

        client.handle_datagram(&{
            let mut buf = BytesMut::new();
            Message::Disconnect.encode(&mut buf);
            buf
        }).await;

        assert_eq!(client.state(), State::Idle);
    }

    #[tokio::test]
    async fn frames_from_nic_are_dropped_until_associated() {
        let (client, server_socket) = client_pair().await;
        assert_eq!(client.state(), State::Idle);

        client.forward_from_nic(&[0xAAu8; 14]).await;

        let mut buf = [0u8; 64];
        let result = tokio::time::timeout(Duration::from_millis(50), server_socket.recv_from(&mut buf)).await;
        assert!(result.is_err(), "no datagram should have been sent while unassociated");
    }
}
