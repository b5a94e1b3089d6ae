//! End-to-end exercise of the client state machine against a hand-rolled UDP
//! peer standing in for a distributor.

use std::time::Duration;

use bytes::BytesMut;
use codec::message::Message;
use tokio::net::UdpSocket;
use vswitch_client::{Client, PairDevice, State};

async fn recv_datagram(socket: &UdpSocket) -> (Vec<u8>, std::net::SocketAddr) {
    let mut buf = vec![0u8; 65_536];
    let (size, from) = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .unwrap();

    (buf[..size].to_vec(), from)
}

async fn send_message(socket: &UdpSocket, to: std::net::SocketAddr, message: Message<'_>) {
    let mut buf = BytesMut::new();
    message.encode(&mut buf);
    socket.send_to(&buf, to).await.unwrap();
}

#[tokio::test]
async fn connects_associates_and_exchanges_a_frame() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let (nic, inject, mut capture) = PairDevice::new_pair();
    let client = Client::connect(server_addr, 42, std::sync::Arc::new(nic), None)
        .await
        .unwrap();
    let _workers = client.spawn();

    assert_eq!(client.state(), State::Idle);

    let (datagram, peer) = recv_datagram(&server).await;
    assert_eq!(codec::decode(&datagram).unwrap(), Message::KeepaliveRequest);
    assert_eq!(client.state(), State::Connect);

    send_message(&server, peer, Message::KeepaliveRespond).await;

    let (datagram, _peer) = recv_datagram(&server).await;
    assert_eq!(codec::decode(&datagram).unwrap(), Message::AssociateRequest(42));
    assert_eq!(client.state(), State::Connected);

    send_message(&server, peer, Message::AssociateRespond).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.state(), State::Associated);

    let frame = vec![0x11u8; 60];
    inject.send(frame.clone()).await.unwrap();

    let (datagram, _) = recv_datagram(&server).await;
    match codec::decode(&datagram).unwrap() {
        Message::EthernetFrame(payload) => assert_eq!(payload, &frame[..]),
        other => panic!("expected an ethernet frame, got {other:?}"),
    }

    send_message(&server, peer, Message::EthernetFrame(&[0x22u8; 60])).await;
    let captured = tokio::time::timeout(Duration::from_secs(1), capture.recv())
        .await
        .expect("expected the frame to reach the nic")
        .unwrap();
    assert_eq!(captured, vec![0x22u8; 60]);

    client.stop();
    let (datagram, _) = recv_datagram(&server).await;
    assert_eq!(codec::decode(&datagram).unwrap(), Message::Disconnect);
}

#[tokio::test]
async fn need_association_after_connected_resends_associate_request() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();

    let (nic, _inject, _capture) = PairDevice::new_pair();
    let client = Client::connect(server_addr, 9, std::sync::Arc::new(nic), None)
        .await
        .unwrap();
    let _workers = client.spawn();

    let (_datagram, peer) = recv_datagram(&server).await; // keepalive request
    send_message(&server, peer, Message::NeedAssociation).await;

    let (datagram, _) = recv_datagram(&server).await;
    assert_eq!(codec::decode(&datagram).unwrap(), Message::AssociateRequest(9));
    assert_eq!(client.state(), State::Connected);

    client.stop();
}
