use bytes::BytesMut;
use vswitch_codec::{decode, Error, MacAddr, Message};
use vswitch_codec::ethernet::EthernetView;

#[test]
fn associate_request_round_trips_network_id() {
    let mut buf = BytesMut::new();
    Message::AssociateRequest(0xDEAD_BEEF).encode(&mut buf);

    assert_eq!(buf[0], 0x5E);
    assert_eq!(buf[1], 0xED);
    assert_eq!(buf[2], 1);

    match decode(&buf).unwrap() {
        Message::AssociateRequest(net) => assert_eq!(net, 0xDEAD_BEEF),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn unknown_optional_tag_without_codec_support_is_rejected_gracefully() {
    // Tag 7 (COMPRESSED_ETHERNET_FRAME) with a length prefix that overruns
    // the datagram: must be a clean error, never a panic or out-of-bounds read.
    let bytes = [0x5E, 0xED, 0x07, 0x00, 0xFF];
    assert!(matches!(decode(&bytes), Err(Error::BadPayloadLength(_))));
}

#[test]
fn ethernet_view_exposes_destination_and_source() {
    let mut frame = vec![0u8; 64];
    frame[0..6].copy_from_slice(MacAddr::BROADCAST.as_bytes());
    frame[6..12].copy_from_slice(&[1, 2, 3, 4, 5, 6]);

    let view = EthernetView::parse(&frame).unwrap();
    assert!(view.destination().is_broadcast());
    assert_eq!(view.source(), MacAddr::new([1, 2, 3, 4, 5, 6]));
}
