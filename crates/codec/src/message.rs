//! The 3-byte wire header and the 8 message types it can introduce.
//!
//! ```text
//! +----------------+----------------+----------------------------+
//! | magic (u16 be) | msg_type (u8)  | payload (message-specific) |
//! +----------------+----------------+----------------------------+
//! ```

use bytes::{BufMut, BytesMut};

use crate::Error;

/// `0x5EED`, network byte order.
pub const MAGIC: u16 = 0x5EED;

/// Datagrams larger than this are never produced, and are rejected on
/// receipt by the transport before they even reach the codec.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

const HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    EthernetFrame = 0,
    AssociateRequest = 1,
    AssociateRespond = 2,
    KeepaliveRequest = 3,
    KeepaliveRespond = 4,
    NeedAssociation = 5,
    Disconnect = 6,
    CompressedEthernetFrame = 7,
}

impl TryFrom<u8> for MessageTag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::EthernetFrame,
            1 => Self::AssociateRequest,
            2 => Self::AssociateRespond,
            3 => Self::KeepaliveRequest,
            4 => Self::KeepaliveRespond,
            5 => Self::NeedAssociation,
            6 => Self::Disconnect,
            7 => Self::CompressedEthernetFrame,
            other => return Err(Error::UnknownMessageType(other)),
        })
    }
}

/// A decoded datagram, borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    EthernetFrame(&'a [u8]),
    AssociateRequest(u32),
    AssociateRespond,
    KeepaliveRequest,
    KeepaliveRespond,
    NeedAssociation,
    Disconnect,
    /// Payload is the still-compressed frame bytes; the caller is
    /// responsible for decompression (see [`crate::compression`]).
    CompressedEthernetFrame(&'a [u8]),
}

impl<'a> Message<'a> {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::EthernetFrame(_) => MessageTag::EthernetFrame,
            Self::AssociateRequest(_) => MessageTag::AssociateRequest,
            Self::AssociateRespond => MessageTag::AssociateRespond,
            Self::KeepaliveRequest => MessageTag::KeepaliveRequest,
            Self::KeepaliveRespond => MessageTag::KeepaliveRespond,
            Self::NeedAssociation => MessageTag::NeedAssociation,
            Self::Disconnect => MessageTag::Disconnect,
            Self::CompressedEthernetFrame(_) => MessageTag::CompressedEthernetFrame,
        }
    }

    /// Encodes `self` into `buf`, overwriting any previous contents.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use vswitch_codec::message::{decode, Message};
    ///
    /// let mut buf = BytesMut::with_capacity(32);
    /// Message::AssociateRequest(7).encode(&mut buf);
    ///
    /// match decode(&buf).unwrap() {
    ///     Message::AssociateRequest(net) => assert_eq!(net, 7),
    ///     _ => panic!("wrong message decoded"),
    /// }
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.clear();
        buf.put_u16(MAGIC);
        buf.put_u8(self.tag() as u8);

        match self {
            Self::AssociateRequest(net) => buf.put_u32(*net),
            Self::EthernetFrame(frame) => buf.put_slice(frame),
            Self::CompressedEthernetFrame(frame) => {
                buf.put_u16(frame.len() as u16);
                buf.put_slice(frame);
            }
            Self::AssociateRespond
            | Self::KeepaliveRequest
            | Self::KeepaliveRespond
            | Self::NeedAssociation
            | Self::Disconnect => {}
        }
    }
}

/// Decodes one datagram.
///
/// Per spec: datagrams shorter than 3 bytes, with a wrong magic, an unknown
/// tag, or a wrong payload length for a fixed-shape message are rejected.
/// The caller is expected to log at warn level and drop the datagram; this
/// function never panics on attacker-controlled input.
pub fn decode(bytes: &[u8]) -> Result<Message<'_>, Error> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(Error::DatagramTooLarge(bytes.len()));
    }

    if bytes.len() < HEADER_LEN {
        return Err(Error::TooShort);
    }

    let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
    if magic != MAGIC {
        return Err(Error::BadMagic(magic));
    }

    let tag = MessageTag::try_from(bytes[2])?;
    let payload = &bytes[HEADER_LEN..];

    Ok(match tag {
        MessageTag::EthernetFrame => Message::EthernetFrame(payload),
        MessageTag::AssociateRequest => {
            let net: [u8; 4] = payload
                .try_into()
                .map_err(|_| Error::BadPayloadLength(payload.len()))?;
            Message::AssociateRequest(u32::from_be_bytes(net))
        }
        MessageTag::AssociateRespond => Message::AssociateRespond,
        MessageTag::KeepaliveRequest => Message::KeepaliveRequest,
        MessageTag::KeepaliveRespond => Message::KeepaliveRespond,
        MessageTag::NeedAssociation => Message::NeedAssociation,
        MessageTag::Disconnect => Message::Disconnect,
        MessageTag::CompressedEthernetFrame => {
            if payload.len() < 2 {
                return Err(Error::BadPayloadLength(payload.len()));
            }

            let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
            let compressed = payload.get(2..2 + len).ok_or(Error::BadPayloadLength(payload.len()))?;
            Message::CompressedEthernetFrame(compressed)
        }
    })
}
