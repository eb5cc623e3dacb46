//! Control packet codec.
//!
//! Each packet type lives in its own module and implements [`MqttPacket`];
//! [`Packet`] is the closed enum the broker dispatches on. Decoding always
//! operates on a single complete frame produced by
//! [`crate::framing::FrameAccumulator`].

pub mod connack;
pub mod connect;
pub mod puback;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

use crate::encoding::{decode_remaining_length, encode_remaining_length};
use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut, BytesMut};

pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use puback::PubAckPacket;
pub use publish::PublishPacket;
pub use suback::SubAckPacket;
pub use subscribe::SubscribePacket;
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

/// Control packet type code (high nibble of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            // 0 is forbidden; 5-7 are the QoS 2 flow, which this broker
            // does not implement and treats as unknown.
            other => Err(MqttError::InvalidPacketType(other)),
        }
    }
}

/// Decoded fixed header: type nibble, flag nibble, remaining length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    /// Decodes the fixed header from a complete frame.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket("Empty packet".to_string()));
        }
        let first = buf.get_u8();
        let packet_type = PacketType::try_from(first >> 4)?;
        let flags = first & 0x0F;
        let remaining_length = decode_remaining_length(buf)?.ok_or_else(|| {
            MqttError::MalformedPacket("Truncated remaining length".to_string())
        })?;
        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(((self.packet_type as u8) << 4) | (self.flags & 0x0F));
        encode_remaining_length(buf, self.remaining_length)
    }
}

/// Common shape of every control packet: a type, fixed-header flags, and a
/// body codec. `encode` serializes the body first, measures it, then
/// prepends the fixed header with the computed remaining length.
pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        0
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;
        #[allow(clippy::cast_possible_truncation)]
        let header = FixedHeader::new(self.packet_type(), self.flags(), body.len() as u32);
        header.encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

/// A decoded control packet.
///
/// Immutable once decoded; a packet never outlives the handling of the frame
/// that produced it.
#[derive(Debug, Clone)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq => PacketType::PingReq,
            Self::PingResp => PacketType::PingResp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }

    /// Decodes one complete frame into a packet.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let fixed_header = FixedHeader::decode(buf)?;
        match fixed_header.packet_type {
            PacketType::Connect => Ok(Self::Connect(Box::new(ConnectPacket::decode_body(
                buf,
                &fixed_header,
            )?))),
            PacketType::ConnAck => Ok(Self::ConnAck(ConnAckPacket::decode_body(
                buf,
                &fixed_header,
            )?)),
            PacketType::Publish => Ok(Self::Publish(PublishPacket::decode_body(
                buf,
                &fixed_header,
            )?)),
            PacketType::PubAck => Ok(Self::PubAck(PubAckPacket::decode_body(buf, &fixed_header)?)),
            PacketType::Subscribe => Ok(Self::Subscribe(SubscribePacket::decode_body(
                buf,
                &fixed_header,
            )?)),
            PacketType::SubAck => Ok(Self::SubAck(SubAckPacket::decode_body(buf, &fixed_header)?)),
            PacketType::Unsubscribe => Ok(Self::Unsubscribe(UnsubscribePacket::decode_body(
                buf,
                &fixed_header,
            )?)),
            PacketType::UnsubAck => Ok(Self::UnsubAck(UnsubAckPacket::decode_body(
                buf,
                &fixed_header,
            )?)),
            PacketType::PingReq => Ok(Self::PingReq),
            PacketType::PingResp => Ok(Self::PingResp),
            PacketType::Disconnect => Ok(Self::Disconnect),
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Self::Connect(p) => p.encode(buf),
            Self::ConnAck(p) => p.encode(buf),
            Self::Publish(p) => p.encode(buf),
            Self::PubAck(p) => p.encode(buf),
            Self::Subscribe(p) => p.encode(buf),
            Self::SubAck(p) => p.encode(buf),
            Self::Unsubscribe(p) => p.encode(buf),
            Self::UnsubAck(p) => p.encode(buf),
            Self::PingReq => FixedHeader::new(PacketType::PingReq, 0, 0).encode(buf),
            Self::PingResp => FixedHeader::new(PacketType::PingResp, 0, 0).encode(buf),
            Self::Disconnect => FixedHeader::new(PacketType::Disconnect, 0, 0).encode(buf),
        }
    }
}
