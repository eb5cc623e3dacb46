use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// UNSUBACK: echoes the UNSUBSCRIBE packet id. Sent whether or not any
/// filter was actually registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
}

impl UnsubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl MqttPacket for UnsubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBACK missing packet identifier".to_string(),
            ));
        }
        Ok(Self {
            packet_id: buf.get_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_unsuback_wire_bytes() {
        let packet = UnsubAckPacket::new(99);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xB0, 0x02, 0x00, 0x63]);
    }

    #[test]
    fn test_unsuback_round_trip() {
        let packet = UnsubAckPacket::new(12345);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(
            UnsubAckPacket::decode_body(&mut buf, &fixed_header).unwrap(),
            packet
        );
    }
}
