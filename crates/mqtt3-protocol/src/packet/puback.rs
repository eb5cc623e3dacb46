use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// PUBACK: acknowledges a QoS 1 PUBLISH, echoing its packet id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAckPacket {
    pub packet_id: u16,
}

impl PubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl MqttPacket for PubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "PUBACK missing packet identifier".to_string(),
            ));
        }
        Ok(Self {
            packet_id: buf.get_u16(),
        })
    }
}
