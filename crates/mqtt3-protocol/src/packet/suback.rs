use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::SubscribeReturnCode;
use bytes::{Buf, BufMut};

/// SUBACK: one return-code byte per filter in the SUBSCRIBE being answered,
/// in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, return_codes: Vec<SubscribeReturnCode>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        for code in &self.return_codes {
            buf.put_u8(*code as u8);
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        let mut return_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            return_codes.push(SubscribeReturnCode::try_from_byte(buf.get_u8())?);
        }
        Ok(Self {
            packet_id,
            return_codes,
        })
    }
}
