use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::ConnectReturnCode;
use bytes::{Buf, BufMut};

/// CONNACK: acknowledgement flags byte plus a return code.
///
/// Session-present (bit 0 of the ack flags) is always false here since
/// persistent sessions are unsupported, but the bit is decoded faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(return_code: ConnectReturnCode) -> Self {
        Self {
            session_present: false,
            return_code,
        }
    }

    #[must_use]
    pub fn accepted() -> Self {
        Self::new(ConnectReturnCode::Accepted)
    }
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.return_code as u8);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "Truncated CONNACK".to_string(),
            ));
        }
        let ack_flags = buf.get_u8();
        let return_code = ConnectReturnCode::try_from_byte(buf.get_u8())?;
        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            return_code,
        })
    }
}
