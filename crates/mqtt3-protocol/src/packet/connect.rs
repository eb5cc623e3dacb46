use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use bytes::{Buf, BufMut};

/// Will message carried in the CONNECT payload.
///
/// The broker never publishes wills (explicitly unsupported); the fields are
/// still decoded so the rest of the payload parses correctly and so that
/// encoding reproduces the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_name: String,
    pub protocol_version: u8,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            protocol_name: "MQTT".to_string(),
            protocol_version: 4,
            clean_session: true,
            keep_alive: 60,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive = secs;
        self
    }

    /// True when the connect flags request credential authentication.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if let Some(ref will) = self.will {
            if will.retain {
                flags |= 0x20;
            }
            flags |= (will.qos & 0x03) << 3;
            flags |= 0x04;
        }
        if self.clean_session {
            flags |= 0x02;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.protocol_name)?;
        buf.put_u8(self.protocol_version);
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        encode_string(buf, &self.client_id)?;
        if let Some(ref will) = self.will {
            encode_string(buf, &will.topic)?;
            let len = will.payload.len();
            if len > usize::from(u16::MAX) {
                return Err(MqttError::MalformedPacket(format!(
                    "Will payload too long: {len} bytes"
                )));
            }
            #[allow(clippy::cast_possible_truncation)]
            buf.put_u16(len as u16);
            buf.put_slice(&will.payload);
        }
        if let Some(ref username) = self.username {
            encode_string(buf, username)?;
        }
        if let Some(ref password) = self.password {
            encode_string(buf, password)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if buf.remaining() < 4 {
            return Err(MqttError::MalformedPacket(
                "Truncated CONNECT variable header".to_string(),
            ));
        }
        let protocol_version = buf.get_u8();
        let connect_flags = buf.get_u8();
        let keep_alive = buf.get_u16();

        if connect_flags & 0x01 != 0 {
            return Err(MqttError::MalformedPacket(
                "CONNECT reserved flag bit must be 0".to_string(),
            ));
        }

        let username_flag = connect_flags & 0x80 != 0;
        let password_flag = connect_flags & 0x40 != 0;
        let will_retain = connect_flags & 0x20 != 0;
        let will_qos = (connect_flags & 0x18) >> 3;
        let will_flag = connect_flags & 0x04 != 0;
        let clean_session = connect_flags & 0x02 != 0;

        let client_id = decode_string(buf)?;

        let will = if will_flag {
            let topic = decode_string(buf)?;
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "Truncated will payload length".to_string(),
                ));
            }
            let len = buf.get_u16() as usize;
            if buf.remaining() < len {
                return Err(MqttError::MalformedPacket(
                    "Truncated will payload".to_string(),
                ));
            }
            let mut payload = vec![0u8; len];
            buf.copy_to_slice(&mut payload);
            Some(Will {
                topic,
                payload,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };

        let username = if username_flag {
            let username = decode_string(buf)?;
            if username.is_empty() {
                return Err(MqttError::MalformedPacket(
                    "Username flag is set but no username provided".to_string(),
                ));
            }
            Some(username)
        } else {
            None
        };

        let password = if password_flag {
            let password = decode_string(buf)?;
            if password.is_empty() {
                return Err(MqttError::MalformedPacket(
                    "Password flag is set but no password provided".to_string(),
                ));
            }
            Some(password)
        } else {
            None
        };

        Ok(Self {
            protocol_name,
            protocol_version,
            clean_session,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }
}
