use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::QoS;
use bytes::{Buf, BufMut, Bytes};

/// PUBLISH: topic name, optional packet id (QoS > 0 only), raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
    pub qos: QoS,
    pub dup: bool,
    pub retain: bool,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic_name: topic_name.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            dup: false,
            retain: false,
        }
    }

    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        (u8::from(self.dup) << 3) | ((self.qos as u8) << 1) | u8::from(self.retain)
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic_name)?;
        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or_else(|| {
                MqttError::MalformedPacket(
                    "PUBLISH with QoS > 0 requires a packet identifier".to_string(),
                )
            })?;
            buf.put_u16(packet_id);
        }
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        let dup = fixed_header.flags & 0x08 != 0;
        let qos = QoS::try_from_bits((fixed_header.flags & 0x06) >> 1)?;
        let retain = fixed_header.flags & 0x01 != 0;

        let topic_name = decode_string(buf)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH missing packet identifier".to_string(),
                ));
            }
            Some(buf.get_u16())
        };

        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Self {
            topic_name,
            packet_id,
            payload,
            qos,
            dup,
            retain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    fn round_trip(packet: &PublishPacket) -> PublishPacket {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(fixed_header.packet_type, PacketType::Publish);
        PublishPacket::decode_body(&mut buf, &fixed_header).unwrap()
    }

    #[test]
    fn test_publish_qos0() {
        let packet = PublishPacket::new("sensors/temp", &b"25.5"[..], QoS::AtMostOnce);
        let decoded = round_trip(&packet);
        assert_eq!(decoded, packet);
        assert_eq!(decoded.packet_id, None);
    }

    #[test]
    fn test_publish_qos1_carries_packet_id() {
        let packet =
            PublishPacket::new("sensors/temp", &b"25.5"[..], QoS::AtLeastOnce).with_packet_id(7);
        let decoded = round_trip(&packet);
        assert_eq!(decoded.packet_id, Some(7));
        assert_eq!(decoded.payload, Bytes::from_static(b"25.5"));
    }

    #[test]
    fn test_publish_qos1_without_packet_id_fails_encode() {
        let packet = PublishPacket::new("sensors/temp", &b"x"[..], QoS::AtLeastOnce);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }

    #[test]
    fn test_publish_invalid_qos_bits() {
        // flags 0b0110 = QoS bits 3
        let fixed_header = FixedHeader::new(PacketType::Publish, 0x06, 0);
        let mut buf = BytesMut::new();
        assert!(PublishPacket::decode_body(&mut buf, &fixed_header).is_err());
    }

    #[test]
    fn test_publish_flag_bits() {
        let mut packet =
            PublishPacket::new("a/b", &b""[..], QoS::AtLeastOnce).with_packet_id(1);
        packet.dup = true;
        packet.retain = true;
        assert_eq!(packet.flags(), 0b1011);
        let decoded = round_trip(&packet);
        assert!(decoded.dup);
        assert!(decoded.retain);
    }

    #[test]
    fn test_publish_empty_payload() {
        let packet = PublishPacket::new("a/b", &b""[..], QoS::AtMostOnce);
        let decoded = round_trip(&packet);
        assert!(decoded.payload.is_empty());
    }

    proptest! {
        #[test]
        fn prop_publish_round_trip(
            topic in "[a-z0-9/]{1,64}",
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            qos1 in any::<bool>(),
            packet_id in 1u16..,
        ) {
            let qos = if qos1 { QoS::AtLeastOnce } else { QoS::AtMostOnce };
            let mut packet = PublishPacket::new(topic, payload, qos);
            if qos1 {
                packet = packet.with_packet_id(packet_id);
            }
            let mut buf = BytesMut::new();
            packet.encode(&mut buf).unwrap();
            let original = buf.clone();

            let fixed_header = FixedHeader::decode(&mut buf).unwrap();
            let decoded = PublishPacket::decode_body(&mut buf, &fixed_header).unwrap();

            // decode → encode reproduces the original bytes
            let mut re_encoded = BytesMut::new();
            decoded.encode(&mut re_encoded).unwrap();
            prop_assert_eq!(re_encoded, original);
        }
    }
}
