//! Shared protocol value types.

use crate::error::{MqttError, Result};

/// Quality of Service level on a PUBLISH.
///
/// The broker only completes QoS 0 and QoS 1 flows; QoS 2 decodes (so the
/// offending packet can be identified and refused) but is never serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn try_from_bits(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(MqttError::MalformedPacket(format!(
                "Invalid QoS bits: {value}"
            ))),
        }
    }

    /// Downgrades to the lower of the two levels, the rule used when
    /// forwarding a publish to a subscriber.
    #[must_use]
    pub fn min_with(self, other: QoS) -> QoS {
        if (self as u8) < (other as u8) {
            self
        } else {
            other
        }
    }
}

/// CONNACK return code (MQTT 3.1.1 table 3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub fn try_from_byte(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::UnacceptableProtocolVersion),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::BadUsernameOrPassword),
            5 => Ok(Self::NotAuthorized),
            _ => Err(MqttError::MalformedPacket(format!(
                "Invalid CONNACK return code: {value}"
            ))),
        }
    }
}

/// Per-filter SUBACK return code: the granted QoS, or 0x80 for a rejected
/// filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeReturnCode {
    GrantedQoS0 = 0x00,
    GrantedQoS1 = 0x01,
    GrantedQoS2 = 0x02,
    Failure = 0x80,
}

impl SubscribeReturnCode {
    #[must_use]
    pub fn granted(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::GrantedQoS0,
            QoS::AtLeastOnce => Self::GrantedQoS1,
            QoS::ExactlyOnce => Self::GrantedQoS2,
        }
    }

    pub fn try_from_byte(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::GrantedQoS0),
            0x01 => Ok(Self::GrantedQoS1),
            0x02 => Ok(Self::GrantedQoS2),
            0x80 => Ok(Self::Failure),
            _ => Err(MqttError::MalformedPacket(format!(
                "Invalid SUBACK return code: 0x{value:02X}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_from_bits() {
        assert_eq!(QoS::try_from_bits(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(QoS::try_from_bits(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(QoS::try_from_bits(2).unwrap(), QoS::ExactlyOnce);
        assert!(QoS::try_from_bits(3).is_err());
    }

    #[test]
    fn test_qos_downgrade() {
        assert_eq!(QoS::AtLeastOnce.min_with(QoS::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(QoS::AtMostOnce.min_with(QoS::AtLeastOnce), QoS::AtMostOnce);
        assert_eq!(
            QoS::AtLeastOnce.min_with(QoS::AtLeastOnce),
            QoS::AtLeastOnce
        );
    }

    #[test]
    fn test_connect_return_code_round_trip() {
        for code in 0..=5u8 {
            let rc = ConnectReturnCode::try_from_byte(code).unwrap();
            assert_eq!(rc as u8, code);
        }
        assert!(ConnectReturnCode::try_from_byte(6).is_err());
    }

    #[test]
    fn test_subscribe_return_code() {
        assert_eq!(
            SubscribeReturnCode::granted(QoS::AtLeastOnce),
            SubscribeReturnCode::GrantedQoS1
        );
        assert_eq!(
            SubscribeReturnCode::try_from_byte(0x80).unwrap(),
            SubscribeReturnCode::Failure
        );
        assert!(SubscribeReturnCode::try_from_byte(0x03).is_err());
    }
}
