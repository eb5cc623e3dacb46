//! Primitive wire encodings: length-prefixed UTF-8 strings and the
//! variable-length remaining-length integer.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Remaining length may occupy at most four encoded bytes (max value
/// 268,435,455).
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Decodes a length-prefixed UTF-8 string (2-byte big-endian length, then
/// payload bytes).
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Truncated string length prefix".to_string(),
        ));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "String length {len} exceeds remaining buffer {}",
            buf.remaining()
        )));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes)
        .map_err(|e| MqttError::MalformedPacket(format!("Invalid UTF-8 in string: {e}")))
}

/// Encodes a length-prefixed UTF-8 string.
pub fn encode_string<B: BufMut>(buf: &mut B, s: &str) -> Result<()> {
    let len = s.len();
    if len > usize::from(u16::MAX) {
        return Err(MqttError::MalformedPacket(format!(
            "String too long: {len} bytes"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.put_u16(len as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Decodes the variable-length remaining-length integer.
///
/// Each byte contributes its low 7 bits multiplied by `128^position`; bit 7
/// set means more bytes follow. A fifth continuation byte is a fatal format
/// error. Returns `Ok(None)` if the buffer ends before the encoding is
/// complete (the framer retries once more bytes arrive).
pub fn decode_remaining_length<B: Buf>(buf: &mut B) -> Result<Option<u32>> {
    let mut value: u32 = 0;
    let mut multiplier: u32 = 1;
    for i in 0..MAX_REMAINING_LENGTH_BYTES {
        if !buf.has_remaining() {
            return Ok(None);
        }
        let encoded = buf.get_u8();
        value += u32::from(encoded & 0x7F) * multiplier;
        if encoded & 0x80 == 0 {
            return Ok(Some(value));
        }
        if i == MAX_REMAINING_LENGTH_BYTES - 1 {
            break;
        }
        multiplier *= 128;
    }
    Err(MqttError::MalformedPacket(
        "Remaining length exceeds 4 encoded bytes".to_string(),
    ))
}

/// Encodes the remaining-length integer.
pub fn encode_remaining_length<B: BufMut>(buf: &mut B, mut len: u32) -> Result<()> {
    if len > 268_435_455 {
        return Err(MqttError::PacketTooLarge {
            size: len as usize,
            max: 268_435_455,
        });
    }
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut encoded = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            encoded |= 0x80;
        }
        buf.put_u8(encoded);
        if len == 0 {
            return Ok(());
        }
    }
}
