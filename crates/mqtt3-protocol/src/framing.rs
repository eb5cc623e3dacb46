//! Stream framing: slicing self-delimited packets out of a byte stream.
//!
//! TCP delivers bytes in arbitrary chunks; the accumulator buffers them and
//! yields one complete frame (fixed header + remaining-length worth of body)
//! at a time. It never blocks and never partially consumes a frame.

use crate::encoding::decode_remaining_length;
use crate::error::{MqttError, Result};
use bytes::{Buf, BytesMut};

const DEFAULT_MAX_PACKET_SIZE: usize = 268_435_455;

#[derive(Debug)]
pub struct FrameAccumulator {
    buf: BytesMut,
    max_packet_size: usize,
}

impl FrameAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_packet_size(mut self, max: usize) -> Self {
        self.max_packet_size = max;
        self
    }

    /// Appends raw transport bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet sliced into a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Slices the next complete frame off the front of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. An over-long
    /// remaining-length encoding or a frame above the size limit is a fatal
    /// error; the caller must close the connection.
    pub fn next_frame(&mut self) -> Result<Option<BytesMut>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        // Peek the remaining-length encoding without consuming the buffer.
        let mut peek = &self.buf[1..];
        let available = peek.remaining();
        let Some(remaining_length) = decode_remaining_length(&mut peek)? else {
            return Ok(None);
        };
        let length_bytes = available - peek.remaining();

        let frame_len = 1 + length_bytes + remaining_length as usize;
        if frame_len > self.max_packet_size {
            return Err(MqttError::PacketTooLarge {
                size: frame_len,
                max: self.max_packet_size,
            });
        }
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        Ok(Some(self.buf.split_to(frame_len)))
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{MqttPacket, Packet, PacketType, PublishPacket};
    use crate::types::QoS;

    fn encoded_publish(topic: &str, payload: &[u8]) -> BytesMut {
        let packet = PublishPacket::new(topic, payload.to_vec(), QoS::AtMostOnce);
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_whole_packet_in_one_read() {
        let bytes = encoded_publish("a/b", b"hello");
        let mut acc = FrameAccumulator::new();
        acc.extend(&bytes);

        let frame = acc.next_frame().unwrap().unwrap();
        assert_eq!(frame, bytes);
        assert_eq!(acc.next_frame().unwrap(), None);
        assert_eq!(acc.buffered(), 0);
    }

    #[test]
    fn test_byte_at_a_time_reassembly() {
        let bytes = encoded_publish("sensors/temp", b"25.5");
        let mut acc = FrameAccumulator::new();

        for (i, byte) in bytes.iter().enumerate() {
            acc.extend(&[*byte]);
            if i < bytes.len() - 1 {
                assert_eq!(acc.next_frame().unwrap(), None, "premature frame at {i}");
            }
        }
        assert_eq!(acc.next_frame().unwrap().unwrap(), bytes);
    }

    #[test]
    fn test_two_packets_in_one_read() {
        let first = encoded_publish("a", b"1");
        let second = encoded_publish("b/c", b"22");
        let mut acc = FrameAccumulator::new();
        acc.extend(&first);
        acc.extend(&second);

        assert_eq!(acc.next_frame().unwrap().unwrap(), first);
        assert_eq!(acc.next_frame().unwrap().unwrap(), second);
        assert_eq!(acc.next_frame().unwrap(), None);
    }

    #[test]
    fn test_split_mid_remaining_length() {
        // payload large enough for a two-byte remaining length
        let bytes = encoded_publish("t", &vec![0u8; 300]);
        assert!(bytes[1] & 0x80 != 0, "expected multi-byte remaining length");

        let mut acc = FrameAccumulator::new();
        // deliver only the first header byte plus half the length encoding
        acc.extend(&bytes[..2]);
        assert_eq!(acc.next_frame().unwrap(), None);
        acc.extend(&bytes[2..]);
        assert_eq!(acc.next_frame().unwrap().unwrap(), bytes);
    }

    #[test]
    fn test_overlong_remaining_length_is_fatal() {
        let mut acc = FrameAccumulator::new();
        acc.extend(&[0x30, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(acc.next_frame().is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut acc = FrameAccumulator::new().with_max_packet_size(16);
        let bytes = encoded_publish("a/b", &[0u8; 64]);
        acc.extend(&bytes);
        assert!(matches!(
            acc.next_frame(),
            Err(MqttError::PacketTooLarge { .. })
        ));
    }

    #[test]
    fn test_split_stream_decodes_same_packets_as_whole() {
        let packets = [
            encoded_publish("a/b", b"one"),
            encoded_publish("c", b"two"),
            encoded_publish("d/e/f", b"three"),
        ];
        let mut stream = BytesMut::new();
        for p in &packets {
            stream.extend_from_slice(p);
        }

        // deliver in awkward chunks straddling packet boundaries
        let mut acc = FrameAccumulator::new();
        let mut decoded = Vec::new();
        for chunk in stream.chunks(5) {
            acc.extend(chunk);
            while let Some(mut frame) = acc.next_frame().unwrap() {
                decoded.push(Packet::decode(&mut frame).unwrap());
            }
        }

        assert_eq!(decoded.len(), packets.len());
        for packet in &decoded {
            assert_eq!(packet.packet_type(), PacketType::Publish);
        }
        match &decoded[2] {
            Packet::Publish(p) => {
                assert_eq!(p.topic_name, "d/e/f");
                assert_eq!(&p.payload[..], b"three");
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }
}
