//! Transport abstraction for accepted connections.
//!
//! The broker core only ever calls `read`/`write`/`close`/`peer_addr`;
//! everything protocol-shaped goes through [`read_packet`]/[`write_packet`],
//! which pair the transport with the stream framer.

use bytes::BytesMut;
use mqtt3_protocol::framing::FrameAccumulator;
use mqtt3_protocol::{MqttError, Packet, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_CHUNK_SIZE: usize = 4096;

/// An accepted client transport. An enum rather than a trait object so the
/// hot read/write path stays monomorphic; additional transports get a new
/// variant.
#[derive(Debug)]
pub enum BrokerTransport {
    Tcp(TcpStream),
}

impl BrokerTransport {
    #[must_use]
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match self {
            Self::Tcp(stream) => Ok(stream.peer_addr()?),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Tcp(stream) => Ok(stream.read(buf).await?),
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.write_all(buf).await?;
                Ok(())
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.shutdown().await?;
                Ok(())
            }
        }
    }
}

/// Reads until the accumulator yields one complete frame, then decodes it.
///
/// Cancel-safe: dropping the returned future between polls loses no bytes,
/// because partial frames live in the accumulator, not the future.
pub async fn read_packet(
    transport: &mut BrokerTransport,
    accumulator: &mut FrameAccumulator,
) -> Result<Packet> {
    loop {
        if let Some(mut frame) = accumulator.next_frame()? {
            return Packet::decode(&mut frame);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = transport.read(&mut chunk).await?;
        if n == 0 {
            return Err(MqttError::ConnectionClosedByPeer);
        }
        accumulator.extend(&chunk[..n]);
    }
}

/// Encodes into the reusable buffer and writes the packet out.
pub async fn write_packet(
    transport: &mut BrokerTransport,
    packet: &Packet,
    write_buffer: &mut BytesMut,
) -> Result<()> {
    write_buffer.clear();
    packet.encode(write_buffer)?;
    transport.write(write_buffer).await
}
