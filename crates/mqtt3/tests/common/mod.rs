//! Shared helpers for integration tests: an in-process broker and a raw
//! TCP client that works at the byte level, so tests can exercise both
//! well-formed and deliberately malformed traffic.

#![allow(dead_code)]

use bytes::BytesMut;
use mqtt3::broker::{BrokerConfig, MessageRouter, MqttBroker, SessionRegistry};
use mqtt3::protocol::framing::FrameAccumulator;
use mqtt3::protocol::packet::ConnectPacket;
use mqtt3::protocol::types::ConnectReturnCode;
use mqtt3::protocol::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Registries of a spawned broker, for asserting on shared state that the
/// wire protocol does not expose (subscription counts, live sessions).
pub struct BrokerHandles {
    pub addr: SocketAddr,
    pub router: Arc<MessageRouter>,
    pub sessions: Arc<SessionRegistry>,
}

pub fn test_config() -> BrokerConfig {
    BrokerConfig::default()
        .with_bind_address("127.0.0.1:0".parse::<SocketAddr>().unwrap())
        .with_idle_timeout(Duration::from_secs(10))
        .with_sweep_interval(Duration::from_millis(100))
}

/// Spawns a fully constructed broker and waits until it accepts connections.
pub async fn spawn_broker(broker: MqttBroker) -> BrokerHandles {
    let addr = broker.local_addr().expect("broker local addr");
    let router = broker.router();
    let sessions = broker.sessions();
    let mut ready = broker.ready_receiver();

    let mut broker = broker;
    tokio::spawn(async move { broker.run().await });
    ready.changed().await.expect("broker ready");

    BrokerHandles {
        addr,
        router,
        sessions,
    }
}

pub async fn start_broker() -> BrokerHandles {
    let broker = MqttBroker::with_config(test_config())
        .await
        .expect("broker start");
    spawn_broker(broker).await
}

/// Raw TCP client speaking hand-assembled MQTT frames.
pub struct RawClient {
    stream: TcpStream,
    accumulator: FrameAccumulator,
}

impl RawClient {
    pub async fn connect_tcp(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("tcp connect");
        Self {
            stream,
            accumulator: FrameAccumulator::new(),
        }
    }

    pub async fn send_raw(&mut self, data: &[u8]) {
        self.stream.write_all(data).await.expect("tcp write");
    }

    pub async fn send_packet(&mut self, packet: &Packet) {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf).expect("encode packet");
        self.send_raw(&buf).await;
    }

    /// Reads the next complete packet, or `None` on timeout / closed
    /// connection.
    pub async fn read_packet(&mut self) -> Option<Packet> {
        loop {
            if let Some(mut frame) = self.accumulator.next_frame().expect("framing") {
                return Some(Packet::decode(&mut frame).expect("decode packet"));
            }

            let mut chunk = [0u8; 4096];
            match tokio::time::timeout(RESPONSE_TIMEOUT, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return None,
                Ok(Ok(n)) => self.accumulator.extend(&chunk[..n]),
            }
        }
    }

    pub async fn expect_connack(&mut self) -> ConnectReturnCode {
        match self.read_packet().await {
            Some(Packet::ConnAck(connack)) => connack.return_code,
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    /// Sends CONNECT and asserts the broker accepted it.
    pub async fn establish(&mut self, client_id: &str) {
        self.send_packet(&Packet::Connect(Box::new(ConnectPacket::new(client_id))))
            .await;
        assert_eq!(self.expect_connack().await, ConnectReturnCode::Accepted);
    }

    /// True once the broker has closed this connection (EOF). Any packets
    /// still in flight are drained first.
    pub async fn closed_by_broker(&mut self) -> bool {
        loop {
            if self.accumulator.next_frame().expect("framing").is_some() {
                continue;
            }
            let mut chunk = [0u8; 4096];
            match tokio::time::timeout(RESPONSE_TIMEOUT, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(n)) => self.accumulator.extend(&chunk[..n]),
                Err(_) => return false,
            }
        }
    }
}

/// Polls an async condition until it holds or the deadline passes.
pub async fn wait_for<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
