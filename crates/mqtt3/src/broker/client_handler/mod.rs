//! Per-connection protocol handler.
//!
//! One `ClientHandler` runs per accepted transport, driving the
//! `AwaitingConnect → Connected → Closed` state machine: it owns the
//! transport exclusively, reads framed packets in arrival order, and mutates
//! the shared registries it was handed at construction.

mod connect;
mod lifecycle;
mod publish;
mod subscribe;

use crate::broker::auth::AuthProvider;
use crate::broker::config::BrokerConfig;
use crate::broker::router::MessageRouter;
use crate::broker::sessions::{Session, SessionRegistry};
use crate::broker::transport::{read_packet, write_packet, BrokerTransport};
use bytes::BytesMut;
use mqtt3_protocol::framing::FrameAccumulator;
use mqtt3_protocol::packet::PublishPacket;
use mqtt3_protocol::{MqttError, Packet, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

pub(crate) struct ClientHandler {
    pub(super) transport: BrokerTransport,
    pub(super) client_addr: SocketAddr,
    pub(super) config: Arc<BrokerConfig>,
    pub(super) router: Arc<MessageRouter>,
    pub(super) sessions: Arc<SessionRegistry>,
    pub(super) auth_provider: Arc<dyn AuthProvider>,
    pub(super) shutdown_rx: broadcast::Receiver<()>,
    pub(super) session: Option<Arc<Session>>,
    pub(super) client_id: Option<String>,
    pub(super) publish_rx: flume::Receiver<PublishPacket>,
    pub(super) publish_tx: flume::Sender<PublishPacket>,
    pub(super) next_packet_id: u16,
    pub(super) normal_disconnect: bool,
    pub(super) frame_accumulator: FrameAccumulator,
    pub(super) write_buffer: BytesMut,
}

impl ClientHandler {
    pub(crate) fn new(
        transport: BrokerTransport,
        client_addr: SocketAddr,
        config: Arc<BrokerConfig>,
        router: Arc<MessageRouter>,
        sessions: Arc<SessionRegistry>,
        auth_provider: Arc<dyn AuthProvider>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (publish_tx, publish_rx) = flume::bounded(config.client_channel_capacity);
        let frame_accumulator =
            FrameAccumulator::new().with_max_packet_size(config.max_packet_size);

        Self {
            transport,
            client_addr,
            config,
            router,
            sessions,
            auth_provider,
            shutdown_rx,
            session: None,
            client_id: None,
            publish_rx,
            publish_tx,
            next_packet_id: 1,
            normal_disconnect: false,
            frame_accumulator,
            write_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Runs the handler until disconnection or error. All cleanup — session
    /// removal, subscription release, transport close — happens here, on
    /// every exit path.
    pub(crate) async fn run(mut self) -> Result<()> {
        debug!(addr = %self.client_addr, "Client handler started");

        let (disconnect_tx, mut disconnect_rx) = oneshot::channel();
        let session = self
            .sessions
            .get_or_create(self.client_addr, self.publish_tx.clone(), disconnect_tx)
            .await;
        self.session = Some(session);

        let result = match timeout(self.config.connect_timeout, self.wait_for_connect()).await {
            Ok(Ok(())) => self.handle_packets(&mut disconnect_rx).await,
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(addr = %self.client_addr, "Connect timeout");
                Err(MqttError::Timeout)
            }
        };

        self.sessions.remove(self.client_addr).await;
        self.router.remove_session(self.client_addr).await;
        let _ = self.transport.close().await;

        if let Some(ref client_id) = self.client_id {
            if let Some(ref listener) = self.config.activity_listener {
                listener.on_client_disconnected(client_id, self.client_addr);
            }
            info!(client_id = %client_id, addr = %self.client_addr, "Client disconnected");
        }

        match result {
            Err(e) if self.normal_disconnect || e.is_normal_disconnect() => Ok(()),
            other => other,
        }
    }

    /// Only a CONNECT packet is legal before the handshake; anything else
    /// closes the connection with no response.
    async fn wait_for_connect(&mut self) -> Result<()> {
        let packet = read_packet(&mut self.transport, &mut self.frame_accumulator).await?;
        match packet {
            Packet::Connect(connect) => self.handle_connect(*connect).await,
            other => {
                warn!(
                    addr = %self.client_addr,
                    packet_type = ?other.packet_type(),
                    "Packet before CONNECT"
                );
                Err(MqttError::ProtocolError(
                    "Expected CONNECT packet".to_string(),
                ))
            }
        }
    }

    async fn handle_packets(
        &mut self,
        disconnect_rx: &mut oneshot::Receiver<()>,
    ) -> Result<()> {
        let mut idle_interval = tokio::time::interval(self.config.idle_timeout);
        idle_interval.reset();
        let mut last_packet_time = tokio::time::Instant::now();

        loop {
            tokio::select! {
                packet_result = read_packet(&mut self.transport, &mut self.frame_accumulator) => {
                    match packet_result {
                        Ok(packet) => {
                            last_packet_time = tokio::time::Instant::now();
                            self.handle_packet(packet).await?;
                        }
                        Err(e) if e.is_normal_disconnect() => {
                            debug!(addr = %self.client_addr, "Client closed the connection");
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    }
                }

                publish_result = self.publish_rx.recv_async() => {
                    if let Ok(publish) = publish_result {
                        self.send_publish(publish).await?;
                        while let Ok(more) = self.publish_rx.try_recv() {
                            self.send_publish(more).await?;
                        }
                    } else {
                        warn!("Delivery channel closed unexpectedly");
                        return Ok(());
                    }
                }

                _ = &mut *disconnect_rx => {
                    debug!(addr = %self.client_addr, "Closed by session registry");
                    return Ok(());
                }

                _ = self.shutdown_rx.recv() => {
                    debug!(addr = %self.client_addr, "Shutdown signal received");
                    return Ok(());
                }

                _ = idle_interval.tick() => {
                    if last_packet_time.elapsed() > self.config.idle_timeout {
                        warn!(addr = %self.client_addr, "Idle timeout");
                        return Err(MqttError::Timeout);
                    }
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<()> {
        match packet {
            Packet::Connect(_) => Err(MqttError::ProtocolError(
                "Duplicate CONNECT".to_string(),
            )),
            Packet::Publish(publish) => self.handle_publish(publish).await,
            Packet::PubAck(puback) => {
                trace!(packet_id = puback.packet_id, "PUBACK from subscriber");
                Ok(())
            }
            Packet::Subscribe(subscribe) => self.handle_subscribe(subscribe).await,
            Packet::Unsubscribe(unsubscribe) => self.handle_unsubscribe(unsubscribe).await,
            Packet::PingReq => self.handle_pingreq().await,
            Packet::Disconnect => self.handle_disconnect(),
            // server-to-client packets have no business arriving here
            Packet::ConnAck(_) | Packet::SubAck(_) | Packet::UnsubAck(_) | Packet::PingResp => {
                Err(MqttError::ProtocolError(format!(
                    "Unexpected {:?} from client",
                    packet.packet_type()
                )))
            }
        }
    }

    pub(super) async fn send_packet(&mut self, packet: Packet) -> Result<()> {
        write_packet(&mut self.transport, &packet, &mut self.write_buffer).await
    }
}
