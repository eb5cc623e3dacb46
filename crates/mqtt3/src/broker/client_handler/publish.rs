//! PUBLISH handling: inbound routing and outbound delivery.

use mqtt3_protocol::packet::{PubAckPacket, PublishPacket};
use mqtt3_protocol::validation::validate_topic_name;
use mqtt3_protocol::{MqttError, Packet, QoS, Result};
use tracing::{debug, error, trace, warn};

use super::ClientHandler;

impl ClientHandler {
    /// Validation order: topic checks first, then routing, then the
    /// QoS-based acknowledgment. A refused publish is never routed and
    /// never acknowledged.
    pub(super) async fn handle_publish(&mut self, publish: PublishPacket) -> Result<()> {
        if publish.qos == QoS::ExactlyOnce {
            error!(
                addr = %self.client_addr,
                topic = %publish.topic_name,
                "QoS 2 publish refused: exactly-once delivery is not supported"
            );
            return Ok(());
        }

        if let Err(e) = validate_topic_name(&publish.topic_name) {
            warn!(addr = %self.client_addr, "Refusing publish: {e}");
            return Ok(());
        }

        if let Some(ref listener) = self.config.activity_listener {
            listener.on_publish(&publish.topic_name, publish.payload.len());
        }

        let delivered = self.router.route_message(&publish).await;
        trace!(
            topic = %publish.topic_name,
            payload_len = publish.payload.len(),
            delivered,
            "Published"
        );

        if publish.qos == QoS::AtLeastOnce {
            let packet_id = publish.packet_id.ok_or_else(|| {
                MqttError::MalformedPacket("QoS 1 PUBLISH without packet identifier".to_string())
            })?;
            self.send_packet(Packet::PubAck(PubAckPacket::new(packet_id)))
                .await?;
        }

        Ok(())
    }

    /// Writes a routed publish out to this connection's client, assigning a
    /// fresh packet id when the delivery is QoS 1.
    pub(super) async fn send_publish(&mut self, mut publish: PublishPacket) -> Result<()> {
        if publish.qos != QoS::AtMostOnce {
            publish.packet_id = Some(self.next_packet_id());
        }
        debug!(
            topic = %publish.topic_name,
            qos = ?publish.qos,
            packet_id = ?publish.packet_id,
            payload_len = publish.payload.len(),
            "Sending PUBLISH to client"
        );
        self.send_packet(Packet::Publish(publish)).await
    }
}
