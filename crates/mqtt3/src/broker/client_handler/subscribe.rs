//! SUBSCRIBE and UNSUBSCRIBE handling.

use mqtt3_protocol::packet::{SubAckPacket, SubscribePacket, UnsubAckPacket, UnsubscribePacket};
use mqtt3_protocol::types::SubscribeReturnCode;
use mqtt3_protocol::validation::validate_topic_filter;
use mqtt3_protocol::{Packet, QoS, Result};
use tracing::{debug, warn};

use super::ClientHandler;

/// QoS 1 is the highest level this broker grants.
const MAXIMUM_QOS: QoS = QoS::AtLeastOnce;

impl ClientHandler {
    pub(super) async fn handle_subscribe(&mut self, subscribe: SubscribePacket) -> Result<()> {
        let client_id = self.client_id.clone().unwrap_or_default();
        let mut return_codes = Vec::with_capacity(subscribe.filters.len());

        for filter in &subscribe.filters {
            if let Err(e) = validate_topic_filter(&filter.filter) {
                warn!(client_id = %client_id, "Rejecting subscription: {e}");
                return_codes.push(SubscribeReturnCode::Failure);
                continue;
            }

            let granted = filter.qos.min_with(MAXIMUM_QOS);
            let is_new = self
                .router
                .subscribe(self.client_addr, &client_id, &filter.filter, granted)
                .await;
            debug!(
                client_id = %client_id,
                topic_filter = %filter.filter,
                granted = ?granted,
                is_new,
                "Subscription registered"
            );
            return_codes.push(SubscribeReturnCode::granted(granted));
        }

        self.send_packet(Packet::SubAck(SubAckPacket::new(
            subscribe.packet_id,
            return_codes,
        )))
        .await
    }

    /// UNSUBACK is sent whether or not any filter was actually registered.
    pub(super) async fn handle_unsubscribe(
        &mut self,
        unsubscribe: UnsubscribePacket,
    ) -> Result<()> {
        let client_id = self.client_id.clone().unwrap_or_default();

        for topic_filter in &unsubscribe.filters {
            let removed = self.router.unsubscribe(self.client_addr, topic_filter).await;
            debug!(
                client_id = %client_id,
                topic_filter = %topic_filter,
                removed,
                "Unsubscribe processed"
            );
        }

        self.send_packet(Packet::UnsubAck(UnsubAckPacket::new(unsubscribe.packet_id)))
            .await
    }
}
