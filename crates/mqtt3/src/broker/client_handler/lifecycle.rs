//! PINGREQ, DISCONNECT, and packet-id bookkeeping.

use mqtt3_protocol::{MqttError, Packet, Result};
use tracing::debug;

use super::ClientHandler;

impl ClientHandler {
    pub(super) async fn handle_pingreq(&mut self) -> Result<()> {
        self.send_packet(Packet::PingResp).await
    }

    /// Graceful, client-initiated termination. Returning `ClientClosed`
    /// unwinds the packet loop into the shared cleanup path in `run`.
    pub(super) fn handle_disconnect(&mut self) -> Result<()> {
        debug!(addr = %self.client_addr, "DISCONNECT received");
        self.normal_disconnect = true;
        Err(MqttError::ClientClosed)
    }

    /// Packet ids for outbound QoS 1 deliveries; wraps past zero.
    pub(super) fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = if self.next_packet_id == u16::MAX {
            1
        } else {
            self.next_packet_id + 1
        };
        id
    }
}
