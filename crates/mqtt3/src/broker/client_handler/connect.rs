//! CONNECT handshake handling.

use mqtt3_protocol::packet::{ConnAckPacket, ConnectPacket};
use mqtt3_protocol::types::ConnectReturnCode;
use mqtt3_protocol::{MqttError, Packet, Result};
use tracing::{debug, info, warn};

use super::ClientHandler;

const SUPPORTED_PROTOCOL: &str = "MQTT";

impl ClientHandler {
    pub(super) async fn handle_connect(&mut self, connect: ConnectPacket) -> Result<()> {
        debug!(
            client_id = %connect.client_id,
            addr = %self.client_addr,
            protocol_name = %connect.protocol_name,
            protocol_version = connect.protocol_version,
            clean_session = connect.clean_session,
            keep_alive = connect.keep_alive,
            "Processing CONNECT"
        );

        if connect.protocol_name != SUPPORTED_PROTOCOL {
            warn!(
                addr = %self.client_addr,
                protocol_name = %connect.protocol_name,
                "Rejecting connection: unsupported protocol"
            );
            self.refuse_connect(ConnectReturnCode::UnacceptableProtocolVersion)
                .await?;
            return Err(MqttError::UnsupportedProtocol(connect.protocol_name));
        }

        if connect.client_id.is_empty() {
            warn!(addr = %self.client_addr, "Rejecting connection: empty client ID");
            self.refuse_connect(ConnectReturnCode::UnacceptableProtocolVersion)
                .await?;
            return Err(MqttError::InvalidClientId(
                "Client ID must not be empty".to_string(),
            ));
        }

        if connect.will.is_some() {
            debug!(
                client_id = %connect.client_id,
                "Will message ignored: will delivery is not supported"
            );
        }
        if !connect.clean_session {
            debug!(
                client_id = %connect.client_id,
                "Persistent sessions not supported; treating session as clean"
            );
        }

        let auth_result = self
            .auth_provider
            .authenticate(&connect, self.client_addr)
            .await?;
        if !auth_result.authenticated {
            debug!(
                client_id = %connect.client_id,
                return_code = ?auth_result.return_code,
                "Authentication failed"
            );
            self.refuse_connect(auth_result.return_code).await?;
            return Err(MqttError::AuthenticationFailed);
        }

        if let Some(ref session) = self.session {
            session.bind_client_id(&connect.client_id);
        }
        self.client_id = Some(connect.client_id.clone());

        self.send_packet(Packet::ConnAck(ConnAckPacket::accepted()))
            .await?;

        info!(
            client_id = %connect.client_id,
            addr = %self.client_addr,
            "Client connected"
        );
        if let Some(ref listener) = self.config.activity_listener {
            listener.on_client_connected(&connect.client_id, self.client_addr);
        }

        Ok(())
    }

    async fn refuse_connect(&mut self, return_code: ConnectReturnCode) -> Result<()> {
        self.send_packet(Packet::ConnAck(ConnAckPacket::new(return_code)))
            .await
    }
}
