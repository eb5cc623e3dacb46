//! Session registry: one live [`Session`] per accepted transport connection.
//!
//! A session is keyed by its connection identity (the peer socket address,
//! known at accept time) and later bound to the client id from a successful
//! CONNECT. The transport itself is owned exclusively by the connection
//! task; the registry reaches a connection through its delivery channel and
//! a one-shot disconnect trigger.

use mqtt3_protocol::packet::PublishPacket;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

/// Server-side state for one connected client.
#[derive(Debug)]
pub struct Session {
    identity: SocketAddr,
    client_id: Mutex<String>,
    sender: flume::Sender<PublishPacket>,
    disconnect_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl Session {
    #[must_use]
    pub fn identity(&self) -> SocketAddr {
        self.identity
    }

    /// Client id bound on CONNECT; empty until then.
    #[must_use]
    pub fn client_id(&self) -> String {
        self.client_id.lock().clone()
    }

    /// Binds the client id once the CONNECT handshake succeeds.
    pub fn bind_client_id(&self, client_id: &str) {
        *self.client_id.lock() = client_id.to_string();
    }

    /// Hands a publish to the owning connection task for delivery.
    ///
    /// Fails when the connection task is gone or its queue is full; the
    /// caller treats either as a dead subscriber.
    pub fn deliver(&self, publish: PublishPacket) -> bool {
        self.sender.try_send(publish).is_ok()
    }

    /// Liveness probe: the delivery channel has a live receiver iff the
    /// connection task is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.sender.is_disconnected()
    }

    /// Tells the owning connection task to close its transport and exit.
    /// Harmless if the task is already gone.
    fn trigger_disconnect(&self) {
        if let Some(tx) = self.disconnect_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Process-wide map of connection identity to live session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SocketAddr, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `identity`, creating it if absent.
    ///
    /// Idempotent per identity: a second call returns the existing session
    /// and drops the supplied channel halves.
    pub async fn get_or_create(
        &self,
        identity: SocketAddr,
        sender: flume::Sender<PublishPacket>,
        disconnect_tx: oneshot::Sender<()>,
    ) -> Arc<Session> {
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(identity).or_insert_with(|| {
            debug!(addr = %identity, "Session created");
            Arc::new(Session {
                identity,
                client_id: Mutex::new(String::new()),
                sender,
                disconnect_tx: Mutex::new(Some(disconnect_tx)),
            })
        }))
    }

    pub async fn get(&self, identity: SocketAddr) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&identity).cloned()
    }

    /// Removes the session, closing its transport. A double remove is a
    /// no-op.
    pub async fn remove(&self, identity: SocketAddr) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(&identity);
        if let Some(ref session) = removed {
            debug!(addr = %identity, client_id = %session.client_id(), "Session removed");
            session.trigger_disconnect();
        }
        removed
    }

    /// Probes every session and removes the dead ones, returning how many
    /// were swept.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|identity, session| {
            if session.is_alive() {
                true
            } else {
                warn!(addr = %identity, "Sweeping dead session");
                session.trigger_disconnect();
                false
            }
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
