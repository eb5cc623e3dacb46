//! The broker server: accept loop, periodic session sweep, shutdown.

use crate::broker::auth::{AllowAllAuthProvider, AuthProvider, PasswordAuthProvider};
use crate::broker::client_handler::ClientHandler;
use crate::broker::config::BrokerConfig;
use crate::broker::router::MessageRouter;
use crate::broker::sessions::SessionRegistry;
use crate::broker::transport::BrokerTransport;
use mqtt3_protocol::{MqttError, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// MQTT 3.1.1 broker.
///
/// Construct with [`MqttBroker::bind`] or [`MqttBroker::with_config`], then
/// call [`MqttBroker::run`], which accepts connections until
/// [`MqttBroker::shutdown`] is signalled.
pub struct MqttBroker {
    config: Arc<BrokerConfig>,
    router: Arc<MessageRouter>,
    sessions: Arc<SessionRegistry>,
    auth_provider: Arc<dyn AuthProvider>,
    listener: Option<TcpListener>,
    shutdown_tx: broadcast::Sender<()>,
    ready_tx: Option<watch::Sender<bool>>,
    ready_rx: watch::Receiver<bool>,
}

async fn create_auth_provider(config: &BrokerConfig) -> Result<Arc<dyn AuthProvider>> {
    match (&config.password_file, config.allow_anonymous) {
        (Some(password_file), allow_anonymous) => {
            let provider = PasswordAuthProvider::from_file(password_file)
                .await?
                .with_anonymous(allow_anonymous);
            info!(
                "Password authentication enabled (anonymous: {})",
                allow_anonymous
            );
            Ok(Arc::new(provider) as Arc<dyn AuthProvider>)
        }
        (None, true) => {
            info!("Anonymous access enabled");
            Ok(Arc::new(AllowAllAuthProvider) as Arc<dyn AuthProvider>)
        }
        (None, false) => Err(MqttError::Configuration(
            "Authentication required but no password file specified".to_string(),
        )),
    }
}

impl MqttBroker {
    /// Creates a broker with default configuration bound to `addr`.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self> {
        let addr = addr
            .as_ref()
            .parse::<std::net::SocketAddr>()
            .map_err(|e| MqttError::Configuration(format!("Invalid address: {e}")))?;
        Self::with_config(BrokerConfig::default().with_bind_address(addr)).await
    }

    /// Creates a broker with custom configuration.
    pub async fn with_config(config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let auth_provider = create_auth_provider(&config).await?;

        let sessions = Arc::new(SessionRegistry::new());
        let router = Arc::new(MessageRouter::new(Arc::clone(&sessions)));
        let (shutdown_tx, _) = broadcast::channel(1);
        let (ready_tx, ready_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            router,
            sessions,
            auth_provider,
            listener: Some(listener),
            shutdown_tx,
            ready_tx: Some(ready_tx),
            ready_rx,
        })
    }

    /// Replaces the authentication provider built from the configuration.
    #[must_use]
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = provider;
        self
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    #[must_use]
    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// Returns a receiver that flips to `true` once the broker is accepting
    /// connections. Grab it before spawning [`MqttBroker::run`].
    #[must_use]
    pub fn ready_receiver(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    /// Runs the broker until shutdown: accepts connections, spawns a
    /// handler task per connection, and sweeps the session registry on the
    /// configured interval.
    pub async fn run(&mut self) -> Result<()> {
        let Some(listener) = self.listener.take() else {
            return Err(MqttError::InvalidState(
                "Broker already running".to_string(),
            ));
        };

        info!(addr = %self.config.bind_address, "Starting MQTT broker");

        let sessions = Arc::clone(&self.sessions);
        let sweep_interval = self.config.sweep_interval;
        let mut sweep_shutdown_rx = self.shutdown_tx.subscribe();
        let sweep_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.reset();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let swept = sessions.sweep().await;
                        if swept > 0 {
                            debug!(swept, "Session sweep removed dead sessions");
                        }
                    }
                    _ = sweep_shutdown_rx.recv() => {
                        debug!("Session sweep task shutting down");
                        break;
                    }
                }
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("Broker ready - accepting connections");
        if let Some(ready_tx) = self.ready_tx.take() {
            let _ = ready_tx.send(true);
        }

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!(addr = %addr, "New TCP connection");

                            let handler = ClientHandler::new(
                                BrokerTransport::tcp(stream),
                                addr,
                                Arc::clone(&self.config),
                                Arc::clone(&self.router),
                                Arc::clone(&self.sessions),
                                Arc::clone(&self.auth_provider),
                                self.shutdown_tx.subscribe(),
                            );

                            tokio::spawn(async move {
                                if let Err(e) = handler.run().await {
                                    if e.is_normal_disconnect() {
                                        debug!("Client handler finished");
                                    } else {
                                        warn!("Client handler error: {e}");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!("TCP accept error: {e}");
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Broker shutting down");
                    break;
                }
            }
        }

        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), sweep_handle).await;

        Ok(())
    }

    /// Signals the accept loop and every connection handler to stop.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .map(|_| ())
            .map_err(|_| MqttError::InvalidState("No receivers for shutdown signal".to_string()))
    }

    /// Clone of the shutdown signal sender, for stopping a broker whose
    /// ownership has moved into a task running [`MqttBroker::run`].
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broker_bind() {
        let broker = MqttBroker::bind("127.0.0.1:0").await;
        assert!(broker.is_ok());
        assert!(broker.unwrap().local_addr().is_some());
    }

    #[tokio::test]
    async fn test_broker_with_config() {
        let config = BrokerConfig::default()
            .with_bind_address("127.0.0.1:0".parse::<std::net::SocketAddr>().unwrap());
        assert!(MqttBroker::with_config(config).await.is_ok());
    }

    #[tokio::test]
    async fn test_auth_required_without_password_file() {
        let config = BrokerConfig::default()
            .with_bind_address("127.0.0.1:0".parse::<std::net::SocketAddr>().unwrap())
            .with_allow_anonymous(false);
        assert!(matches!(
            MqttBroker::with_config(config).await,
            Err(MqttError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_broker_shutdown() {
        let mut broker = MqttBroker::bind("127.0.0.1:0").await.unwrap();
        let mut ready = broker.ready_receiver();
        let shutdown = broker.shutdown_handle();

        let run_handle = tokio::spawn(async move { broker.run().await });
        ready.changed().await.unwrap();

        shutdown.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), run_handle)
            .await
            .expect("run did not stop after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_before_run_has_no_receivers() {
        let broker = MqttBroker::bind("127.0.0.1:0").await.unwrap();
        assert!(broker.shutdown().is_err());
    }
}
