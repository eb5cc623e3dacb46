use crate::broker::events::ActivityListener;
use mqtt3_protocol::{MqttError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn default_client_channel_capacity() -> usize {
    10000
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub bind_address: SocketAddr,
    pub max_packet_size: usize,
    /// How long a fresh connection may wait before its CONNECT arrives.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// A connection that produces no complete packet for this long is
    /// treated as dead and closed. PINGREQ is the client's way to stay
    /// under it; the protocol's own keep-alive field is not enforced.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Cadence of the session registry liveness sweep.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    #[serde(default = "default_client_channel_capacity")]
    pub client_channel_capacity: usize,
    pub allow_anonymous: bool,
    pub password_file: Option<PathBuf>,
    #[serde(skip)]
    pub activity_listener: Option<Arc<dyn ActivityListener>>,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("bind_address", &self.bind_address)
            .field("max_packet_size", &self.max_packet_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("sweep_interval", &self.sweep_interval)
            .field("client_channel_capacity", &self.client_channel_capacity)
            .field("allow_anonymous", &self.allow_anonymous)
            .field("password_file", &self.password_file)
            .field(
                "activity_listener",
                &self.activity_listener.as_ref().map(|_| "..."),
            )
            .finish()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1883".parse().unwrap(),
            max_packet_size: 1_048_576,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(20),
            sweep_interval: Duration::from_secs(60),
            client_channel_capacity: default_client_channel_capacity(),
            allow_anonymous: true,
            password_file: None,
            activity_listener: None,
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bind_address(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.bind_address = addr.into();
        self
    }

    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_client_channel_capacity(mut self, capacity: usize) -> Self {
        self.client_channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    #[must_use]
    pub fn with_password_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.password_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_activity_listener(mut self, listener: Arc<dyn ActivityListener>) -> Self {
        self.activity_listener = Some(listener);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<&Self> {
        if self.max_packet_size < 1024 {
            return Err(MqttError::Configuration(
                "max_packet_size must be at least 1024 bytes".to_string(),
            ));
        }
        if self.max_packet_size > 268_435_455 {
            return Err(MqttError::Configuration(
                "max_packet_size exceeds the protocol maximum of 268435455".to_string(),
            ));
        }
        if self.idle_timeout.is_zero()
            || self.connect_timeout.is_zero()
            || self.sweep_interval.is_zero()
        {
            return Err(MqttError::Configuration(
                "timeouts and intervals must be non-zero".to_string(),
            ));
        }
        if self.client_channel_capacity == 0 {
            return Err(MqttError::Configuration(
                "client_channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(self)
    }
}
