//! The broker: TCP server, per-connection protocol handlers, and the shared
//! registries they mutate.

pub mod auth;
mod client_handler;
pub mod config;
pub mod events;
pub mod router;
pub mod server;
pub mod sessions;
pub mod transport;

pub use auth::{AllowAllAuthProvider, AuthProvider, AuthResult, PasswordAuthProvider};
pub use config::BrokerConfig;
pub use events::ActivityListener;
pub use router::MessageRouter;
pub use server::MqttBroker;
pub use sessions::SessionRegistry;
