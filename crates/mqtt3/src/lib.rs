#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

//! # MQTT 3.1.1 Broker
//!
//! A publish/subscribe message broker speaking the MQTT 3.1.1 wire protocol
//! over TCP. Clients connect (optionally authenticating with a username and
//! password), publish to hierarchical topics at QoS 0/1, and subscribe to
//! topic filters with `+`/`#` wildcards.
//!
//! Each accepted connection runs as its own tokio task; all tasks share one
//! topic-subscription table and one session registry. The wire codec itself
//! lives in the `mqtt3-protocol` crate.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mqtt3::broker::MqttBroker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut broker = MqttBroker::bind("0.0.0.0:1883").await?;
//!     broker.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Unsupported by design: QoS 2, retained messages, will messages,
//! persistent sessions, TLS, and clustering.

pub mod broker;

pub use mqtt3_protocol as protocol;
pub use mqtt3_protocol::{MqttError, Packet, QoS, Result};
