#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

//! Sans-I/O MQTT 3.1.1 protocol engine.
//!
//! This crate contains everything needed to speak the wire protocol without
//! touching a socket: the packet codec ([`packet`]), the stream framer that
//! reassembles complete packets out of fragmented reads ([`framing`]), and
//! topic name/filter validation plus wildcard matching ([`validation`]).
//!
//! The broker in the `mqtt3` crate drives all I/O; this crate only ever sees
//! byte buffers.

pub mod encoding;
pub mod error;
pub mod framing;
pub mod packet;
pub mod types;
pub mod validation;

pub use error::{MqttError, Result};
pub use framing::FrameAccumulator;
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use types::{ConnectReturnCode, QoS, SubscribeReturnCode};
pub use validation::{topic_matches_filter, validate_topic_filter, validate_topic_name};
