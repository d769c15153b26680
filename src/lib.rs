//! `hotel-events` — a binary pub/sub event bus mediating between the
//! command and query sides of a CQRS hotel-booking application.
//!
//! The broker ([`broker::BrokerListener`]) accepts long-lived TCP
//! connections, durably appends published events to a per-type
//! [`log::EventLog`], and fans them out through a [`registry::ConsumerRegistry`]
//! to subscribed connections, optionally replaying history first. The
//! client side ([`client::Client`]) dials the broker, registers interest in
//! event types, and dispatches decoded `CONSUME` payloads to application
//! handlers via a [`client::CodecRegistry`].

pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod log;
pub mod registry;

/// General-purpose fallible result alias for async call sites, following
/// the convention of a single boxed-error alias rather than threading a
/// dedicated error enum through every binary-level call.
pub type AsyncResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
