//! Error types for the event bus. Generalizes `TransportError` into
//! per-component `thiserror` enums instead of one grab-bag error.

use thiserror::Error;

/// Errors from constructing or parsing a wire [`crate::frame::Frame`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes would overflow the 16-bit frame size field")]
    PayloadTooLarge(usize),
}

/// Errors surfaced while encoding or decoding an event body.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event payload is empty")]
    EmptyPayload,
    #[error("unknown event type identifier {0}")]
    UnknownType(u8),
    #[error("failed to decode event body: {0}")]
    Decode(#[from] std::io::Error),
}

/// Storage faults from the event log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("storage fault appending event of type {type_identifier}: {source}")]
    Append {
        type_identifier: u8,
        #[source]
        source: std::io::Error,
    },
    #[error("storage fault listing events of type {type_identifier}: {source}")]
    List {
        type_identifier: u8,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal broker startup errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to bind broker listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
