//! Client-side components: the codec registry, the per-connection send/
//! receive plumbing, and the connect/queue/drain entry point.

mod codec;
mod connection;
mod entry;

pub use codec::CodecRegistry;
pub use connection::ClientConnection;
pub use entry::{Client, Receiver};
