//! Client-side connection: registration, publish, and the frame receive
//! loop.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::codec::CodecRegistry;
use crate::error::{EventError, FrameError};
use crate::events::EventBody;
use crate::frame::{split_frames, Frame, FrameType};

/// Owns the write half of a connected socket. Registration is sent once,
/// synchronously, as part of establishing the connection; subsequent
/// writes (publishes, and replies relayed from a pending queue) go through
/// an outbound channel drained by a dedicated writer task, the same
/// pattern the broker's connection handler uses for its own writes.
pub struct ClientConnection {
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Encodes a `PUBLISH` frame for `event`: leading event type identifier
/// byte, then the body `event` serializes itself into.
pub fn encode_publish<T: EventBody>(event: &T) -> Result<Bytes, EventError> {
    let mut body = Vec::new();
    event.write_body(&mut body)?;
    let mut payload = Vec::with_capacity(1 + body.len());
    payload.push(T::EVENT_TYPE.into());
    payload.extend_from_slice(&body);
    let frame = Frame::publish(payload).map_err(frame_error_to_event_error)?;
    Ok(frame.encode().freeze())
}

fn frame_error_to_event_error(err: FrameError) -> EventError {
    EventError::Decode(std::io::Error::new(std::io::ErrorKind::InvalidInput, err))
}

impl ClientConnection {
    /// Dials `host:port`, sends the initial `REGISTER_CONSUMERS` frame
    /// naming `type_identifiers`, and spawns the writer and receive-loop
    /// tasks. Returns a handle whose `publish` sends go through the
    /// writer task's channel.
    pub async fn connect(
        host: &str,
        port: u16,
        type_identifiers: &[u8],
        request_replay: bool,
        registry: Arc<CodecRegistry>,
    ) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        let (read_half, write_half) = stream.into_split();

        let register_frame = Frame::register_consumers(type_identifiers, request_replay)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;

        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        tx.send(register_frame.encode().freeze())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer task gone"))?;

        spawn_writer(write_half, rx);
        tokio::spawn(receive_loop(read_half, registry));

        Ok(Self { outbound: tx })
    }

    /// Serializes `event` and writes a `PUBLISH` frame. Returns an error
    /// only if the connection's writer task has already shut down.
    pub fn publish<T: EventBody>(&self, event: &T) -> Result<(), EventError> {
        let bytes = encode_publish(event)?;
        self.outbound
            .send(bytes)
            .map_err(|_| EventError::Decode(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed")))
    }

    /// Raw escape hatch used by [`crate::client::Client`] to flush
    /// pre-encoded pending frames once a connection is established.
    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Bytes> {
        self.outbound.clone()
    }
}

fn spawn_writer(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });
}

/// Reads inbound bytes, splits them into frames, and dispatches each
/// `CONSUME` payload to the codec registry off the I/O task.
async fn receive_loop(mut read_half: OwnedReadHalf, registry: Arc<CodecRegistry>) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        match read_half.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%err, "client socket read error");
                break;
            }
        }

        for frame in split_frames(&mut buf) {
            if frame.frame_type() != Some(FrameType::Consume) {
                continue;
            }
            let payload = frame.payload();
            if payload.len() <= 1 {
                tracing::warn!("discarding CONSUME frame with no event body");
                continue;
            }
            let payload = Bytes::copy_from_slice(payload);
            let registry = registry.clone();
            tokio::spawn(async move {
                registry.dispatch(&payload);
            });
        }
    }
}
