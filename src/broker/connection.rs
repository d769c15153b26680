//! Per-socket broker connection state machine.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::publisher::Publisher;
use crate::frame::{split_frames, Frame, FrameType};
use crate::log::{EventLog, StoredEvent};
use crate::registry::{ConnectionId, ConsumerRegistry, Subscriber};

/// States of the per-socket state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRegistration,
    Active,
    Closed,
}

/// Drives a single accepted socket: parses frames on the I/O task, and
/// dispatches the blocking-capable log operations to a separate spawned
/// task so that storage latency never stalls this or any other
/// connection's frame processing.
pub struct BrokerConnection {
    id: ConnectionId,
    stream: TcpStream,
    log: Arc<EventLog>,
    registry: Arc<ConsumerRegistry>,
    publisher: Arc<Publisher>,
}

impl BrokerConnection {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        log: Arc<EventLog>,
        registry: Arc<ConsumerRegistry>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            id,
            stream,
            log,
            registry,
            publisher,
        }
    }

    /// Runs the connection to completion: registration, then publish
    /// handling, until the socket closes. Always de-registers from the
    /// consumer registry before returning.
    pub async fn run(self) {
        let (read_half, write_half) = self.stream.into_split();
        let mut reader = BufReader::new(read_half);

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let mut write_half = write_half;
        let writer_task = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut state = ConnectionState::AwaitingRegistration;
        let mut registered_types: HashSet<u8> = HashSet::new();
        let mut buf = BytesMut::with_capacity(4096);

        loop {
            match reader.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(connection = self.id, %err, "socket read error");
                    break;
                }
            }

            for frame in split_frames(&mut buf) {
                state = self
                    .handle_frame(frame, state, &tx, &mut registered_types)
                    .await;
            }
        }

        self.registry.remove_all(self.id).await;
        drop(tx);
        let _ = writer_task.await;
        tracing::info!(connection = self.id, "connection closed");
    }

    async fn handle_frame(
        &self,
        frame: Frame,
        state: ConnectionState,
        tx: &mpsc::UnboundedSender<Bytes>,
        registered_types: &mut HashSet<u8>,
    ) -> ConnectionState {
        let Some(frame_type) = frame.frame_type() else {
            tracing::debug!(connection = self.id, "discarding frame with unknown type byte");
            return state;
        };

        match (state, frame_type) {
            (ConnectionState::AwaitingRegistration, FrameType::RegisterConsumers) => {
                self.handle_register(&frame, tx, registered_types).await;
                ConnectionState::Active
            }
            (ConnectionState::AwaitingRegistration, _) => {
                tracing::debug!(
                    connection = self.id,
                    "discarding frame received before registration"
                );
                state
            }
            (ConnectionState::Active, FrameType::Publish) => {
                self.handle_publish(&frame).await;
                state
            }
            (ConnectionState::Active, FrameType::RegisterConsumers) => {
                tracing::debug!(connection = self.id, "ignoring re-registration attempt");
                state
            }
            (ConnectionState::Active, FrameType::Consume) => state,
            (ConnectionState::Closed, _) => state,
        }
    }

    /// Registers this connection for every type named in `frame`'s payload
    /// and, if requested, replays that type's history. Each type is handled
    /// under that type's own log partition lock, held across both the
    /// registry insert and the replay snapshot/send: this is what stops a
    /// concurrent `PUBLISH` of the same type (see `handle_publish`, which
    /// takes the same lock around its append + fan-out) from landing
    /// between "now subscribed" and "replay sent", which would otherwise
    /// either double-deliver the event or deliver it out of order.
    async fn handle_register(
        &self,
        frame: &Frame,
        tx: &mpsc::UnboundedSender<Bytes>,
        registered_types: &mut HashSet<u8>,
    ) {
        let replay_requested = frame.replay_requested();
        let subscriber = Subscriber {
            id: self.id,
            sender: tx.clone(),
        };

        for &type_identifier in frame.payload() {
            let log = self.log.clone();
            let registry = self.registry.clone();
            let subscriber = subscriber.clone();
            let tx = tx.clone();
            let connection_id = self.id;

            let joined = tokio::spawn(async move {
                let partition = log.lock_partition(type_identifier).await;
                registry.add(type_identifier, subscriber).await;
                if replay_requested {
                    for payload in EventLog::replay_locked(&partition) {
                        match Frame::consume(payload) {
                            Ok(frame) => {
                                let _ = tx.send(frame.encode().freeze());
                            }
                            Err(err) => {
                                tracing::error!(
                                    connection = connection_id,
                                    %err,
                                    "failed to frame replayed event"
                                );
                            }
                        }
                    }
                }
            })
            .await;

            if let Err(join_err) = joined {
                tracing::warn!(
                    connection = self.id,
                    type_identifier,
                    %join_err,
                    "registration worker task failed"
                );
                continue;
            }

            registered_types.insert(type_identifier);
        }

        tracing::info!(
            connection = self.id,
            types = registered_types.len(),
            replay_requested,
            "registered consumer"
        );
    }

    /// Appends `frame`'s payload and fans it out, both under the same log
    /// partition lock a concurrent `handle_register` for this type would
    /// take around its own registry-insert + replay, so the two can never
    /// interleave for one type.
    async fn handle_publish(&self, frame: &Frame) {
        let payload = frame.payload();
        if payload.is_empty() {
            tracing::warn!(connection = self.id, "discarding empty PUBLISH payload");
            return;
        }
        let type_identifier = payload[0];
        let payload = Bytes::copy_from_slice(payload);

        let log = self.log.clone();
        let publisher = self.publisher.clone();
        let append_payload = payload.clone();

        let joined = tokio::spawn(async move {
            let mut partition = log.lock_partition(type_identifier).await;
            let created_at = log.next_position();
            partition.push(StoredEvent {
                type_identifier,
                payload: append_payload,
                created_at,
            });
            publisher.publish(payload, type_identifier).await;
        })
        .await;

        if let Err(join_err) = joined {
            tracing::error!(
                connection = self.id,
                type_identifier,
                %join_err,
                "dropping publish: append/fan-out worker task failed"
            );
        }
    }
}
