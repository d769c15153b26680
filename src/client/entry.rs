//! Client entry point: connect, buffer pre-connect publishes, drain on
//! connect.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use super::codec::CodecRegistry;
use super::connection::{encode_publish, ClientConnection};
use crate::events::EventBody;

/// A set of handlers an application wants wired up before it connects,
/// built fluently: `Receiver::new().register(on_room_booked).register(on_customer_created)`.
#[derive(Default)]
pub struct Receiver {
    registrations: Vec<Box<dyn FnOnce(&mut CodecRegistry) + Send>>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `T`'s event type.
    pub fn register<T>(mut self, handler: impl Fn(T) + Send + Sync + 'static) -> Self
    where
        T: EventBody + Send + 'static,
    {
        self.registrations
            .push(Box::new(move |registry| registry.register::<T>(handler)));
        self
    }
}

fn build_codec_registry(receivers: Vec<Receiver>) -> CodecRegistry {
    let mut registry = CodecRegistry::new();
    for receiver in receivers {
        for registration in receiver.registrations {
            registration(&mut registry);
        }
    }
    registry
}

struct ClientState {
    sender: Option<mpsc::UnboundedSender<Bytes>>,
    pending: VecDeque<Bytes>,
}

/// Application-facing object that dials the broker, queues publishes
/// submitted before the connection is ready, and drains them in FIFO
/// order once it is.
///
/// `Client::start` returns immediately; dialing happens in the
/// background, so callers may publish right away without waiting for the
/// connection to complete.
pub struct Client {
    state: Mutex<ClientState>,
    #[allow(dead_code)] // kept alive for the lifetime of the client
    connection: Mutex<Option<ClientConnection>>,
}

impl Client {
    /// Dials `host:port` in the background, registering for the union of
    /// type identifiers declared by `receivers`. `request_replay` sets the
    /// `REPLAY_REQUESTED` flag on the registration frame.
    pub fn start(
        host: impl Into<String>,
        port: u16,
        request_replay: bool,
        receivers: Vec<Receiver>,
    ) -> Arc<Client> {
        let registry = Arc::new(build_codec_registry(receivers));
        let client = Arc::new(Client {
            state: Mutex::new(ClientState {
                sender: None,
                pending: VecDeque::new(),
            }),
            connection: Mutex::new(None),
        });

        let host = host.into();
        let task_client = client.clone();
        tokio::spawn(async move {
            task_client.connect_and_drain(host, port, request_replay, registry).await;
        });

        client
    }

    async fn connect_and_drain(
        self: Arc<Self>,
        host: String,
        port: u16,
        request_replay: bool,
        registry: Arc<CodecRegistry>,
    ) {
        let type_identifiers = registry.supported_types();
        match ClientConnection::connect(&host, port, &type_identifiers, request_replay, registry).await {
            Ok(connection) => {
                let sender = connection.sender();
                *self.connection.lock().await = Some(connection);

                // Install the sender and flush anything queued while the
                // dial was in flight, all under one lock so no publish()
                // call can race between "queue it" and "it's connected".
                let mut state = self.state.lock().await;
                while let Some(bytes) = state.pending.pop_front() {
                    let _ = sender.send(bytes);
                }
                state.sender = Some(sender);
            }
            Err(err) => {
                tracing::error!(%err, %host, port, "failed to connect to broker, publishes remain queued");
            }
        }
    }

    /// Serializes `event` and either sends it immediately (connection
    /// ready) or appends it to the pending queue (still dialing), in the
    /// order `publish` is called.
    pub async fn publish<T: EventBody>(&self, event: &T) {
        let bytes = match encode_publish(event) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(%err, "failed to encode event for publish");
                return;
            }
        };

        let mut state = self.state.lock().await;
        match &state.sender {
            Some(sender) => {
                let _ = sender.send(bytes);
            }
            None => state.pending.push_back(bytes),
        }
    }
}
