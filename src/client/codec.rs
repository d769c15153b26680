//! Client-side codec registry: type byte -> (deserializer, handlers).

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::events::EventBody;

type HandlerFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Translates `CONSUME` payloads into application-level event objects and
/// dispatches them to every handler registered for that event's type.
///
/// Registration is generic over the concrete `EventBody`, so the decoder
/// for a type is baked into its handler closure at registration time —
/// there is no separate `Any`-downcasting step at dispatch time.
#[derive(Default)]
pub struct CodecRegistry {
    handlers: HashMap<u8, Vec<HandlerFn>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `T`'s event type. Duplicate registrations
    /// for the same type identifier accumulate; all run on dispatch.
    pub fn register<T>(&mut self, handler: impl Fn(T) + Send + Sync + 'static)
    where
        T: EventBody + Send + 'static,
    {
        let type_identifier: u8 = T::EVENT_TYPE.into();
        let wrapped: HandlerFn = Arc::new(move |body: &[u8]| match T::read_body(&mut std::io::Cursor::new(body)) {
            Ok(event) => handler(event),
            Err(err) => {
                tracing::warn!(type_identifier, %err, "failed to decode event body, discarding");
            }
        });
        self.handlers.entry(type_identifier).or_default().push(wrapped);
    }

    /// The full set of registered type identifiers, for populating a
    /// `REGISTER_CONSUMERS` payload.
    pub fn supported_types(&self) -> Vec<u8> {
        self.handlers.keys().copied().collect()
    }

    /// Decodes and dispatches a `CONSUME` payload (leading type byte plus
    /// body). Payloads with no body, or for a type with no registered
    /// handler, are logged and discarded. A handler that panics is caught
    /// so the remaining handlers for the event, and the receive loop
    /// itself, are unaffected.
    pub fn dispatch(&self, payload: &[u8]) {
        if payload.len() <= 1 {
            tracing::warn!("discarding CONSUME payload with no event body");
            return;
        }
        let type_identifier = payload[0];
        let body = &payload[1..];

        let Some(handlers) = self.handlers.get(&type_identifier) else {
            tracing::debug!(type_identifier, "no handler registered, discarding");
            return;
        };

        for handler in handlers {
            let handler = handler.clone();
            let body = body.to_vec();
            let outcome = panic::catch_unwind(AssertUnwindSafe(move || handler(&body)));
            if outcome.is_err() {
                tracing::error!(type_identifier, "event handler panicked, continuing with remaining handlers");
            }
        }
    }
}
