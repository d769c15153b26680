//! Consumer registry: `type_identifier -> set of subscriber connections`.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

/// Identifies a single broker-side connection, independent of its socket.
/// A plain counter rather than the socket handle itself, so the registry
/// can be a cheap `HashMap` without requiring the transport type to be
/// hashable.
pub type ConnectionId = u64;

/// A broker-side subscriber: the connection that registered for a type,
/// reachable by pushing already-encoded frame bytes onto its outbound
/// channel. Writes never block the registry or the publisher; a full or
/// closed channel is handled entirely by the receiving connection's own
/// writer task.
#[derive(Clone)]
pub struct Subscriber {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<Bytes>,
}

/// Maps event type identifiers to the connections currently subscribed to
/// them. Safe for concurrent use by many broker connection handlers.
#[derive(Default)]
pub struct ConsumerRegistry {
    subscribers: RwLock<HashMap<u8, HashMap<ConnectionId, Subscriber>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: registering the same connection for the same type twice
    /// just overwrites its entry with an equivalent one.
    pub async fn add(&self, type_identifier: u8, subscriber: Subscriber) {
        self.subscribers
            .write()
            .await
            .entry(type_identifier)
            .or_default()
            .insert(subscriber.id, subscriber);
    }

    /// A point-in-time snapshot of the subscribers for `type_identifier`.
    pub async fn connections_for(&self, type_identifier: u8) -> Vec<Subscriber> {
        self.subscribers
            .read()
            .await
            .get(&type_identifier)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of connections currently subscribed to `type_identifier`.
    pub async fn connection_count(&self, type_identifier: u8) -> usize {
        self.subscribers
            .read()
            .await
            .get(&type_identifier)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Removes `connection_id` from every type's subscriber set. Called on
    /// disconnect; after this returns, the connection is absent from every
    /// subscriber set.
    pub async fn remove_all(&self, connection_id: ConnectionId) {
        let mut subscribers = self.subscribers.write().await;
        for subs in subscribers.values_mut() {
            subs.remove(&connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(id: ConnectionId) -> (Subscriber, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Subscriber { id, sender: tx }, rx)
    }

    #[tokio::test]
    async fn add_and_connections_for_round_trip() {
        let registry = ConsumerRegistry::new();
        let (sub, _rx) = subscriber(1);
        registry.add(0, sub).await;
        assert_eq!(registry.connection_count(0).await, 1);
        assert_eq!(registry.connections_for(1).await.len(), 0);
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let registry = ConsumerRegistry::new();
        let (sub_a, _rx_a) = subscriber(1);
        let (sub_b, _rx_b) = subscriber(1);
        registry.add(0, sub_a).await;
        registry.add(0, sub_b).await;
        assert_eq!(registry.connection_count(0).await, 1);
    }

    #[tokio::test]
    async fn remove_all_clears_every_type() {
        let registry = ConsumerRegistry::new();
        let (sub, _rx) = subscriber(7);
        registry.add(0, sub.clone()).await;
        registry.add(2, sub).await;
        registry.remove_all(7).await;
        assert_eq!(registry.connection_count(0).await, 0);
        assert_eq!(registry.connection_count(2).await, 0);
    }
}
