//! Append-only typed event log with ordered replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::LogError;

/// A single stored event: the exact bytes re-emitted as a `CONSUME`
/// payload (including its leading event type byte), plus a monotonic
/// position used to order replay for that type.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub type_identifier: u8,
    pub payload: Bytes,
    pub created_at: u64,
}

/// In-memory, append-only event log partitioned by event type identifier.
///
/// Appends for a given type are serialized behind that type's own lock, so
/// concurrent publishers of different types never contend with each
/// other, and `list_ascending` observes a consistent, in-order snapshot
/// for its type.
#[derive(Debug, Default)]
pub struct EventLog {
    types: RwLock<HashMap<u8, Arc<Mutex<Vec<StoredEvent>>>>>,
    sequence: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn type_log(&self, type_identifier: u8) -> Arc<Mutex<Vec<StoredEvent>>> {
        if let Some(log) = self.types.read().await.get(&type_identifier) {
            return log.clone();
        }
        self.types
            .write()
            .await
            .entry(type_identifier)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Locks `type_identifier`'s partition and hands back the owned guard,
    /// letting a caller hold it across more than its own method call (e.g.
    /// a registry update plus a replay send, or an append plus a fan-out)
    /// so that operation is atomic with respect to any other append to the
    /// same type.
    pub(crate) async fn lock_partition(&self, type_identifier: u8) -> OwnedMutexGuard<Vec<StoredEvent>> {
        self.type_log(type_identifier).await.lock_owned().await
    }

    /// Allocates the next position in the global append sequence. Exposed
    /// so a caller already holding a partition lock from
    /// [`EventLog::lock_partition`] can append without re-deriving it.
    pub(crate) fn next_position(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshots every payload currently held in an already-locked
    /// partition, in append order.
    pub(crate) fn replay_locked(partition: &[StoredEvent]) -> Vec<Bytes> {
        partition.iter().map(|event| event.payload.clone()).collect()
    }

    /// Appends `payload` (the full `PUBLISH` payload, leading type byte
    /// included) to the log for `type_identifier`. Duplicates are
    /// permitted; idempotency is not required.
    pub async fn append(&self, type_identifier: u8, payload: Bytes) -> Result<(), LogError> {
        let mut partition = self.lock_partition(type_identifier).await;
        let created_at = self.next_position();
        partition.push(StoredEvent {
            type_identifier,
            payload,
            created_at,
        });
        Ok(())
    }

    /// Returns every payload ever appended for `type_identifier`, in
    /// append order.
    pub async fn list_ascending(&self, type_identifier: u8) -> Result<Vec<Bytes>, LogError> {
        let partition = self.lock_partition(type_identifier).await;
        Ok(partition.iter().map(|event| event.payload.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_events_in_append_order() {
        let log = EventLog::new();
        log.append(0, Bytes::from_static(&[0, 1])).await.unwrap();
        log.append(0, Bytes::from_static(&[0, 2])).await.unwrap();
        log.append(1, Bytes::from_static(&[1, 9])).await.unwrap();

        let type0 = log.list_ascending(0).await.unwrap();
        assert_eq!(type0, vec![Bytes::from_static(&[0, 1]), Bytes::from_static(&[0, 2])]);

        let type1 = log.list_ascending(1).await.unwrap();
        assert_eq!(type1, vec![Bytes::from_static(&[1, 9])]);
    }

    #[tokio::test]
    async fn unknown_type_replays_empty() {
        let log = EventLog::new();
        assert!(log.list_ascending(200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_to_different_types_do_not_interleave() {
        let log = Arc::new(EventLog::new());
        let mut handles = Vec::new();
        for i in 0u8..4 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..50u8 {
                    log.append(i, Bytes::from(vec![i, n])).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        for i in 0u8..4 {
            let events = log.list_ascending(i).await.unwrap();
            assert_eq!(events.len(), 50);
            for (n, payload) in events.iter().enumerate() {
                assert_eq!(payload.as_ref(), &[i, n as u8]);
            }
        }
    }
}
