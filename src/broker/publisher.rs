//! Broker-side fan-out.

use std::sync::Arc;

use bytes::Bytes;

use crate::frame::Frame;
use crate::registry::ConsumerRegistry;

/// Given a payload and its type identifier, builds the `CONSUME` frame once
/// and writes it to every current subscriber of that type. Writes are
/// best-effort: a slow or dead peer's channel filling up or closing never
/// blocks or fails delivery to other subscribers.
pub struct Publisher {
    registry: Arc<ConsumerRegistry>,
}

impl Publisher {
    pub fn new(registry: Arc<ConsumerRegistry>) -> Self {
        Self { registry }
    }

    pub async fn publish(&self, payload: Bytes, type_identifier: u8) {
        let frame = match Frame::consume(payload) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(type_identifier, %err, "failed to build CONSUME frame, dropping publish");
                return;
            }
        };
        let encoded = frame.encode().freeze();

        for subscriber in self.registry.connections_for(type_identifier).await {
            if subscriber.sender.send(encoded.clone()).is_err() {
                tracing::debug!(
                    connection = subscriber.id,
                    type_identifier,
                    "subscriber channel closed, dropping publish"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Subscriber;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn fans_out_consume_frame_to_every_subscriber_of_the_type() {
        let registry = Arc::new(ConsumerRegistry::new());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry
            .add(
                0,
                Subscriber {
                    id: 1,
                    sender: tx1,
                },
            )
            .await;
        registry
            .add(
                0,
                Subscriber {
                    id: 2,
                    sender: tx2,
                },
            )
            .await;

        let publisher = Publisher::new(registry);
        publisher.publish(Bytes::from_static(&[0, 9]), 0).await;

        let frame1 = rx1.recv().await.unwrap();
        let frame2 = rx2.recv().await.unwrap();
        assert_eq!(frame1, frame2);
        assert_eq!(&frame1[8..10], &[0, 9]);
    }

    #[tokio::test]
    async fn does_not_fan_out_to_subscribers_of_other_types() {
        let registry = Arc::new(ConsumerRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add(2, Subscriber { id: 1, sender: tx }).await;

        let publisher = Publisher::new(registry);
        publisher.publish(Bytes::from_static(&[0, 9]), 0).await;

        assert!(rx.try_recv().is_err());
    }
}
