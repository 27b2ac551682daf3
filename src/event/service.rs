use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, error};

use super::{Notification, NotificationStream, Subject};

#[async_trait]
pub trait EventService {
    /// Fire-and-forget: delivery failures are logged, never returned.
    async fn publish(&self, s: &Subject<'_>, n: &Notification);

    async fn subscribe(&self, s: &Subject<'_>) -> super::Result<NotificationStream>;
}

#[derive(Clone)]
pub struct NatsEventService {
    pubsub: async_nats::Client,
}

impl NatsEventService {
    pub fn new(pubsub: async_nats::Client) -> Self {
        Self { pubsub }
    }
}

#[async_trait]
impl EventService for NatsEventService {
    async fn publish(&self, s: &Subject<'_>, n: &Notification) {
        debug!("Publishing {n:?} to {s}");

        let payload = match serde_json::to_vec(n) {
            Ok(p) => Bytes::from(p),
            Err(e) => {
                error!("Could not serialize notification: {e:?}");
                return;
            }
        };

        if let Err(e) = self.pubsub.publish(s.to_string(), payload).await {
            error!("Failed to publish notification to {s}: {e:?}");
        }
    }

    async fn subscribe(&self, s: &Subject<'_>) -> super::Result<NotificationStream> {
        let subscriber = self.pubsub.subscribe(s.to_string()).await?;

        let stream = subscriber.filter_map(|msg| async move {
            match serde_json::from_slice::<Notification>(&msg.payload) {
                Ok(n) => Some(n),
                Err(e) => {
                    error!("Failed to deserialize notification: {e:?}");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
