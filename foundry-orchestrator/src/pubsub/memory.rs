//! In-memory pubsub
//!
//! Channel-map backend used by the test suite and development tooling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Pubsub, PubsubError};

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>;

/// In-memory [`Pubsub`] backend.
#[derive(Clone, Default)]
pub struct InMemoryPubsub {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl InMemoryPubsub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Pubsub for InMemoryPubsub {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PubsubError> {
        let mut subscribers = self.lock();
        if let Some(senders) = subscribers.get_mut(channel) {
            // Receivers dropped by subscribers are pruned as we go.
            senders.retain(|sender| sender.send(payload.to_vec()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, PubsubError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().entry(channel.to_string()).or_default().push(sender);
        Ok(receiver)
    }
}
