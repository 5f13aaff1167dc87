//! Notifier contract
//!
//! Best-effort publication of opaque payloads to named channels. The engine
//! only publishes; the subscription side exists for the log-streaming API
//! and the test suite.

pub mod memory;
pub mod postgres;

pub use self::memory::InMemoryPubsub;
pub use self::postgres::PgPubsub;

use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum PubsubError {
    #[error("payload must be UTF-8: {0}")]
    InvalidPayload(#[from] std::string::FromUtf8Error),
    #[error("pubsub connection closed")]
    Closed,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Publish/subscribe over named channels.
///
/// Delivery is best-effort: a failed publish surfaces to the caller but
/// never invalidates writes that already landed in the store.
#[async_trait]
pub trait Pubsub: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PubsubError>;

    /// Subscribes to a channel. The receiver sees every payload published
    /// after this call returns.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, PubsubError>;
}
