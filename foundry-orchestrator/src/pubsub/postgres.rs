//! Postgres pubsub
//!
//! `NOTIFY`/`LISTEN` backed [`Pubsub`]. One background task owns the
//! listening connection; subscriptions register a channel with it and
//! receive payloads over an in-process channel map. Payloads ride the
//! notification text, so they must be UTF-8 (ours are JSON or empty).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use super::{Pubsub, PubsubError};

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>;

struct ListenRequest {
    channel: String,
    done: oneshot::Sender<Result<(), sqlx::Error>>,
}

/// Postgres-backed [`Pubsub`].
pub struct PgPubsub {
    pool: PgPool,
    subscribers: Arc<Mutex<Subscribers>>,
    listen_tx: mpsc::UnboundedSender<ListenRequest>,
}

impl PgPubsub {
    pub async fn new(pool: PgPool) -> Result<Self, PubsubError> {
        let listener = PgListener::connect_with(&pool).await?;
        let subscribers: Arc<Mutex<Subscribers>> = Arc::default();
        let (listen_tx, listen_rx) = mpsc::unbounded_channel();
        tokio::spawn(listen_loop(listener, listen_rx, Arc::clone(&subscribers)));
        Ok(Self {
            pool,
            subscribers,
            listen_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Pubsub for PgPubsub {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PubsubError> {
        let payload = String::from_utf8(payload.to_vec())?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, PubsubError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().entry(channel.to_string()).or_default().push(sender);

        // Wait until the listener task has LISTENed so nothing published
        // after this call is missed.
        let (done, ready) = oneshot::channel();
        self.listen_tx
            .send(ListenRequest {
                channel: channel.to_string(),
                done,
            })
            .map_err(|_| PubsubError::Closed)?;
        ready.await.map_err(|_| PubsubError::Closed)??;
        Ok(receiver)
    }
}

async fn listen_loop(
    mut listener: PgListener,
    mut requests: mpsc::UnboundedReceiver<ListenRequest>,
    subscribers: Arc<Mutex<Subscribers>>,
) {
    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    // Every PgPubsub handle is gone.
                    break;
                };
                let result = listener.listen(&request.channel).await;
                let _ = request.done.send(result);
            }
            notification = listener.recv() => {
                match notification {
                    Ok(notification) => {
                        let mut subscribers =
                            subscribers.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Some(senders) = subscribers.get_mut(notification.channel()) {
                            let payload = notification.payload().as_bytes();
                            senders.retain(|sender| sender.send(payload.to_vec()).is_ok());
                        }
                    }
                    Err(err) => {
                        // recv re-establishes the connection on the next
                        // call; subscribers may miss notifications sent
                        // while it was down.
                        tracing::error!("pubsub listener error: {}", err);
                    }
                }
            }
        }
    }
}
