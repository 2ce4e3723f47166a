//! Redis pub/sub relay for chat groups shared across API processes.
//!
//! Every group maps to the channel `elearn:chat:{group}`. Senders publish
//! there; each process runs one listener on `PSUBSCRIBE elearn:chat:*` that
//! republishes into its local [`ChatHub`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::task::JoinHandle;

use elearn_common::types::RoomEvent;

use crate::hub::ChatHub;

pub const CHANNEL_PREFIX: &str = "elearn:chat:";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid chat event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Redis channel carrying a group's traffic.
pub fn channel_for(group: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, group)
}

/// Inverse of [`channel_for`]; `None` for channels outside the chat namespace.
pub fn group_from_channel(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(CHANNEL_PREFIX)
        .filter(|group| !group.is_empty())
}

/// Publishing half of the relay.
#[derive(Clone)]
pub struct RedisRelay {
    conn: ConnectionManager,
}

impl RedisRelay {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Publish an event; returns the number of subscribed processes.
    pub async fn publish(&self, group: &str, event: &RoomEvent) -> Result<usize, RelayError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let subscribers: i64 = conn.publish(channel_for(group), payload).await?;
        Ok(subscribers.max(0) as usize)
    }

    /// Start the listener that feeds relayed events into `hub`.
    ///
    /// The task reconnects on its own and lives until the runtime shuts down.
    pub fn spawn_listener(client: redis::Client, hub: Arc<ChatHub>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = Self::listen(&client, &hub).await {
                    tracing::error!(error = %e, "Chat relay listener failed, reconnecting in 5s");
                } else {
                    tracing::warn!("Chat relay stream ended, reconnecting in 5s");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    async fn listen(client: &redis::Client, hub: &ChatHub) -> Result<(), RelayError> {
        let mut pubsub = client.get_async_pubsub().await?;
        let pattern = format!("{}*", CHANNEL_PREFIX);
        pubsub.psubscribe(&pattern).await?;
        tracing::info!(pattern = %pattern, "Chat relay listening");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let Some(group) = group_from_channel(msg.get_channel_name()) else {
                continue;
            };
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read relayed chat payload");
                    continue;
                }
            };
            match serde_json::from_str::<RoomEvent>(&payload) {
                Ok(event) => {
                    let delivered = hub.publish(group, event).await;
                    tracing::trace!(group, delivered, "Relayed chat event delivered");
                }
                Err(e) => {
                    tracing::warn!(error = %e, group, "Dropping malformed relayed chat event");
                }
            }
        }
        Ok(())
    }
}
