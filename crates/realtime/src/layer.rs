//! Group send entry point used by the HTTP and WebSocket handlers.

use std::sync::Arc;

use tokio::sync::broadcast;

use elearn_common::types::{ChatEvent, RoomEvent};

use crate::hub::ChatHub;
use crate::relay::RedisRelay;

/// Local hub plus an optional cross-process relay.
#[derive(Clone)]
pub struct ChannelLayer {
    hub: Arc<ChatHub>,
    relay: Option<RedisRelay>,
}

impl ChannelLayer {
    /// Deliver only within this process.
    pub fn local(hub: Arc<ChatHub>) -> Self {
        Self { hub, relay: None }
    }

    /// Deliver through Redis; the relay listener feeds `hub`.
    pub fn relayed(hub: Arc<ChatHub>, relay: RedisRelay) -> Self {
        Self {
            hub,
            relay: Some(relay),
        }
    }

    pub fn hub(&self) -> &Arc<ChatHub> {
        &self.hub
    }

    pub fn is_relayed(&self) -> bool {
        self.relay.is_some()
    }

    pub async fn join(&self, group: &str) -> broadcast::Receiver<RoomEvent> {
        self.hub.join(group).await
    }

    pub async fn leave(&self, group: &str) {
        self.hub.leave(group).await
    }

    /// Send a chat message to every session in `group`.
    ///
    /// With a relay this returns the number of subscribed processes, otherwise
    /// the number of local sessions.
    pub async fn group_send(&self, group: &str, event: ChatEvent) -> usize {
        self.send(group, RoomEvent::Message(event)).await
    }

    /// Ask every session in `group` to re-check its membership.
    pub async fn membership_changed(&self, group: &str) -> usize {
        self.send(group, RoomEvent::MembershipChanged).await
    }

    /// Move every session in `old_group` over to the room's new name.
    pub async fn room_renamed(&self, old_group: &str, chat_name: &str) -> usize {
        let event = RoomEvent::Renamed {
            chat_name: chat_name.to_string(),
        };
        self.send(old_group, event).await
    }

    /// A relay failure falls back to local delivery so this process's
    /// sessions still see the event.
    async fn send(&self, group: &str, event: RoomEvent) -> usize {
        if let Some(relay) = &self.relay {
            match relay.publish(group, &event).await {
                Ok(n) => return n,
                Err(e) => {
                    tracing::warn!(error = %e, group, "Chat relay publish failed, delivering locally");
                }
            }
        }
        self.hub.publish(group, event).await
    }
}
