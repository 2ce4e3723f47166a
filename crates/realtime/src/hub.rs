//! In-process chat groups backed by `tokio::sync::broadcast`.

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};

use elearn_common::types::RoomEvent;

/// Group that carries the live traffic of one chat room.
pub fn group_name(room_name: &str) -> String {
    format!("chat_{}", room_name)
}

/// Registry of live groups. A group exists while it has at least one receiver.
pub struct ChatHub {
    groups: RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl ChatHub {
    /// `capacity` bounds how far a slow session may lag before it drops events.
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a group, creating it on first use.
    pub async fn join(&self, group: &str) -> broadcast::Receiver<RoomEvent> {
        let mut groups = self.groups.write().await;
        let sender = groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let receiver = sender.subscribe();

        tracing::debug!(group, receivers = sender.receiver_count(), "Joined chat group");
        receiver
    }

    /// Deliver an event to every local receiver of `group`.
    ///
    /// Returns how many receivers got it. Publishing to a group nobody is
    /// listening to is not an error.
    pub async fn publish(&self, group: &str, event: RoomEvent) -> usize {
        let delivered = {
            let groups = self.groups.read().await;
            match groups.get(group) {
                Some(sender) => sender.send(event).ok(),
                None => return 0,
            }
        };

        match delivered {
            Some(n) => n,
            None => {
                self.leave(group).await;
                0
            }
        }
    }

    /// Drop the group if its last receiver is gone. Call after a session
    /// drops its receiver.
    pub async fn leave(&self, group: &str) {
        let mut groups = self.groups.write().await;
        if groups
            .get(group)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            groups.remove(group);
            tracing::debug!(group, "Chat group pruned");
        }
    }

    /// Remove every group without receivers; returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut groups = self.groups.write().await;
        let before = groups.len();
        groups.retain(|_, sender| sender.receiver_count() > 0);
        before - groups.len()
    }

    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use elearn_common::types::ChatEvent;
    use uuid::Uuid;

    fn event(message: &str) -> RoomEvent {
        RoomEvent::Message(ChatEvent {
            message_id: Uuid::new_v4(),
            room: "study-group".to_string(),
            user_id: Uuid::new_v4(),
            username: "ada".to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_group_name() {
        assert_eq!(group_name("study-group"), "chat_study-group");
        assert_eq!(
            group_name("Course CM101 Discussion"),
            "chat_Course CM101 Discussion"
        );
    }

    #[tokio::test]
    async fn test_publish_reaches_every_member() {
        let hub = ChatHub::new(16);
        let mut a = hub.join("chat_room").await;
        let mut b = hub.join("chat_room").await;

        let sent = event("hello");
        assert_eq!(hub.publish("chat_room", sent.clone()).await, 2);
        assert_eq!(a.recv().await.unwrap(), sent);
        assert_eq!(b.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let hub = ChatHub::new(16);
        let mut a = hub.join("chat_a").await;
        let _b = hub.join("chat_b").await;

        assert_eq!(hub.publish("chat_b", event("only b")).await, 1);
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_group_is_noop() {
        let hub = ChatHub::new(16);
        assert_eq!(hub.publish("chat_empty", event("nobody")).await, 0);
        assert_eq!(hub.group_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_prunes_empty_group() {
        let hub = ChatHub::new(16);
        let first = hub.join("chat_room").await;
        let second = hub.join("chat_room").await;

        drop(first);
        hub.leave("chat_room").await;
        assert_eq!(hub.group_count().await, 1);

        drop(second);
        hub.leave("chat_room").await;
        assert_eq!(hub.group_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_to_abandoned_group_prunes_it() {
        let hub = ChatHub::new(16);
        drop(hub.join("chat_room").await);
        assert_eq!(hub.group_count().await, 1);

        assert_eq!(hub.publish("chat_room", event("late")).await, 0);
        assert_eq!(hub.group_count().await, 0);
    }

    #[tokio::test]
    async fn test_prune() {
        let hub = ChatHub::new(16);
        drop(hub.join("chat_a").await);
        let _kept = hub.join("chat_b").await;

        assert_eq!(hub.prune().await, 1);
        assert_eq!(hub.group_count().await, 1);
    }
}
