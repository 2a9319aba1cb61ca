//! WebSocket event broadcasting

use crate::models::WsEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type EventSender = broadcast::Sender<WsEvent>;
pub type EventReceiver = broadcast::Receiver<WsEvent>;

#[derive(Clone, Debug)]
pub struct WsConnection {
    pub id: Uuid,
    pub user_id: String,
}

/// Fan-out of user events to every open socket. Each socket filters for
/// its own user.
pub struct EventBroadcaster {
    sender: EventSender,
    connections: Arc<RwLock<HashMap<Uuid, WsConnection>>>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn broadcast(&self, event: WsEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn add_connection(&self, conn: WsConnection) {
        self.connections.write().insert(conn.id, conn);
    }

    pub fn remove_connection(&self, id: &Uuid) {
        self.connections.write().remove(id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.connections
            .read()
            .values()
            .any(|c| c.user_id == user_id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Whether `event` should be delivered to the socket of `user_id`
pub fn is_addressed_to(event: &WsEvent, user_id: &str) -> bool {
    event.recipient() == Some(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AchievementUnlockedEvent, WsEvent};

    fn unlocked(user: &str) -> WsEvent {
        WsEvent::AchievementUnlocked(AchievementUnlockedEvent {
            user_id: user.to_string(),
            code: "first_submission".to_string(),
            name: "First Steps".to_string(),
            reward_points: 10,
        })
    }

    #[test]
    fn test_connection_tracking() {
        let broadcaster = EventBroadcaster::default();
        let id = Uuid::new_v4();
        broadcaster.add_connection(WsConnection {
            id,
            user_id: "u1".to_string(),
        });

        assert_eq!(broadcaster.connection_count(), 1);
        assert!(broadcaster.is_user_connected("u1"));
        assert!(!broadcaster.is_user_connected("u2"));

        broadcaster.remove_connection(&id);
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[test]
    fn test_events_are_filtered_by_recipient() {
        assert!(is_addressed_to(&unlocked("u1"), "u1"));
        assert!(!is_addressed_to(&unlocked("u1"), "u2"));
        assert!(!is_addressed_to(&WsEvent::Ping, "u1"));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_dropped() {
        let broadcaster = EventBroadcaster::new(4);
        broadcaster.broadcast(unlocked("u1"));

        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast(unlocked("u2"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.recipient(), Some("u2"));
    }
}
