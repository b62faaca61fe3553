use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{EntryId, GoalId, GroupId, ReadingSession, UserId};

/// State transitions raised by session operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    SessionRecorded {
        user_id: UserId,
        user_name: String,
        /// Feed the session is narrated into; `None` is the global feed.
        group_id: Option<GroupId>,
        session: ReadingSession,
        total_pages: u64,
    },
    GoalPosted {
        group_id: GroupId,
        goal_id: GoalId,
        title: String,
        user_id: UserId,
        user_name: String,
    },
    GoalCompleted {
        group_id: GroupId,
        goal_id: GoalId,
        title: String,
        user_id: UserId,
        user_name: String,
    },
    GroupCreated {
        group_id: GroupId,
        group_name: String,
        user_id: UserId,
        user_name: String,
    },
    MemberJoined {
        group_id: GroupId,
        group_name: String,
        user_id: UserId,
        user_name: String,
    },
    ChatPosted {
        group_id: GroupId,
        entry_id: EntryId,
        user_id: UserId,
        user_name: String,
        text: String,
    },
}

impl DomainEvent {
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::SessionRecorded { group_id, .. } => *group_id,
            Self::GoalPosted { group_id, .. }
            | Self::GoalCompleted { group_id, .. }
            | Self::GroupCreated { group_id, .. }
            | Self::MemberJoined { group_id, .. }
            | Self::ChatPosted { group_id, .. } => Some(*group_id),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::SessionRecorded { user_id, .. }
            | Self::GoalPosted { user_id, .. }
            | Self::GoalCompleted { user_id, .. }
            | Self::GroupCreated { user_id, .. }
            | Self::MemberJoined { user_id, .. }
            | Self::ChatPosted { user_id, .. } => user_id,
        }
    }
}

/// In-process fan-out of domain events to registered handlers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    pub fn publish(&self, event: DomainEvent) {
        if self.tx.send(event).is_err() {
            debug!("no event handlers registered");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = DomainEvent::MemberJoined {
            group_id: Uuid::nil(),
            group_name: "Fajr Club".into(),
            user_id: "u1".into(),
            user_name: "Amina".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"member_joined\""));
        assert_eq!(event.user_id(), "u1");
        assert_eq!(event.group_id(), Some(Uuid::nil()));
    }

    #[tokio::test]
    async fn handlers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let event = DomainEvent::SessionRecorded {
            user_id: "u1".into(),
            user_name: "Amina".into(),
            group_id: None,
            session: ReadingSession::pages(3),
            total_pages: 3,
        };
        bus.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
