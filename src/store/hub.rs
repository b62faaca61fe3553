use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::model::{FeedEntry, GoalId, GroupGoal, GroupId, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// A committed change to shared group state, as pushed to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteInsert {
    Member {
        group_id: GroupId,
        user_id: UserId,
    },
    MemberLeft {
        group_id: GroupId,
        user_id: UserId,
    },
    Goal {
        goal: GroupGoal,
    },
    GoalCompletion {
        group_id: GroupId,
        goal_id: GoalId,
        user_id: UserId,
    },
    Entry {
        entry: FeedEntry,
    },
}

impl RemoteInsert {
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Member { group_id, .. }
            | Self::MemberLeft { group_id, .. }
            | Self::GoalCompletion { group_id, .. } => Some(*group_id),
            Self::Goal { goal } => Some(goal.group_id),
            Self::Entry { entry } => entry.group_id,
        }
    }
}

/// Fan-out of inserts keyed by group. Channels exist only while someone listens.
#[derive(Clone, Default)]
pub struct Hub {
    channels: Arc<Mutex<HashMap<Option<GroupId>, broadcast::Sender<RemoteInsert>>>>,
}

impl Hub {
    pub fn subscribe(&self, group_id: Option<GroupId>) -> Subscription {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = channels
            .entry(group_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        debug!(?group_id, "subscribed");
        Subscription { group_id, rx }
    }

    pub(crate) fn publish(&self, insert: RemoteInsert) {
        let key = insert.group_id();
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.get(&key) {
            // Err means every receiver is gone.
            if tx.send(insert).is_err() {
                channels.remove(&key);
                debug!(group_id = ?key, "pruned idle channel");
            }
        }
    }

    pub fn subscriber_count(&self, group_id: Option<GroupId>) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// Live feed of one group's inserts. Dropping it unsubscribes.
pub struct Subscription {
    group_id: Option<GroupId>,
    rx: broadcast::Receiver<RemoteInsert>,
}

impl Subscription {
    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    /// Next insert, or `None` once the hub is gone. Lagging skips ahead.
    pub async fn recv(&mut self) -> Option<RemoteInsert> {
        loop {
            match self.rx.recv().await {
                Ok(insert) => return Some(insert),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(group_id = ?self.group_id, skipped = n, "subscriber lagged, dropped inserts");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<RemoteInsert> {
        loop {
            match self.rx.try_recv() {
                Ok(insert) => return Some(insert),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(group_id = ?self.group_id, skipped = n, "subscriber lagged, dropped inserts");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::model::FeedKind;

    fn entry(group_id: Option<GroupId>) -> RemoteInsert {
        RemoteInsert::Entry {
            entry: FeedEntry {
                id: Uuid::now_v7(),
                kind: FeedKind::Chat,
                group_id,
                author_id: "u1".into(),
                author_name: "Amina".into(),
                text: "salaam".into(),
                created_at: OffsetDateTime::now_utc(),
                narrator: false,
            },
        }
    }

    #[test]
    fn delivers_only_to_matching_group() {
        let hub = Hub::default();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let mut sub_a = hub.subscribe(Some(a));
        let mut sub_b = hub.subscribe(Some(b));

        hub.publish(entry(Some(a)));

        assert!(sub_a.try_recv().is_some());
        assert!(sub_b.try_recv().is_none());
    }

    #[test]
    fn dropping_last_subscriber_prunes_channel() {
        let hub = Hub::default();
        let group = Some(Uuid::now_v7());
        let sub = hub.subscribe(group);
        assert_eq!(hub.subscriber_count(group), 1);

        drop(sub);
        hub.publish(entry(group));

        assert_eq!(hub.subscriber_count(group), 0);
        assert!(hub.channels.lock().unwrap().is_empty());
    }

    #[test]
    fn publish_without_listeners_is_dropped() {
        let hub = Hub::default();
        hub.publish(entry(None));
        assert!(hub.channels.lock().unwrap().is_empty());
    }

    #[test]
    fn insert_serializes_with_type_tag() {
        let json = serde_json::to_string(&RemoteInsert::Member {
            group_id: Uuid::nil(),
            user_id: "u1".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"member\""));
    }
}
