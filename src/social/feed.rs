//! Group feeds and the client-side merge of pushed inserts.
//!
//! A reader subscribes to a group before it fetches the snapshot, so nothing committed
//! in between is lost. Inserts that were already in the snapshot arrive again on the
//! subscription; [`GroupView::apply`] absorbs them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::Social;
use super::events::DomainEvent;
use super::session::UserSession;
use crate::model::{EntryId, FeedEntry, FeedKind, GoalId, Group, GroupGoal, GroupId, Identity, UserId};
use crate::store::{RemoteInsert, Subscription};
use crate::{Error, Result};

type FeedKey = (OffsetDateTime, EntryId);

/// Live state of one group as seen by a reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupView {
    group: Group,
    members: BTreeSet<UserId>,
    goals: BTreeMap<GoalId, GroupGoal>,
    /// Completions that arrived before their goal.
    pending: BTreeSet<(GoalId, UserId)>,
    activity: BTreeMap<FeedKey, FeedEntry>,
    chat: BTreeMap<FeedKey, FeedEntry>,
    feed_limit: usize,
}

impl GroupView {
    pub fn new(group: Group, feed_limit: usize) -> Self {
        Self {
            group,
            members: BTreeSet::new(),
            goals: BTreeMap::new(),
            pending: BTreeSet::new(),
            activity: BTreeMap::new(),
            chat: BTreeMap::new(),
            feed_limit,
        }
    }

    /// Merges one insert. Returns whether the view changed.
    ///
    /// Applying an insert twice, or a set of inserts in any order, converges on the
    /// same view. A join and a later leave of the same member are the exception and
    /// apply in hub order. Inserts for other groups are ignored.
    pub fn apply(&mut self, insert: &RemoteInsert) -> bool {
        if insert.group_id() != Some(self.group.id) {
            return false;
        }
        match insert {
            RemoteInsert::Member { user_id, .. } => self.members.insert(user_id.clone()),
            RemoteInsert::MemberLeft { user_id, .. } => self.members.remove(user_id),
            RemoteInsert::Goal { goal } => {
                if self.goals.contains_key(&goal.id) {
                    return false;
                }
                let mut goal = goal.clone();
                let waiting: Vec<_> = self
                    .pending
                    .range((goal.id, String::new())..)
                    .take_while(|(id, _)| *id == goal.id)
                    .cloned()
                    .collect();
                for key in waiting {
                    self.pending.remove(&key);
                    goal.completed_by.insert(key.1);
                }
                self.goals.insert(goal.id, goal);
                true
            }
            RemoteInsert::GoalCompletion { goal_id, user_id, .. } => match self.goals.get_mut(goal_id) {
                Some(goal) => goal.completed_by.insert(user_id.clone()),
                None => self.pending.insert((*goal_id, user_id.clone())),
            },
            RemoteInsert::Entry { entry } => match entry.kind {
                FeedKind::Chat => self.chat.insert(entry.sort_key(), entry.clone()).is_none(),
                FeedKind::Activity => {
                    let key = entry.sort_key();
                    if self.activity.insert(key, entry.clone()).is_some() {
                        return false;
                    }
                    while self.activity.len() > self.feed_limit {
                        self.activity.pop_first();
                    }
                    self.activity.contains_key(&key)
                }
            },
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn members(&self) -> &BTreeSet<UserId> {
        &self.members
    }

    /// Goals, newest first.
    pub fn goals(&self) -> Vec<&GroupGoal> {
        let mut goals: Vec<_> = self.goals.values().collect();
        goals.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        goals
    }

    /// The most recent activity, newest first.
    pub fn activity(&self) -> impl Iterator<Item = &FeedEntry> {
        self.activity.values().rev()
    }

    /// The whole chat, oldest first.
    pub fn chat(&self) -> impl Iterator<Item = &FeedEntry> {
        self.chat.values()
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            group: self.group.clone(),
            members: self.members.iter().cloned().collect(),
            goals: self.goals().into_iter().cloned().collect(),
            activity: self.activity().cloned().collect(),
            chat: self.chat().cloned().collect(),
        }
    }
}

/// Serializable copy of a [`GroupView`], in display order.
#[derive(Clone, Debug, Serialize)]
pub struct GroupSnapshot {
    pub group: Group,
    pub members: Vec<UserId>,
    pub goals: Vec<GroupGoal>,
    pub activity: Vec<FeedEntry>,
    pub chat: Vec<FeedEntry>,
}

impl Social {
    /// Activity not tied to any group, newest first.
    pub async fn global_activity(&self) -> Result<Vec<FeedEntry>> {
        self.store().activity(None, self.feed_limit()).await
    }
}

impl UserSession {
    /// Subscribes to a group and loads its current state.
    ///
    /// Private groups need membership. The returned subscription carries every insert
    /// committed after the subscription, some of which the view already holds.
    #[instrument(skip(self), fields(user_id = %self.identity.id()))]
    pub async fn open_group(&self, group_id: GroupId) -> Result<(GroupView, Subscription)> {
        let store = self.social.store();
        let group = store
            .group(group_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("group {group_id}")))?;
        if !group.visibility.is_public() {
            let Identity::User { id, .. } = &self.identity else {
                return Err(Error::GuestRefused("open a private group"));
            };
            if !store.is_member(group_id, id).await? {
                return Err(Error::invalid("join the group to open it"));
            }
        }

        let subscription = store.subscribe(Some(group_id));

        let mut view = GroupView::new(group, self.social.feed_limit());
        for user_id in store.members(group_id).await? {
            view.apply(&RemoteInsert::Member { group_id, user_id });
        }
        for goal in store.goals(group_id).await? {
            view.apply(&RemoteInsert::Goal { goal });
        }
        for entry in store.activity(Some(group_id), self.social.feed_limit()).await? {
            view.apply(&RemoteInsert::Entry { entry });
        }
        for entry in store.chat(group_id).await? {
            view.apply(&RemoteInsert::Entry { entry });
        }
        debug!(%group_id, members = view.members.len(), goals = view.goals.len(), "group opened");

        Ok((view, subscription))
    }

    /// Opens the current group.
    pub async fn open_current(&self) -> Result<(GroupView, Subscription)> {
        let group_id = self.current_group.ok_or_else(|| Error::invalid("no group selected"))?;
        self.open_group(group_id).await
    }

    /// Posts a chat message to the current group.
    pub async fn send_chat(&self, text: &str) -> Result<FeedEntry> {
        let (user_id, user_name) = self.signed_in("chat")?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid("message is empty"));
        }
        let group_id = self.member_group("chat").await?;

        let entry = FeedEntry {
            id: Uuid::now_v7(),
            kind: FeedKind::Chat,
            group_id: Some(group_id),
            author_id: user_id.to_owned(),
            author_name: user_name.to_owned(),
            text: text.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            narrator: false,
        };
        self.social.store().append(&entry).await?;

        self.social.publish(&[DomainEvent::ChatPosted {
            group_id,
            entry_id: entry.id,
            user_id: user_id.to_owned(),
            user_name: user_name.to_owned(),
            text: entry.text.clone(),
        }]);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::Config;
    use crate::config::NarratorConfig;
    use crate::model::{GoalTarget, ReadingSession, Visibility};
    use crate::social::Locale;
    use crate::store::Store;

    fn group() -> Group {
        Group {
            id: Uuid::from_u128(1),
            name: "Fajr Club".into(),
            description: "".into(),
            visibility: Visibility::Public,
            created_at: datetime!(2026-02-18 04:00 UTC),
            created_by: "u1".into(),
            invite_code: "FAJR0001".into(),
        }
    }

    fn entry(n: u128, kind: FeedKind, minute: u8) -> RemoteInsert {
        RemoteInsert::Entry {
            entry: FeedEntry {
                id: Uuid::from_u128(n),
                kind,
                group_id: Some(group().id),
                author_id: "u1".into(),
                author_name: "Amina".into(),
                text: format!("entry {n}"),
                created_at: datetime!(2026-02-18 05:00 UTC) + time::Duration::minutes(minute.into()),
                narrator: false,
            },
        }
    }

    fn inserts() -> Vec<RemoteInsert> {
        let goal = GroupGoal {
            id: Uuid::from_u128(50),
            group_id: group().id,
            title: "Read 10 Pages Daily".into(),
            description: "Daily commitment".into(),
            target: GoalTarget::Pages(10),
            created_by: "u1".into(),
            created_at: datetime!(2026-02-18 04:30 UTC),
            completed_by: BTreeSet::new(),
        };
        vec![
            RemoteInsert::Member { group_id: group().id, user_id: "u1".into() },
            RemoteInsert::Member { group_id: group().id, user_id: "u2".into() },
            RemoteInsert::GoalCompletion { group_id: group().id, goal_id: goal.id, user_id: "u2".into() },
            RemoteInsert::Goal { goal },
            entry(10, FeedKind::Activity, 1),
            entry(11, FeedKind::Activity, 3),
            entry(12, FeedKind::Activity, 2),
            entry(13, FeedKind::Chat, 5),
            entry(14, FeedKind::Chat, 4),
            // Same instant as 10, ordered by id.
            entry(9, FeedKind::Activity, 1),
        ]
    }

    fn texts<'a>(entries: impl Iterator<Item = &'a FeedEntry>) -> Vec<&'a str> {
        entries.map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn applying_twice_changes_nothing() {
        let mut view = GroupView::new(group(), 50);
        for insert in inserts() {
            assert!(view.apply(&insert));
        }
        let settled = view.clone();
        for insert in inserts() {
            assert!(!view.apply(&insert));
        }
        assert_eq!(view, settled);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let mut forward = GroupView::new(group(), 50);
        let mut backward = GroupView::new(group(), 50);
        for insert in inserts() {
            forward.apply(&insert);
        }
        for insert in inserts().iter().rev() {
            backward.apply(insert);
        }

        assert_eq!(forward, backward);
        assert_eq!(texts(forward.activity()), ["entry 11", "entry 12", "entry 10", "entry 9"]);
        assert_eq!(texts(forward.chat()), ["entry 14", "entry 13"]);
        assert_eq!(forward.goals()[0].completed_by, BTreeSet::from(["u2".to_string()]));
    }

    #[test]
    fn activity_keeps_the_most_recent() {
        let mut view = GroupView::new(group(), 2);
        for insert in inserts() {
            view.apply(&insert);
        }
        assert_eq!(texts(view.activity()), ["entry 11", "entry 12"]);
        assert!(!view.apply(&entry(1, FeedKind::Activity, 0)));
        assert_eq!(view.chat().count(), 2);
    }

    #[test]
    fn other_groups_are_ignored() {
        let mut view = GroupView::new(group(), 50);
        let stray = RemoteInsert::Member { group_id: Uuid::from_u128(2), user_id: "u9".into() };
        assert!(!view.apply(&stray));
        assert!(view.members().is_empty());
    }

    fn config() -> Config {
        Config {
            narrator: NarratorConfig {
                locale: Locale::English,
                reply_delay: Duration::from_millis(5),
                ..NarratorConfig::default()
            },
            ..Config::default()
        }
    }

    async fn next_matching(sub: &mut Subscription, pred: impl Fn(&FeedEntry) -> bool) -> FeedEntry {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(RemoteInsert::Entry { entry }) = sub.recv().await {
                    if pred(&entry) {
                        return entry;
                    }
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn chat_trigger_gets_a_reply() {
        let social = Social::start(Store::in_memory().await.unwrap(), &config());
        let mut me = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let group = me.create_group("Fajr Club", "", Visibility::Public).await.unwrap();
        let (mut view, mut sub) = me.open_group(group.id).await.unwrap();

        let sent = me.send_chat("Ameen, dua for everyone").await.unwrap();
        let reply = next_matching(&mut sub, |e| e.narrator && e.kind == FeedKind::Chat).await;
        assert_eq!(reply.text, "Ameen! May Allah accept it from all of us.");

        view.apply(&RemoteInsert::Entry { entry: sent.clone() });
        view.apply(&RemoteInsert::Entry { entry: reply.clone() });
        assert_eq!(view.chat().cloned().collect::<Vec<_>>(), vec![sent, reply]);

        me.send_chat("see you at fajr").await.unwrap();
        assert_eq!(social.store().chat(group.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn narration_reaches_group_readers() {
        let social = Social::start(Store::in_memory().await.unwrap(), &config());
        let mut me = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let group = me.create_group("Fajr Club", "", Visibility::Public).await.unwrap();
        let (_, mut sub) = me.open_group(group.id).await.unwrap();

        me.record_session(ReadingSession::unit(4, 67, "Al-Mulk", 30)).await.unwrap();

        let line = next_matching(&mut sub, |e| e.narrator && e.text.contains("Al-Mulk")).await;
        assert_eq!(line.group_id, Some(group.id));
        let activity = social.store().activity(Some(group.id), 50).await.unwrap();
        assert!(activity.iter().any(|e| e.text == "read Surah Al-Mulk (30 verses)"));
    }

    #[tokio::test]
    async fn sessions_without_a_group_go_global() {
        let social = Social::start(Store::in_memory().await.unwrap(), &config());
        let mut sub = social.store().subscribe(None);
        let me = social.session(Identity::user("u1", "Amina")).await.unwrap();

        me.record_session(ReadingSession::pages(5)).await.unwrap();

        let line = next_matching(&mut sub, |_| true).await;
        assert_eq!(line.text, "read 5 pages");
        assert_eq!(social.global_activity().await.unwrap(), vec![line]);
    }

    #[tokio::test]
    async fn private_groups_need_membership() {
        let social = Social::start(Store::in_memory().await.unwrap(), &config());
        let mut owner = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let group = owner.create_group("Tahajjud", "", Visibility::Private).await.unwrap();

        let outsider = social.session(Identity::user("u2", "Omar")).await.unwrap();
        assert!(matches!(outsider.open_group(group.id).await, Err(Error::InvalidInput(_))));
        let guest = social.session(Identity::Guest).await.unwrap();
        assert!(matches!(guest.open_group(group.id).await, Err(Error::GuestRefused(_))));

        let (view, _) = owner.open_group(group.id).await.unwrap();
        assert_eq!(view.members(), &BTreeSet::from(["u1".to_string()]));
    }

    #[tokio::test]
    async fn chat_needs_a_member_and_text() {
        let social = Social::start(Store::in_memory().await.unwrap(), &config());
        let mut me = social.session(Identity::user("u1", "Amina")).await.unwrap();
        assert!(matches!(me.send_chat("salaam").await, Err(Error::InvalidInput(_))));

        me.create_group("Fajr Club", "", Visibility::Public).await.unwrap();
        assert!(matches!(me.send_chat("   ").await, Err(Error::InvalidInput(_))));

        let guest = social.session(Identity::Guest).await.unwrap();
        assert!(matches!(guest.send_chat("salaam").await, Err(Error::GuestRefused(_))));
    }

    #[tokio::test]
    async fn open_views_drop_members_who_leave() {
        let social = Social::start(Store::in_memory().await.unwrap(), &config());
        let mut owner = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let group = owner.create_group("Fajr Club", "", Visibility::Public).await.unwrap();
        let mut friend = social.session(Identity::user("u2", "Omar")).await.unwrap();
        friend.join_group(group.id).await.unwrap();
        let (mut view, mut sub) = owner.open_group(group.id).await.unwrap();
        assert_eq!(view.members().len(), 2);

        friend.leave_group().await.unwrap();
        while let Some(insert) = sub.try_recv() {
            view.apply(&insert);
        }

        assert_eq!(view.members(), &BTreeSet::from(["u1".to_string()]));
        assert!(!view.apply(&RemoteInsert::MemberLeft { group_id: group.id, user_id: "u2".into() }));
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_replies() {
        let mut slow = config();
        slow.narrator.reply_delay = Duration::from_millis(200);
        let social = Social::start(Store::in_memory().await.unwrap(), &slow);
        let mut me = social.session(Identity::user("u1", "Amina")).await.unwrap();
        let group = me.create_group("Fajr Club", "", Visibility::Public).await.unwrap();
        let (_, mut sub) = me.open_group(group.id).await.unwrap();

        me.send_chat("Ameen").await.unwrap();
        me.record_session(ReadingSession::pages(5)).await.unwrap();
        // Events are narrated in order, so the reply is scheduled by now.
        next_matching(&mut sub, |e| e.text == "read 5 pages").await;
        social.shutdown();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(social.store().chat(group.id).await.unwrap().len(), 1);
    }
}

