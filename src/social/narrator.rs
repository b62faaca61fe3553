//! Rule-based author of feed entries.
//!
//! [`Narrator::narrate`] maps one [`DomainEvent`] to the entries it should produce, with no
//! storage involved. [`Narrator::spawn`] registers it on the event bus and appends those
//! entries best-effort: a failed append is logged and dropped, it never reaches the
//! operation that raised the event.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::DomainEvent;
use crate::config::NarratorConfig;
use crate::model::{FeedEntry, FeedKind, GroupId, NARRATOR_ID, NARRATOR_NAME, UnitId, UserId};
use crate::store::Store;
use crate::Error;

/// Units with this many verses or fewer are not announced.
pub const UNIT_VERSE_THRESHOLD: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Somali,
    English,
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "so" | "somali" => Ok(Self::Somali),
            "en" | "english" => Ok(Self::English),
            other => Err(Error::invalid(format!("unknown locale {other}"))),
        }
    }
}

impl Locale {
    fn unit_completed(self, user: &str, unit: &str, verses: u32) -> String {
        match self {
            Self::Somali => format!(
                "Mashaa Allah! {user} ayaa dhammaystay {unit}. Taasi waa {verses} aayood oo lagu daray xisaabtayada guud!"
            ),
            Self::English => format!(
                "Masha'Allah! {user} completed {unit}. That's {verses} verses added to our shared count!"
            ),
        }
    }

    fn goal_completed(self, user: &str, title: &str) -> String {
        match self {
            Self::Somali => format!("Hambalyo! {user} ayaa dhammaystay hadafka \"{title}\"! Allaha ka aqbalo!"),
            Self::English => format!("Congratulations! {user} completed the goal \"{title}\"! May Allah accept it!"),
        }
    }

    fn group_created(self, user: &str, group: &str) -> String {
        match self {
            Self::Somali => format!("{user} ayaa abuuray koox cusub: {group}. Soo biira oo wadaag ujeedada wanaagsan!"),
            Self::English => format!("{user} created a new group: {group}. Join in and share the good intention!"),
        }
    }

    fn member_joined(self, user: &str, group: &str) -> String {
        match self {
            Self::Somali => format!("{user} ayaa ku soo biiray {group}. Soo dhawoow walaal!"),
            Self::English => format!("{user} joined {group}. Welcome!"),
        }
    }

    fn chat_reply(self) -> &'static str {
        match self {
            Self::Somali => "Aamiin! Allaha inaga aqbalo dhammaanteen.",
            Self::English => "Ameen! May Allah accept it from all of us.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Author {
    User { id: UserId, name: String },
    Narrator,
}

/// An entry the narrator wants appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Narration {
    pub kind: FeedKind,
    pub group_id: Option<GroupId>,
    pub author: Author,
    pub text: String,
    /// Chat replies wait before appearing.
    pub delay: Option<Duration>,
}

impl Narration {
    fn activity(group_id: Option<GroupId>, author: Author, text: String) -> Self {
        Self {
            kind: FeedKind::Activity,
            group_id,
            author,
            text,
            delay: None,
        }
    }

    pub fn into_entry(self, now: OffsetDateTime) -> FeedEntry {
        let (author_id, author_name, narrator) = match self.author {
            Author::User { id, name } => (id, name, false),
            Author::Narrator => (NARRATOR_ID.to_owned(), NARRATOR_NAME.to_owned(), true),
        };
        FeedEntry {
            id: Uuid::now_v7(),
            kind: self.kind,
            group_id: self.group_id,
            author_id,
            author_name,
            text: self.text,
            created_at: now,
            narrator,
        }
    }
}

fn unit_name(unit: UnitId, label: Option<&str>) -> String {
    label.map_or_else(|| format!("Surah {unit}"), str::to_owned)
}

#[derive(Clone, Debug)]
pub struct Narrator {
    config: NarratorConfig,
}

impl Narrator {
    pub fn new(config: NarratorConfig) -> Self {
        Self { config }
    }

    /// Entries for one event, oldest first.
    pub fn narrate(&self, event: &DomainEvent) -> Vec<Narration> {
        let locale = self.config.locale;
        let mut out = Vec::new();

        match event {
            DomainEvent::SessionRecorded { user_id, user_name, group_id, session, .. } => {
                let author = Author::User { id: user_id.clone(), name: user_name.clone() };
                match session.unit {
                    Some(unit) => {
                        let name = unit_name(unit, session.unit_label.as_deref());
                        out.push(Narration::activity(
                            *group_id,
                            author,
                            format!(
                                "read Surah {} ({} verses)",
                                session.unit_label.clone().unwrap_or_else(|| unit.to_string()),
                                session.verses
                            ),
                        ));
                        if session.verses > UNIT_VERSE_THRESHOLD {
                            out.push(Narration::activity(
                                *group_id,
                                Author::Narrator,
                                locale.unit_completed(user_name, &name, session.verses),
                            ));
                        }
                    }
                    None if session.pages > 0 => {
                        out.push(Narration::activity(*group_id, author, format!("read {} pages", session.pages)));
                    }
                    None => {}
                }
            }
            DomainEvent::GoalPosted { group_id, title, user_id, user_name, .. } => {
                out.push(Narration::activity(
                    Some(*group_id),
                    Author::User { id: user_id.clone(), name: user_name.clone() },
                    format!("posted a new goal: {title}"),
                ));
            }
            DomainEvent::GoalCompleted { group_id, title, user_name, .. } => {
                out.push(Narration::activity(
                    Some(*group_id),
                    Author::Narrator,
                    locale.goal_completed(user_name, title),
                ));
            }
            DomainEvent::GroupCreated { group_id, group_name, user_id, user_name } => {
                out.push(Narration::activity(
                    Some(*group_id),
                    Author::User { id: user_id.clone(), name: user_name.clone() },
                    format!("created a new group: {group_name}"),
                ));
                out.push(Narration::activity(
                    Some(*group_id),
                    Author::Narrator,
                    locale.group_created(user_name, group_name),
                ));
            }
            DomainEvent::MemberJoined { group_id, group_name, user_name, .. } => {
                out.push(Narration::activity(
                    Some(*group_id),
                    Author::Narrator,
                    locale.member_joined(user_name, group_name),
                ));
            }
            DomainEvent::ChatPosted { group_id, text, .. } => {
                if self.is_triggered(text) {
                    out.push(Narration {
                        kind: FeedKind::Chat,
                        group_id: Some(*group_id),
                        author: Author::Narrator,
                        text: locale.chat_reply().to_owned(),
                        delay: Some(self.config.reply_delay),
                    });
                }
            }
        }

        out
    }

    fn is_triggered(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.config.triggers.iter().any(|t| text.contains(t.as_str()))
    }

    /// Registers the narrator as an event handler. The task ends when the bus closes.
    ///
    /// Delayed replies are owned by the task: aborting it cancels the replies still waiting.
    pub fn spawn(self, store: Store, mut rx: broadcast::Receiver<DomainEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut replies = JoinSet::new();
            loop {
                let received = tokio::select! {
                    received = rx.recv() => received,
                    Some(_) = replies.join_next(), if !replies.is_empty() => continue,
                };
                match received {
                    Ok(event) => {
                        for narration in self.narrate(&event) {
                            match narration.delay {
                                Some(delay) => {
                                    let store = store.clone();
                                    replies.spawn(async move {
                                        tokio::time::sleep(delay).await;
                                        append(&store, narration).await;
                                    });
                                }
                                None => append(&store, narration).await,
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "narrator lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        while replies.join_next().await.is_some() {}
                        info!("narrator stopped");
                        break;
                    }
                }
            }
        })
    }
}

async fn append(store: &Store, narration: Narration) {
    let entry = narration.into_entry(OffsetDateTime::now_utc());
    match store.append(&entry).await {
        Ok(()) => debug!(entry_id = %entry.id, narrator = entry.narrator, "narrated"),
        Err(e) => warn!(error = %e, group_id = ?entry.group_id, "narration dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReadingSession;

    fn narrator(locale: Locale) -> Narrator {
        Narrator::new(NarratorConfig {
            locale,
            reply_delay: Duration::from_millis(5),
            ..NarratorConfig::default()
        })
    }

    fn recorded(session: ReadingSession) -> DomainEvent {
        DomainEvent::SessionRecorded {
            user_id: "u1".into(),
            user_name: "Amina".into(),
            group_id: None,
            total_pages: u64::from(session.pages),
            session,
        }
    }

    fn narrator_lines(out: &[Narration]) -> Vec<&str> {
        out.iter()
            .filter(|n| n.author == Author::Narrator)
            .map(|n| n.text.as_str())
            .collect()
    }

    #[test]
    fn unit_completion_needs_more_than_twenty_verses() {
        let n = narrator(Locale::English);

        let twenty = n.narrate(&recorded(ReadingSession::unit(2, 87, "Al-A'la", 20)));
        assert!(narrator_lines(&twenty).is_empty());
        assert_eq!(twenty.len(), 1);
        assert_eq!(twenty[0].text, "read Surah Al-A'la (20 verses)");

        let twenty_one = n.narrate(&recorded(ReadingSession::unit(2, 67, "Al-Mulk", 21)));
        assert_eq!(
            narrator_lines(&twenty_one),
            vec!["Masha'Allah! Amina completed Al-Mulk. That's 21 verses added to our shared count!"]
        );
    }

    #[test]
    fn somali_templates_match_the_app_copy() {
        let n = narrator(Locale::Somali);
        let out = n.narrate(&DomainEvent::GoalCompleted {
            group_id: Uuid::nil(),
            goal_id: Uuid::nil(),
            title: "Friday Sunnah".into(),
            user_id: "u1".into(),
            user_name: "Ali".into(),
        });
        assert_eq!(
            narrator_lines(&out),
            vec!["Hambalyo! Ali ayaa dhammaystay hadafka \"Friday Sunnah\"! Allaha ka aqbalo!"]
        );
        assert_eq!(out[0].group_id, Some(Uuid::nil()));
    }

    #[test]
    fn group_lifecycle_is_always_narrated() {
        let n = narrator(Locale::Somali);
        let created = n.narrate(&DomainEvent::GroupCreated {
            group_id: Uuid::nil(),
            group_name: "Fajr Club".into(),
            user_id: "u1".into(),
            user_name: "Ali".into(),
        });
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].text, "created a new group: Fajr Club");
        assert_eq!(
            created[1].text,
            "Ali ayaa abuuray koox cusub: Fajr Club. Soo biira oo wadaag ujeedada wanaagsan!"
        );

        let joined = n.narrate(&DomainEvent::MemberJoined {
            group_id: Uuid::nil(),
            group_name: "Fajr Club".into(),
            user_id: "u2".into(),
            user_name: "Omar".into(),
        });
        assert_eq!(narrator_lines(&joined), vec!["Omar ayaa ku soo biiray Fajr Club. Soo dhawoow walaal!"]);
    }

    #[test]
    fn page_sessions_log_a_user_line_only() {
        let n = narrator(Locale::English);
        let out = n.narrate(&recorded(ReadingSession::pages(5)));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "read 5 pages");
        assert!(matches!(out[0].author, Author::User { .. }));

        assert!(n.narrate(&recorded(ReadingSession::pages(0))).is_empty());
    }

    #[test]
    fn chat_triggers_are_case_insensitive_and_delayed() {
        let n = narrator(Locale::English);
        let chat = |text: &str| DomainEvent::ChatPosted {
            group_id: Uuid::nil(),
            entry_id: Uuid::nil(),
            user_id: "u1".into(),
            user_name: "Amina".into(),
            text: text.into(),
        };

        let out = n.narrate(&chat("Please make DUA for my exams"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, FeedKind::Chat);
        assert_eq!(out[0].delay, Some(Duration::from_millis(5)));
        assert_eq!(out[0].author, Author::Narrator);

        assert!(n.narrate(&chat("see you at iftar")).is_empty());
    }

    #[test]
    fn narrator_entries_use_reserved_author() {
        let entry = Narration::activity(None, Author::Narrator, "x".into()).into_entry(OffsetDateTime::now_utc());
        assert_eq!(entry.author_id, NARRATOR_ID);
        assert_eq!(entry.author_name, NARRATOR_NAME);
        assert!(entry.narrator);
    }

    #[test]
    fn parses_locales() {
        assert_eq!("SO".parse::<Locale>().unwrap(), Locale::Somali);
        assert_eq!("english".parse::<Locale>().unwrap(), Locale::English);
        assert!("fr".parse::<Locale>().is_err());
    }
}
