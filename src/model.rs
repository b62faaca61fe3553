use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub type UserId = String;
pub type GroupId = Uuid;
pub type GoalId = Uuid;
pub type EntryId = Uuid;
/// Surah number, 1 to 114.
pub type UnitId = u32;

/// Reserved id of the unauthenticated visitor. Never persisted.
pub const GUEST_ID: &str = "guest";
/// Reserved author id of narrator entries.
pub const NARRATOR_ID: &str = "ai";
pub const NARRATOR_NAME: &str = "Deen AI";

pub const DEFAULT_DAILY_GOAL: u32 = 10;

/// Who is acting in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Guest,
    User { id: UserId, name: String },
}

impl Identity {
    pub fn user(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self::User { id: id.into(), name: name.into() }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Guest => GUEST_ID,
            Self::User { id, .. } => id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub pages_read: u64,
    pub verses_read: u64,
    pub completed_units: BTreeSet<UnitId>,
    /// Pages per day.
    pub daily_goal: u32,
    pub streak: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub last_active: OffsetDateTime,
}

impl User {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pages_read: 0,
            verses_read: 0,
            completed_units: BTreeSet::new(),
            daily_goal: DEFAULT_DAILY_GOAL,
            streak: 0,
            last_active: now,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

impl From<bool> for Visibility {
    fn from(is_public: bool) -> Self {
        if is_public { Self::Public } else { Self::Private }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_by: UserId,
    pub invite_code: String,
}

/// What a member has to do to satisfy a goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GoalTarget {
    /// Finish the given surah.
    Unit(UnitId),
    /// Reach a lifetime page count.
    Pages(u64),
}

impl GoalTarget {
    pub(crate) fn kind(self) -> &'static str {
        match self {
            Self::Unit(_) => "surah",
            Self::Pages(_) => "pages",
        }
    }

    /// Column value; `None` when the target does not fit the store.
    pub(crate) fn value(self) -> Option<i64> {
        match self {
            Self::Unit(n) => Some(i64::from(n)),
            Self::Pages(n) => i64::try_from(n).ok(),
        }
    }

    pub(crate) fn from_parts(kind: &str, value: i64) -> Option<Self> {
        match kind {
            "surah" => u32::try_from(value).ok().map(Self::Unit),
            "pages" => u64::try_from(value).ok().map(Self::Pages),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupGoal {
    pub id: GoalId,
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub target: GoalTarget,
    pub created_by: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Members who satisfied the goal. Only ever grows.
    pub completed_by: BTreeSet<UserId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Activity,
    Chat,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activity => write!(f, "activity"),
            Self::Chat => write!(f, "chat"),
        }
    }
}

/// One activity line or chat message. Never mutated after insert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: EntryId,
    pub kind: FeedKind,
    /// `None` for global entries.
    pub group_id: Option<GroupId>,
    pub author_id: UserId,
    pub author_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub narrator: bool,
}

impl FeedEntry {
    pub fn sort_key(&self) -> (OffsetDateTime, EntryId) {
        (self.created_at, self.id)
    }
}

/// Input of [`crate::social::UserSession::record_session`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingSession {
    pub pages: u32,
    pub unit: Option<UnitId>,
    pub unit_label: Option<String>,
    pub verses: u32,
}

impl ReadingSession {
    pub fn pages(pages: u32) -> Self {
        Self { pages, ..Self::default() }
    }

    pub fn unit(pages: u32, unit: UnitId, label: impl Into<String>, verses: u32) -> Self {
        Self {
            pages,
            unit: Some(unit),
            unit_label: Some(label.into()),
            verses,
        }
    }
}
