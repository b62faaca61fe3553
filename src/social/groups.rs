use std::collections::BTreeSet;

use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Social;
use super::events::DomainEvent;
use super::session::UserSession;
use crate::model::{GoalTarget, Group, GroupGoal, GroupId, NARRATOR_ID, User, Visibility};
use crate::store::Store;
use crate::{Error, Result};

const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const INVITE_LEN: usize = 8;
const INVITE_ATTEMPTS: usize = 5;
const MAX_CODE_LEN: usize = 32;

pub const LEADERBOARD_SIZE: u32 = 10;
pub const DEMO_INVITE_CODE: &str = "RAMADAN2026";

pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_LEN)
        .map(|_| char::from(INVITE_ALPHABET[rng.random_range(0..INVITE_ALPHABET.len())]))
        .collect()
}

/// Draws codes until one is unused, giving up after [`INVITE_ATTEMPTS`] clashes.
async fn free_invite_code(store: &Store, mut draw: impl FnMut() -> String) -> Result<String> {
    for _ in 0..INVITE_ATTEMPTS {
        let code = draw();
        if !store.invite_code_taken(&code).await? {
            return Ok(code);
        }
        warn!(invite_code = %code, "invite code clash, redrawing");
    }
    Err(Error::Unavailable("no free invite code".to_owned()))
}

/// Trims and upper-cases a typed code. Empty or non-alphanumeric codes are invalid.
pub fn normalize_invite_code(code: &str) -> Result<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() || code.len() > MAX_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::invalid(format!("malformed invite code {code:?}")));
    }
    Ok(code)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub members: usize,
    pub goals: usize,
    pub total_pages: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Leaderboard {
    /// Most pages first, at most [`LEADERBOARD_SIZE`].
    pub top: Vec<User>,
    pub stats: GroupStats,
}

impl Social {
    /// All groups, newest first.
    pub async fn groups(&self) -> Result<Vec<Group>> {
        self.store().groups().await
    }

    pub async fn leaderboard(&self, group_id: GroupId) -> Result<Leaderboard> {
        let store = self.store();
        if store.group(group_id).await?.is_none() {
            return Err(Error::not_found(format!("group {group_id}")));
        }
        let mut ranked = store.leaderboard(group_id, u32::MAX).await?;
        let stats = GroupStats {
            members: store.members(group_id).await?.len(),
            goals: store.goals(group_id).await?.len(),
            total_pages: ranked.iter().map(|u| u.pages_read).sum(),
        };
        ranked.truncate(LEADERBOARD_SIZE as usize);
        Ok(Leaderboard { top: ranked, stats })
    }

    /// Creates the public demo circle unless its code is already in use.
    pub async fn seed_demo(&self) -> Result<Option<Group>> {
        let store = self.store();
        if store.invite_code_taken(DEMO_INVITE_CODE).await? {
            debug!("demo group already present");
            return Ok(None);
        }

        let now = OffsetDateTime::now_utc();
        let group = Group {
            id: Uuid::now_v7(),
            name: "Ramadan 2026 Challenge".to_owned(),
            description: "Complete the Quran together this Ramadan".to_owned(),
            visibility: Visibility::Public,
            created_at: now,
            created_by: NARRATOR_ID.to_owned(),
            invite_code: DEMO_INVITE_CODE.to_owned(),
        };
        store.insert_group(&group).await?;
        store
            .insert_goal(&GroupGoal {
                id: Uuid::now_v7(),
                group_id: group.id,
                title: "Friday Sunnah".to_owned(),
                description: "Read Surah Al-Kahf".to_owned(),
                target: GoalTarget::Unit(18),
                created_by: NARRATOR_ID.to_owned(),
                created_at: now,
                completed_by: BTreeSet::new(),
            })
            .await?;

        info!(group_id = %group.id, "demo group seeded");
        Ok(Some(group))
    }
}

impl UserSession {
    /// Creates a group with the actor as its only member and selects it.
    pub async fn create_group(&mut self, name: &str, description: &str, visibility: Visibility) -> Result<Group> {
        let (user_id, user_name) = self.signed_in("create a group")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("group name is empty"));
        }
        let description = match description.trim() {
            "" => "A new study group",
            d => d,
        };

        let store = self.social.store();
        let invite_code = free_invite_code(store, generate_invite_code).await?;

        let group = Group {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            description: description.to_owned(),
            visibility,
            created_at: OffsetDateTime::now_utc(),
            created_by: user_id.to_owned(),
            invite_code,
        };
        store.insert_group(&group).await?;

        let event = DomainEvent::GroupCreated {
            group_id: group.id,
            group_name: group.name.clone(),
            user_id: user_id.to_owned(),
            user_name: user_name.to_owned(),
        };
        self.social.publish(&[event]);
        info!(group_id = %group.id, invite_code = %group.invite_code, "group created");

        self.current_group = Some(group.id);
        Ok(group)
    }

    /// Joins and selects a group. Joining a group twice only switches to it.
    pub async fn join_group(&mut self, group_id: GroupId) -> Result<Group> {
        let (user_id, user_name) = self.signed_in("join a group")?;
        let store = self.social.store();
        let group = store
            .group(group_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("group {group_id}")))?;

        if store.add_member(group_id, user_id, OffsetDateTime::now_utc()).await? {
            let event = DomainEvent::MemberJoined {
                group_id,
                group_name: group.name.clone(),
                user_id: user_id.to_owned(),
                user_name: user_name.to_owned(),
            };
            self.social.publish(&[event]);
            info!(%group_id, %user_id, "member joined");
        } else {
            debug!(%group_id, "already a member, switching");
        }

        self.current_group = Some(group_id);
        Ok(group)
    }

    pub async fn join_group_by_code(&mut self, code: &str) -> Result<Group> {
        self.signed_in("join a group")?;
        let code = normalize_invite_code(code)?;
        let group = self
            .social
            .store()
            .group_by_code(&code)
            .await?
            .ok_or_else(|| Error::not_found(format!("invite code {code}")))?;
        self.join_group(group.id).await
    }

    /// Leaves the current group. Without a selection this does nothing.
    pub async fn leave_group(&mut self) -> Result<()> {
        let (user_id, _) = self.signed_in("leave a group")?;
        let Some(group_id) = self.current_group else {
            return Ok(());
        };
        if self.social.store().remove_member(group_id, user_id).await? {
            info!(%group_id, %user_id, "member left");
        }
        self.current_group = None;
        Ok(())
    }

    /// Read-only selection of a public group for guests.
    pub async fn browse_group(&mut self, group_id: GroupId) -> Result<Group> {
        if !self.identity.is_guest() {
            return Err(Error::invalid("join the group to open it"));
        }
        let group = self
            .social
            .store()
            .group(group_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("group {group_id}")))?;
        if !group.visibility.is_public() {
            return Err(Error::GuestRefused("open a private group"));
        }
        self.current_group = Some(group_id);
        Ok(group)
    }
}
