use std::collections::BTreeSet;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::events::DomainEvent;
use super::session::UserSession;
use crate::model::{GoalTarget, GroupGoal, ReadingSession, User};
use crate::store::Store;
use crate::{Error, Result};

/// Surahs in the mushaf.
pub const UNIT_COUNT: u32 = 114;

#[derive(Clone, Copy, Debug, Serialize)]
pub struct PresetGoal {
    pub title: &'static str,
    pub description: &'static str,
    pub target: GoalTarget,
}

pub const PRESET_GOALS: [PresetGoal; 6] = [
    PresetGoal { title: "Read Surah Al-Kahf", description: "Friday Sunnah", target: GoalTarget::Unit(18) },
    PresetGoal { title: "Read Surah Yasin", description: "Heart of the Quran", target: GoalTarget::Unit(36) },
    PresetGoal { title: "Read Surah Al-Mulk", description: "Protection from the grave", target: GoalTarget::Unit(67) },
    PresetGoal { title: "Read Surah Al-Baqarah", description: "The longest Surah", target: GoalTarget::Unit(2) },
    PresetGoal { title: "Read 10 Pages Daily", description: "Daily commitment", target: GoalTarget::Pages(10) },
    PresetGoal { title: "Complete a Juz", description: "Read 20 pages", target: GoalTarget::Pages(20) },
];

/// Whether this session satisfies the goal for `user`, whose totals already include it.
///
/// Page goals compare lifetime pages, not the session's own count. Members already in
/// the completion set are never satisfied again.
pub fn satisfied(goal: &GroupGoal, user: &User, session: &ReadingSession) -> bool {
    if goal.completed_by.contains(&user.id) {
        return false;
    }
    match goal.target {
        GoalTarget::Unit(unit) => session.unit == Some(unit),
        GoalTarget::Pages(target) => user.pages_read >= target,
    }
}

fn validate_target(target: GoalTarget) -> Result<()> {
    match target {
        GoalTarget::Unit(unit) if !(1..=UNIT_COUNT).contains(&unit) => {
            Err(Error::invalid(format!("surah must be between 1 and {UNIT_COUNT}")))
        }
        GoalTarget::Pages(0) => Err(Error::invalid("page target must be positive")),
        GoalTarget::Pages(pages) if i64::try_from(pages).is_err() => {
            Err(Error::invalid(format!("page target {pages} is too large")))
        }
        _ => Ok(()),
    }
}

/// Reacts to a recorded session: marks every newly satisfied goal across the
/// user's groups and returns one `GoalCompleted` per goal.
pub(crate) async fn track(
    store: &Store,
    user: &User,
    session: &ReadingSession,
    now: OffsetDateTime,
) -> Result<Vec<DomainEvent>> {
    let mut events = Vec::new();
    for group in store.groups_of(&user.id).await? {
        for goal in store.goals(group.id).await? {
            if !satisfied(&goal, user, session) {
                continue;
            }
            // Another session may have raced us here; only the insert that lands counts.
            if store.add_completion(group.id, goal.id, &user.id, now).await? {
                debug!(goal_id = %goal.id, user_id = %user.id, "goal completed");
                events.push(DomainEvent::GoalCompleted {
                    group_id: group.id,
                    goal_id: goal.id,
                    title: goal.title,
                    user_id: user.id.clone(),
                    user_name: user.name.clone(),
                });
            }
        }
    }
    Ok(events)
}

impl UserSession {
    /// Posts a shared goal to the current group.
    pub async fn post_goal(&self, title: &str, description: &str, target: GoalTarget) -> Result<GroupGoal> {
        let (user_id, user_name) = self.signed_in("post a goal")?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::invalid("goal title is empty"));
        }
        validate_target(target)?;
        let group_id = self.member_group("post a goal").await?;

        let description = match description.trim() {
            "" => "Personal goal for the group",
            d => d,
        };
        let goal = GroupGoal {
            id: Uuid::now_v7(),
            group_id,
            title: title.to_owned(),
            description: description.to_owned(),
            target,
            created_by: user_id.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            completed_by: BTreeSet::new(),
        };
        self.social.store().insert_goal(&goal).await?;

        self.social.publish(&[DomainEvent::GoalPosted {
            group_id,
            goal_id: goal.id,
            title: goal.title.clone(),
            user_id: user_id.to_owned(),
            user_name: user_name.to_owned(),
        }]);
        info!(goal_id = %goal.id, %group_id, target = ?goal.target, "goal posted");
        Ok(goal)
    }

    pub async fn post_preset_goal(&self, index: usize) -> Result<GroupGoal> {
        let preset = PRESET_GOALS
            .get(index)
            .ok_or_else(|| Error::invalid(format!("no preset goal {index}")))?;
        self.post_goal(preset.title, preset.description, preset.target).await
    }
}
