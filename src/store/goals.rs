use std::collections::BTreeSet;

use time::OffsetDateTime;
use tracing::instrument;

use super::{RemoteInsert, Store, from_nanos, nanos, parse_id};
use crate::model::{GoalId, GoalTarget, GroupGoal, GroupId};
use crate::{Error, Result};

#[derive(sqlx::FromRow)]
struct GoalRow {
    id: String,
    group_id: String,
    title: String,
    description: String,
    target_kind: String,
    target_value: i64,
    created_by: String,
    created_at: i64,
}

impl Store {
    #[instrument(skip(self, goal), fields(goal_id = %goal.id, group_id = %goal.group_id))]
    pub async fn insert_goal(&self, goal: &GroupGoal) -> Result<()> {
        sqlx::query(
            "INSERT INTO goals (id,group_id,title,description,target_kind,target_value,created_by,created_at)
             VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(goal.id.to_string())
        .bind(goal.group_id.to_string())
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(goal.target.kind())
        .bind(goal.target.value().ok_or_else(|| Error::invalid(format!("goal target {:?}", goal.target)))?)
        .bind(&goal.created_by)
        .bind(nanos(goal.created_at))
        .execute(&self.pool)
        .await?;

        self.hub.publish(RemoteInsert::Goal { goal: goal.clone() });
        Ok(())
    }

    /// Goals of a group with their completion sets, newest first.
    pub async fn goals(&self, group_id: GroupId) -> Result<Vec<GroupGoal>> {
        let rows: Vec<GoalRow> = sqlx::query_as(
            "SELECT id,group_id,title,description,target_kind,target_value,created_by,created_at
             FROM goals WHERE group_id=? ORDER BY created_at DESC, id DESC",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut goals = Vec::with_capacity(rows.len());
        for row in rows {
            let completed_by = self.completed_by(&row.id).await?;
            let target = GoalTarget::from_parts(&row.target_kind, row.target_value).ok_or_else(|| {
                Error::Corrupt(format!("goal target {}={}", row.target_kind, row.target_value))
            })?;
            goals.push(GroupGoal {
                id: parse_id(&row.id)?,
                group_id: parse_id(&row.group_id)?,
                title: row.title,
                description: row.description,
                target,
                created_by: row.created_by,
                created_at: from_nanos(row.created_at)?,
                completed_by,
            });
        }
        Ok(goals)
    }

    /// Adds `user_id` to the goal's completion set. Returns false if already there.
    #[instrument(skip(self))]
    pub async fn add_completion(
        &self,
        group_id: GroupId,
        goal_id: GoalId,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<bool> {
        let added = sqlx::query("INSERT OR IGNORE INTO goal_completions (goal_id,user_id,completed_at) VALUES (?,?,?)")
            .bind(goal_id.to_string())
            .bind(user_id)
            .bind(nanos(now))
            .execute(&self.pool)
            .await?
            .rows_affected()
            == 1;

        if added {
            self.hub.publish(RemoteInsert::GoalCompletion {
                group_id,
                goal_id,
                user_id: user_id.to_owned(),
            });
        }
        Ok(added)
    }

    async fn completed_by(&self, goal_id: &str) -> Result<BTreeSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT user_id FROM goal_completions WHERE goal_id=?")
            .bind(goal_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::model::{Group, Visibility};

    async fn circle(store: &Store, code: &str) -> GroupId {
        let group = Group {
            id: Uuid::now_v7(),
            name: "Fajr Club".into(),
            description: "".into(),
            visibility: Visibility::Public,
            created_at: OffsetDateTime::now_utc(),
            created_by: "u1".into(),
            invite_code: code.into(),
        };
        store.insert_group(&group).await.unwrap();
        group.id
    }

    fn goal(group_id: GroupId, target: GoalTarget) -> GroupGoal {
        GroupGoal {
            id: Uuid::now_v7(),
            group_id,
            title: "Read Surah Yasin".into(),
            description: "Heart of the Quran".into(),
            target,
            created_by: "u1".into(),
            created_at: OffsetDateTime::now_utc(),
            completed_by: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn goals_round_trip_with_completions() {
        let store = Store::in_memory().await.unwrap();
        let group_id = circle(&store, "AAAA1111").await;
        let g = goal(group_id, GoalTarget::Unit(36));
        store.insert_goal(&g).await.unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(store.add_completion(group_id, g.id, "u2", now).await.unwrap());
        assert!(!store.add_completion(group_id, g.id, "u2", now).await.unwrap());

        let goals = store.goals(group_id).await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].target, GoalTarget::Unit(36));
        assert_eq!(goals[0].completed_by, BTreeSet::from(["u2".to_string()]));
    }

    #[tokio::test]
    async fn goals_are_scoped_to_group() {
        let store = Store::in_memory().await.unwrap();
        let mine = circle(&store, "AAAA1111").await;
        let theirs = circle(&store, "BBBB2222").await;
        store.insert_goal(&goal(mine, GoalTarget::Pages(20))).await.unwrap();
        store.insert_goal(&goal(theirs, GoalTarget::Pages(10))).await.unwrap();

        let goals = store.goals(mine).await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].target, GoalTarget::Pages(20));
    }
}
