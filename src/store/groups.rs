use time::OffsetDateTime;
use tracing::instrument;

use super::{RemoteInsert, Store, from_nanos, nanos, parse_id};
use crate::model::{Group, GroupId, NARRATOR_ID, UserId, Visibility};
use crate::Result;

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    description: String,
    is_public: bool,
    created_at: i64,
    created_by: String,
    invite_code: String,
}

impl TryFrom<GroupRow> for Group {
    type Error = crate::Error;

    fn try_from(row: GroupRow) -> Result<Self> {
        Ok(Group {
            id: parse_id(&row.id)?,
            name: row.name,
            description: row.description,
            visibility: Visibility::from(row.is_public),
            created_at: from_nanos(row.created_at)?,
            created_by: row.created_by,
            invite_code: row.invite_code,
        })
    }
}

const GROUP_COLUMNS: &str =
    "g.id, g.name, g.description, g.is_public, g.created_at, g.created_by, g.invite_code";

fn into_groups(rows: Vec<GroupRow>) -> Result<Vec<Group>> {
    rows.into_iter().map(Group::try_from).collect()
}

impl Store {
    /// Inserts the group with its creator as the only member. Groups created by the
    /// narrator start empty.
    #[instrument(skip(self, group), fields(group_id = %group.id, invite_code = %group.invite_code))]
    pub async fn insert_group(&self, group: &Group) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO circles (id,name,description,is_public,created_at,created_by,invite_code)
             VALUES (?,?,?,?,?,?,?)",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.visibility.is_public())
        .bind(nanos(group.created_at))
        .bind(&group.created_by)
        .bind(&group.invite_code)
        .execute(&mut *tx)
        .await?;

        let with_creator = group.created_by != NARRATOR_ID;
        if with_creator {
            sqlx::query("INSERT INTO memberships (group_id,user_id,joined_at) VALUES (?,?,?)")
                .bind(group.id.to_string())
                .bind(&group.created_by)
                .bind(nanos(group.created_at))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if with_creator {
            self.hub.publish(RemoteInsert::Member {
                group_id: group.id,
                user_id: group.created_by.clone(),
            });
        }
        Ok(())
    }

    pub async fn group(&self, group_id: GroupId) -> Result<Option<Group>> {
        let row: Option<GroupRow> =
            sqlx::query_as(&format!("SELECT {GROUP_COLUMNS} FROM circles g WHERE g.id=?"))
                .bind(group_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Group::try_from).transpose()
    }

    /// Exact match; callers normalize the code first.
    pub async fn group_by_code(&self, invite_code: &str) -> Result<Option<Group>> {
        let row: Option<GroupRow> =
            sqlx::query_as(&format!("SELECT {GROUP_COLUMNS} FROM circles g WHERE g.invite_code=?"))
                .bind(invite_code)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Group::try_from).transpose()
    }

    /// Every group, newest first.
    pub async fn groups(&self) -> Result<Vec<Group>> {
        let rows: Vec<GroupRow> = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM circles g ORDER BY g.created_at DESC, g.id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        into_groups(rows)
    }

    pub async fn groups_of(&self, user_id: &str) -> Result<Vec<Group>> {
        let rows: Vec<GroupRow> = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM circles g
             JOIN memberships m ON m.group_id=g.id
             WHERE m.user_id=?
             ORDER BY m.joined_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_groups(rows)
    }

    pub async fn members(&self, group_id: GroupId) -> Result<Vec<UserId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM memberships WHERE group_id=? ORDER BY joined_at ASC")
                .bind(group_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    pub async fn is_member(&self, group_id: GroupId, user_id: &str) -> Result<bool> {
        Ok(sqlx::query("SELECT 1 FROM memberships WHERE group_id=? AND user_id=?")
            .bind(group_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some())
    }

    pub async fn invite_code_taken(&self, invite_code: &str) -> Result<bool> {
        Ok(sqlx::query("SELECT 1 FROM circles WHERE invite_code=?")
            .bind(invite_code)
            .fetch_optional(&self.pool)
            .await?
            .is_some())
    }

    /// Returns false if the user already was a member.
    #[instrument(skip(self))]
    pub async fn add_member(&self, group_id: GroupId, user_id: &str, now: OffsetDateTime) -> Result<bool> {
        let added = sqlx::query("INSERT OR IGNORE INTO memberships (group_id,user_id,joined_at) VALUES (?,?,?)")
            .bind(group_id.to_string())
            .bind(user_id)
            .bind(nanos(now))
            .execute(&self.pool)
            .await?
            .rows_affected()
            == 1;

        if added {
            self.hub.publish(RemoteInsert::Member {
                group_id,
                user_id: user_id.to_owned(),
            });
        }
        Ok(added)
    }

    #[instrument(skip(self))]
    pub async fn remove_member(&self, group_id: GroupId, user_id: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM memberships WHERE group_id=? AND user_id=?")
            .bind(group_id.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;
        if removed {
            self.hub.publish(RemoteInsert::MemberLeft {
                group_id,
                user_id: user_id.to_owned(),
            });
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn group(code: &str, creator: &str) -> Group {
        Group {
            id: Uuid::now_v7(),
            name: "Taraweeh Crew".into(),
            description: "".into(),
            visibility: Visibility::Private,
            created_at: OffsetDateTime::now_utc(),
            created_by: creator.into(),
            invite_code: code.into(),
        }
    }

    #[tokio::test]
    async fn creator_is_first_member() {
        let store = Store::in_memory().await.unwrap();
        let g = group("ABCD1234", "u1");
        store.insert_group(&g).await.unwrap();

        assert_eq!(store.members(g.id).await.unwrap(), vec!["u1".to_string()]);
        assert_eq!(store.group(g.id).await.unwrap(), Some(g.clone()));
        assert_eq!(store.group_by_code("ABCD1234").await.unwrap(), Some(g));
    }

    #[tokio::test]
    async fn invite_codes_are_unique() {
        let store = Store::in_memory().await.unwrap();
        store.insert_group(&group("SAMECODE", "u1")).await.unwrap();
        assert!(store.invite_code_taken("SAMECODE").await.unwrap());
        assert!(store.insert_group(&group("SAMECODE", "u2")).await.is_err());
    }

    #[tokio::test]
    async fn membership_add_and_remove() {
        let store = Store::in_memory().await.unwrap();
        let g = group("ABCD1234", "u1");
        store.insert_group(&g).await.unwrap();
        let now = OffsetDateTime::now_utc();

        assert!(store.add_member(g.id, "u2", now).await.unwrap());
        assert!(!store.add_member(g.id, "u2", now).await.unwrap());
        assert!(store.is_member(g.id, "u2").await.unwrap());
        assert_eq!(store.groups_of("u2").await.unwrap().len(), 1);

        assert!(store.remove_member(g.id, "u2").await.unwrap());
        assert!(!store.is_member(g.id, "u2").await.unwrap());
        assert!(!store.remove_member(g.id, "u2").await.unwrap());
    }

    #[tokio::test]
    async fn join_is_pushed_to_subscribers() {
        let store = Store::in_memory().await.unwrap();
        let g = group("ABCD1234", "u1");
        store.insert_group(&g).await.unwrap();
        let mut sub = store.subscribe(Some(g.id));

        store.add_member(g.id, "u2", OffsetDateTime::now_utc()).await.unwrap();

        assert_eq!(
            sub.try_recv(),
            Some(RemoteInsert::Member { group_id: g.id, user_id: "u2".into() })
        );
    }

    #[tokio::test]
    async fn leave_is_pushed_once() {
        let store = Store::in_memory().await.unwrap();
        let g = group("ABCD1234", "u1");
        store.insert_group(&g).await.unwrap();
        store.add_member(g.id, "u2", OffsetDateTime::now_utc()).await.unwrap();
        let mut sub = store.subscribe(Some(g.id));

        store.remove_member(g.id, "u2").await.unwrap();
        store.remove_member(g.id, "u2").await.unwrap();

        assert_eq!(
            sub.try_recv(),
            Some(RemoteInsert::MemberLeft { group_id: g.id, user_id: "u2".into() })
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn narrator_groups_start_without_members() {
        let store = Store::in_memory().await.unwrap();
        let g = group("RAMADAN1", NARRATOR_ID);
        let mut sub = store.subscribe(Some(g.id));
        store.insert_group(&g).await.unwrap();

        assert!(store.members(g.id).await.unwrap().is_empty());
        assert_eq!(sub.try_recv(), None);
    }
}

