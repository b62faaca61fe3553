use tracing::instrument;

use super::{RemoteInsert, Store, from_nanos, nanos, parse_group_id, parse_id};
use crate::model::{FeedEntry, FeedKind, GroupId};
use crate::Result;

#[derive(sqlx::FromRow)]
struct FeedRow {
    id: String,
    group_id: Option<String>,
    author_id: String,
    author_name: String,
    text: String,
    created_at: i64,
    narrator: bool,
}

impl FeedRow {
    fn into_entry(self, kind: FeedKind) -> Result<FeedEntry> {
        Ok(FeedEntry {
            id: parse_id(&self.id)?,
            kind,
            group_id: parse_group_id(self.group_id.as_deref())?,
            author_id: self.author_id,
            author_name: self.author_name,
            text: self.text,
            created_at: from_nanos(self.created_at)?,
            narrator: self.narrator,
        })
    }
}

impl Store {
    #[instrument(skip(self, entry), fields(entry_id = %entry.id, kind = %entry.kind, group_id = ?entry.group_id))]
    pub async fn append(&self, entry: &FeedEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO feed (id,kind,group_id,author_id,author_name,text,created_at,narrator)
             VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.kind.to_string())
        .bind(entry.group_id.map(|id| id.to_string()))
        .bind(&entry.author_id)
        .bind(&entry.author_name)
        .bind(&entry.text)
        .bind(nanos(entry.created_at))
        .bind(entry.narrator)
        .execute(&self.pool)
        .await?;

        self.hub.publish(RemoteInsert::Entry { entry: entry.clone() });
        Ok(())
    }

    /// The `limit` most recent activity entries, newest first.
    pub async fn activity(&self, group_id: Option<GroupId>, limit: usize) -> Result<Vec<FeedEntry>> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT id,group_id,author_id,author_name,text,created_at,narrator FROM feed
             WHERE kind='activity' AND group_id IS ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(group_id.map(|id| id.to_string()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|row| row.into_entry(FeedKind::Activity)).collect()
    }

    /// The whole chat of a group, oldest first.
    pub async fn chat(&self, group_id: GroupId) -> Result<Vec<FeedEntry>> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT id,group_id,author_id,author_name,text,created_at,narrator FROM feed
             WHERE kind='chat' AND group_id=?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|row| row.into_entry(FeedKind::Chat)).collect()
    }
}
