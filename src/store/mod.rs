//! Persistence collaborator: a sqlite row store plus per-group insert notifications.
//!
//! The engine only reaches storage through fetch-by-filter, insert, update-by-id,
//! delete-by-filter and [`Store::subscribe`]. Every insert into shared group state is
//! published on the [`Hub`] after it commits.

mod feed;
mod goals;
mod groups;
mod hub;
mod profiles;

pub use hub::{Hub, RemoteInsert, Subscription};
pub use profiles::ProgressDelta;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::model::GroupId;
use crate::res::SCHEMA;
use crate::{Error, Result};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    hub: Hub,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!(database_url, "store ready");
        Ok(store)
    }

    /// A private database living as long as the store. Each connection to
    /// `sqlite::memory:` is its own database, so the pool is pinned to one.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            hub: Hub::default(),
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Live inserts for one group, or for global entries with `None`.
    pub fn subscribe(&self, group_id: Option<GroupId>) -> Subscription {
        self.hub.subscribe(group_id)
    }
}

pub(crate) fn nanos(t: OffsetDateTime) -> i64 {
    t.unix_timestamp_nanos() as i64
}

pub(crate) fn from_nanos(n: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(n))
        .map_err(|e| Error::Corrupt(format!("timestamp {n}: {e}")))
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(s)?)
}

pub(crate) fn parse_group_id(s: Option<&str>) -> Result<Option<GroupId>> {
    s.map(parse_id).transpose()
}
