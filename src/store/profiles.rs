use std::collections::BTreeSet;

use time::OffsetDateTime;
use tracing::instrument;

use super::{Store, from_nanos, nanos};
use crate::model::{GroupId, UnitId, User};
use crate::{Error, Result};

/// Increments applied to a profile by one reading session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressDelta {
    pub pages: u64,
    pub verses: u64,
    pub streak: u32,
    pub unit: Option<UnitId>,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    name: String,
    pages_read: i64,
    verses_read: i64,
    daily_goal: i64,
    streak: i64,
    last_active: i64,
}

const PROFILE_COLUMNS: &str =
    "p.user_id, p.name, p.pages_read, p.verses_read, p.daily_goal, p.streak, p.last_active";

impl Store {
    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: &str) -> Result<Option<User>> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.user_id=?"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Inserts the profile unless one already exists for that id.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn insert_profile(&self, user: &User) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO profiles (user_id,name,pages_read,verses_read,daily_goal,streak,last_active)
             VALUES (?,?,?,?,?,?,?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.pages_read as i64)
        .bind(user.verses_read as i64)
        .bind(i64::from(user.daily_goal))
        .bind(i64::from(user.streak))
        .bind(nanos(user.last_active))
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        for unit in &user.completed_units {
            sqlx::query("INSERT OR IGNORE INTO completed_units (user_id,unit) VALUES (?,?)")
                .bind(&user.id)
                .bind(i64::from(*unit))
                .execute(&self.pool)
                .await?;
        }

        Ok(inserted)
    }

    /// Adds the delta in place, so concurrent sessions never lose pages.
    /// Returns whether `delta.unit` was newly completed.
    #[instrument(skip(self))]
    pub async fn record_progress(
        &self,
        user_id: &str,
        delta: ProgressDelta,
        now: OffsetDateTime,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE profiles SET pages_read=pages_read+?, verses_read=verses_read+?, streak=streak+?, last_active=?
             WHERE user_id=?",
        )
        .bind(delta.pages as i64)
        .bind(delta.verses as i64)
        .bind(i64::from(delta.streak))
        .bind(nanos(now))
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::not_found(format!("profile {user_id}")));
        }

        let mut new_unit = false;
        if let Some(unit) = delta.unit {
            new_unit = sqlx::query("INSERT OR IGNORE INTO completed_units (user_id,unit) VALUES (?,?)")
                .bind(user_id)
                .bind(i64::from(unit))
                .execute(&mut *tx)
                .await?
                .rows_affected()
                == 1;
        }

        tx.commit().await?;
        Ok(new_unit)
    }

    #[instrument(skip(self))]
    pub async fn update_daily_goal(&self, user_id: &str, daily_goal: u32) -> Result<()> {
        let updated = sqlx::query("UPDATE profiles SET daily_goal=? WHERE user_id=?")
            .bind(i64::from(daily_goal))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::not_found(format!("profile {user_id}")));
        }
        Ok(())
    }

    /// Members of a group, most pages first.
    #[instrument(skip(self))]
    pub async fn leaderboard(&self, group_id: GroupId, limit: u32) -> Result<Vec<User>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p
             JOIN memberships m ON m.user_id=p.user_id
             WHERE m.group_id=?
             ORDER BY p.pages_read DESC, p.name ASC
             LIMIT ?"
        ))
        .bind(group_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate(row).await?);
        }
        Ok(users)
    }

    async fn hydrate(&self, row: ProfileRow) -> Result<User> {
        let units: Vec<(i64,)> = sqlx::query_as("SELECT unit FROM completed_units WHERE user_id=?")
            .bind(&row.user_id)
            .fetch_all(&self.pool)
            .await?;
        let completed_units = units
            .into_iter()
            .map(|(unit,)| UnitId::try_from(unit).map_err(|_| Error::Corrupt(format!("unit {unit}"))))
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(User {
            id: row.user_id,
            name: row.name,
            pages_read: count(row.pages_read)?,
            verses_read: count(row.verses_read)?,
            completed_units,
            daily_goal: small(row.daily_goal)?,
            streak: small(row.streak)?,
            last_active: from_nanos(row.last_active)?,
        })
    }
}

fn count(n: i64) -> Result<u64> {
    u64::try_from(n).map_err(|_| Error::Corrupt(format!("negative count {n}")))
}

fn small(n: i64) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::Corrupt(format!("out of range {n}")))
}
