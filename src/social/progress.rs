use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::events::DomainEvent;
use super::goals;
use super::session::UserSession;
use crate::model::{Identity, ReadingSession, User};
use crate::store::ProgressDelta;
use crate::{Error, Result};

impl From<&ReadingSession> for ProgressDelta {
    /// Streak grows by one for any session with pages; it never decays here.
    fn from(session: &ReadingSession) -> Self {
        Self {
            pages: u64::from(session.pages),
            verses: u64::from(session.verses),
            streak: u32::from(session.pages > 0),
            unit: session.unit,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionOutcome {
    /// Updated profile; `None` when the session was ignored.
    pub user: Option<User>,
    pub events: Vec<DomainEvent>,
}

impl SessionOutcome {
    pub fn is_ignored(&self) -> bool {
        self.user.is_none()
    }
}

impl UserSession {
    /// Adds a reading session to the actor's totals and evaluates goals.
    ///
    /// Guests are ignored without error: their progress is never persisted.
    #[instrument(skip(self), fields(user_id = %self.identity.id()))]
    pub async fn record_session(&self, session: ReadingSession) -> Result<SessionOutcome> {
        let Identity::User { id, name } = &self.identity else {
            debug!("guest session ignored");
            return Ok(SessionOutcome::default());
        };

        let store = self.social.store();
        let now = OffsetDateTime::now_utc();
        store.record_progress(id, ProgressDelta::from(&session), now).await?;
        let user = store
            .profile(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("profile {id}")))?;

        let recorded = DomainEvent::SessionRecorded {
            user_id: id.clone(),
            user_name: name.clone(),
            group_id: self.current_group,
            session: session.clone(),
            total_pages: user.pages_read,
        };
        self.social.publish(std::slice::from_ref(&recorded));
        let mut events = vec![recorded];

        // The session is committed at this point; a goal lookup failure must not
        // make the caller record it again.
        match goals::track(store, &user, &session, now).await {
            Ok(completed) => {
                self.social.publish(&completed);
                events.extend(completed);
            }
            Err(e) => warn!(error = %e, "goal tracking failed, session kept"),
        }

        info!(
            pages = session.pages,
            verses = session.verses,
            unit = ?session.unit,
            total_pages = user.pages_read,
            goals_completed = events.len() - 1,
            "session recorded"
        );
        Ok(SessionOutcome { user: Some(user), events })
    }

    /// Overwrites the actor's daily page goal.
    pub async fn set_daily_goal(&self, pages: u32) -> Result<User> {
        let (user_id, _) = self.signed_in("set a daily goal")?;
        if pages == 0 {
            return Err(Error::invalid("daily goal must be at least one page"));
        }
        let store = self.social.store();
        store.update_daily_goal(user_id, pages).await?;
        store
            .profile(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("profile {user_id}")))
    }
}
