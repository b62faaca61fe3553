//! Cookie session keys and the bridge from a cookie session to a [`UserSession`].

use tower_sessions::Session;

use crate::model::{GroupId, Identity};
use crate::social::{Social, UserSession};
use crate::AppResult;

pub const USER_ID: &str = "user_id";
pub const USER_NAME: &str = "user_name";
pub const CURRENT_GROUP: &str = "current_group";

/// The signed-in identity, or the guest.
pub(crate) async fn identity(session: &Session) -> AppResult<Identity> {
    let id = session.get::<String>(USER_ID).await?;
    let name = session.get::<String>(USER_NAME).await?;
    Ok(match (id, name) {
        (Some(id), Some(name)) => Identity::User { id, name },
        _ => Identity::Guest,
    })
}

/// Reopens the engine session with the group selected on an earlier request.
pub(crate) async fn user_session(social: &Social, session: &Session) -> AppResult<UserSession> {
    let identity = identity(session).await?;
    let current = session.get::<GroupId>(CURRENT_GROUP).await?;
    let user_session = social.resume(identity, current).await?;
    if current.is_some() && user_session.current_group().is_none() {
        session.remove::<GroupId>(CURRENT_GROUP).await?;
    }
    Ok(user_session)
}

/// Stores the group selection for the next request.
pub(crate) async fn remember_group(session: &Session, user_session: &UserSession) -> AppResult<()> {
    match user_session.current_group() {
        Some(group_id) => session.insert(CURRENT_GROUP, group_id).await?,
        None => {
            session.remove::<GroupId>(CURRENT_GROUP).await?;
        }
    }
    Ok(())
}
