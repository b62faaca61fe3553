use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::{
    model::{User, GUEST_ID, NARRATOR_ID},
    session::{self, CURRENT_GROUP, USER_ID, USER_NAME},
    social::Social,
    AppResult, Error,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub name: String,
}

#[debug_handler(state = crate::AppState)]
pub async fn login(
    State(social): State<Social>,
    session: Session,
    Json(LoginRequest { user_id, name }): Json<LoginRequest>,
) -> AppResult<Json<Option<User>>> {
    let user_id = user_id.trim();
    let name = name.trim();
    if user_id.is_empty() || name.is_empty() {
        return Err(Error::invalid("user id and name are required"))?;
    }
    if user_id == GUEST_ID || user_id == NARRATOR_ID {
        return Err(Error::invalid(format!("{user_id} is reserved")))?;
    }

    session.cycle_id().await?;
    session.insert(USER_ID, user_id).await?;
    session.insert(USER_NAME, name).await?;
    session.remove::<uuid::Uuid>(CURRENT_GROUP).await?;

    let me = social.session(session::identity(&session).await?).await?;
    info!(%user_id, "signed in");
    Ok(Json(me.user().await?))
}
