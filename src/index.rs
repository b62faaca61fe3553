use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    model::{FeedEntry, Identity},
    session,
    social::Social,
    AppResult,
};

#[derive(Serialize)]
pub struct Home {
    identity: Identity,
    activity: Vec<FeedEntry>,
}

/// Global activity for the landing page. Open to guests.
#[debug_handler(state = crate::AppState)]
pub async fn index(State(social): State<Social>, session: Session) -> AppResult<Json<Home>> {
    Ok(Json(Home {
        identity: session::identity(&session).await?,
        activity: social.global_activity().await?,
    }))
}
