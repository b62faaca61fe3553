use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{model::FeedEntry, session::user_session, social::Social, AppResult};

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageQuery {
    pub(crate) text: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_msg(
    State(social): State<Social>,
    session: Session,
    Json(SendMessageQuery { text }): Json<SendMessageQuery>,
) -> AppResult<Json<FeedEntry>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(me.send_chat(&text).await?))
}
