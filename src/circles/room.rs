use axum::{debug_handler, extract::{Path, State}, Json};
use tower_sessions::Session;

use crate::{
    model::GroupId,
    session::user_session,
    social::{feed::GroupSnapshot, groups::Leaderboard, Social},
    AppResult,
};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn circle(
    Path(group_id): Path<GroupId>,
    State(social): State<Social>,
    session: Session,
) -> AppResult<Json<GroupSnapshot>> {
    let me = user_session(&social, &session).await?;
    let (view, _) = me.open_group(group_id).await?;
    Ok(Json(view.snapshot()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn leaderboard(
    Path(group_id): Path<GroupId>,
    State(social): State<Social>,
    session: Session,
) -> AppResult<Json<Leaderboard>> {
    // Same visibility rules as the circle itself.
    let me = user_session(&social, &session).await?;
    me.open_group(group_id).await?;
    Ok(Json(social.leaderboard(group_id).await?))
}
