use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    model::{Group, GroupId},
    session::{remember_group, user_session},
    social::Social,
    AppResult,
};

#[derive(Debug, Deserialize)]
pub(crate) struct JoinQuery {
    code: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join(
    Path(group_id): Path<GroupId>,
    State(social): State<Social>,
    session: Session,
) -> AppResult<Json<Group>> {
    let mut me = user_session(&social, &session).await?;
    let group = me.join_group(group_id).await?;
    remember_group(&session, &me).await?;
    Ok(Json(group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join_by_code(
    State(social): State<Social>,
    session: Session,
    Json(JoinQuery { code }): Json<JoinQuery>,
) -> AppResult<Json<Group>> {
    let mut me = user_session(&social, &session).await?;
    let group = me.join_group_by_code(&code).await?;
    remember_group(&session, &me).await?;
    Ok(Json(group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn leave(State(social): State<Social>, session: Session) -> AppResult<StatusCode> {
    let mut me = user_session(&social, &session).await?;
    me.leave_group().await?;
    remember_group(&session, &me).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn browse(
    Path(group_id): Path<GroupId>,
    State(social): State<Social>,
    session: Session,
) -> AppResult<Json<Group>> {
    let mut me = user_session(&social, &session).await?;
    let group = me.browse_group(group_id).await?;
    remember_group(&session, &me).await?;
    Ok(Json(group))
}
