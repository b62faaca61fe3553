use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    model::{Group, GroupId, Identity, User},
    session::user_session,
    social::Social,
    AppResult,
};

#[derive(Serialize)]
pub(crate) struct Me {
    identity: Identity,
    user: Option<User>,
    groups: Vec<Group>,
    current_group: Option<GroupId>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn me(State(social): State<Social>, session: Session) -> AppResult<Json<Me>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(Me {
        identity: me.identity().clone(),
        user: me.user().await?,
        groups: me.my_groups().await?,
        current_group: me.current_group(),
    }))
}

#[derive(Deserialize)]
pub(crate) struct DailyGoal {
    pages: u32,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn daily_goal(
    State(social): State<Social>,
    session: Session,
    Json(DailyGoal { pages }): Json<DailyGoal>,
) -> AppResult<Json<User>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(me.set_daily_goal(pages).await?))
}
