use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    model::{GoalTarget, GroupGoal},
    session::user_session,
    social::{PresetGoal, Social, PRESET_GOALS},
    AppResult,
};

#[derive(Debug, Deserialize)]
pub(crate) struct NewGoalQuery {
    title: String,
    #[serde(default)]
    description: String,
    target: GoalTarget,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_goal(
    State(social): State<Social>,
    session: Session,
    Json(NewGoalQuery { title, description, target }): Json<NewGoalQuery>,
) -> AppResult<Json<GroupGoal>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(me.post_goal(&title, &description, target).await?))
}

#[debug_handler]
pub(crate) async fn presets() -> Json<&'static [PresetGoal]> {
    Json(&PRESET_GOALS)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_preset(
    Path(index): Path<usize>,
    State(social): State<Social>,
    session: Session,
) -> AppResult<Json<GroupGoal>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(me.post_preset_goal(index).await?))
}
