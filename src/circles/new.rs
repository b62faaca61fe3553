use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    model::{Group, Visibility},
    session::{remember_group, user_session},
    social::Social,
    AppResult,
};

#[derive(Debug, Deserialize)]
pub(crate) struct NewCircleQuery {
    name: String,
    #[serde(default)]
    description: String,
    is_public: bool,
}

#[derive(Serialize)]
pub(crate) struct Circles {
    all: Vec<Group>,
    mine: Vec<Group>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(State(social): State<Social>, session: Session) -> AppResult<Json<Circles>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(Circles {
        all: social.groups().await?,
        mine: me.my_groups().await?,
    }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_circle(
    State(social): State<Social>,
    session: Session,
    Json(NewCircleQuery { name, description, is_public }): Json<NewCircleQuery>,
) -> AppResult<Json<Group>> {
    let mut me = user_session(&social, &session).await?;
    let group = me.create_group(&name, &description, Visibility::from(is_public)).await?;
    remember_group(&session, &me).await?;
    Ok(Json(group))
}
