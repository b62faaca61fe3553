use axum::{debug_handler, extract::{Path, State}, Json};
use tower_sessions::Session;

use crate::{
    model::{ReadingSession, UnitId},
    scripture::ScriptureClient,
    session::user_session,
    social::{SessionOutcome, Social},
    AppResult,
};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn record(
    State(social): State<Social>,
    session: Session,
    Json(reading): Json<ReadingSession>,
) -> AppResult<Json<SessionOutcome>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(me.record_session(reading).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn finish(
    Path(unit): Path<UnitId>,
    State(social): State<Social>,
    State(scripture): State<ScriptureClient>,
    session: Session,
) -> AppResult<Json<SessionOutcome>> {
    let me = user_session(&social, &session).await?;
    Ok(Json(scripture.finish_unit(&me, unit).await?))
}
