use axum::{debug_handler, extract::{Path, State}, routing::get, Json, Router};

use crate::{model::UnitId, AppResult, AppState};

use super::{ScriptureClient, Surah, SurahText};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(surahs))
        .route("/{unit}", get(surah))
}

#[debug_handler(state = AppState)]
async fn surahs(State(scripture): State<ScriptureClient>) -> AppResult<Json<Vec<Surah>>> {
    Ok(Json(scripture.surahs().await?.to_vec()))
}

#[debug_handler(state = AppState)]
async fn surah(
    Path(unit): Path<UnitId>,
    State(scripture): State<ScriptureClient>,
) -> AppResult<Json<SurahText>> {
    Ok(Json(SurahText::clone(&*scripture.surah(unit).await?)))
}
