mod page;
mod sessions;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(page::me))
        .route("/goal", post(page::daily_goal))
        .route("/sessions", post(sessions::record))
        .route("/finish/{unit}", post(sessions::finish))
}
