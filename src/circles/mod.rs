mod goals;
mod join;
mod msg;
mod new;
mod room;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(new::list).post(new::new_circle))
        .route("/join", post(join::join_by_code))
        .route("/leave", post(join::leave))
        .route("/goals", post(goals::post_goal))
        .route("/goals/presets", get(goals::presets))
        .route("/goals/presets/{index}", post(goals::post_preset))
        .route("/chat", post(msg::send_msg))
        .route("/{uuid}", get(room::circle))
        .route("/{uuid}/join", post(join::join))
        .route("/{uuid}/browse", post(join::browse))
        .route("/{uuid}/leaderboard", get(room::leaderboard))
        .route("/{uuid}/ws", get(ws::circle_ws))
}
