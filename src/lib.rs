pub mod appresult;
pub mod auth;
pub mod circles;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod profiles;
pub mod res;
pub mod scripture;
pub mod session;
pub mod social;
pub mod store;
pub mod telemetry;

use axum::{extract::FromRef, routing::get, Router};

pub use appresult::{AppError, AppResult};
pub use config::Config;
pub use error::{Error, Result};

use scripture::ScriptureClient;
use social::Social;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub social: Social,
    pub scripture: ScriptureClient,
}

/// Every route, still without session and tracing layers.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index::index))
        .merge(auth::router())
        .nest("/me", profiles::router())
        .nest("/g", circles::router())
        .nest("/scripture", scripture::router())
}
