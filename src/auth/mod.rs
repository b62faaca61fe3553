//! Sign-in is delegated to an outside identity provider; these routes only bind the
//! already-authenticated user to the cookie session.

mod login;
mod logout;

use axum::{routing::post, Router};

use crate::AppState;

pub use login::login;
pub use logout::logout;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(login::login))
        .route("/logout", post(logout::logout))
}
