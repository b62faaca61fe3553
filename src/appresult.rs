use axum::{http::StatusCode, response::{IntoResponse, Response}};

use crate::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<Error>() {
            Some(Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Some(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(Error::GuestRefused(_)) => StatusCode::UNAUTHORIZED,
            Some(Error::Upstream(_)) => StatusCode::BAD_GATEWAY,
            Some(Error::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
            return (status, format!("{}\n\n{}", self.0, self.0.backtrace())).into_response();
        }
        (status, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
