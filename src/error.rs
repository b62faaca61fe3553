use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A mutating action was attempted without signing in.
    #[error("sign in to {0}")]
    GuestRefused(&'static str),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Transient; the same request may succeed when retried.
    #[error("temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("scripture provider error: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}
