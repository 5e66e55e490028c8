use thiserror::Error;

pub use anyhow::Context;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    /// The provider refused the call because no metered credits remain.
    /// Fatal to the whole run; never retried.
    #[error("provider credit quota exhausted")]
    QuotaExhausted,
    /// The provider rejected the configured API key. Fatal to the whole run,
    /// reported distinctly so the caller can re-configure instead of retry.
    #[error("pricing provider rejected the configured credential")]
    InvalidCredential,
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }
}
