use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Wallet unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Remote call rejected: {0}")]
    RemoteRejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Expected {0} event missing from confirmed receipt")]
    EventMissing(&'static str),

    #[error("Game {0} not found on contract")]
    NotFound(u64),

    #[error("Precondition failed: {0}")]
    Precondition(String),
}

impl AppError {
    /// Stable code string for keying inline, dismissible UI notices.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::RemoteRejected(_) => "REMOTE_REJECTED",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::EventMissing(_) => "EVENT_MISSING",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Precondition(_) => "PRECONDITION_FAILED",
        }
    }

    /// Transport failures are the only class safe to retry blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
