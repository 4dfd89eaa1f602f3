//! Error types for watch runs

/// Errors from a watch run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] ais_session::Error),

    #[error("session still expired after re-authentication")]
    SessionStillExpired,

    #[error("out-of-order run event: {0}")]
    OutOfOrder(String),

    #[error("notification failed: {0}")]
    Notify(String),
}

impl Error {
    /// Whether the process should stop instead of waiting for the next run.
    ///
    /// Only a missing credential record is fatal for the process: every
    /// other failure may clear up by the next scheduled run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Session(ais_session::Error::ConfigMissing(_)))
    }
}

/// Result alias for watch operations.
pub type Result<T> = std::result::Result<T, Error>;
