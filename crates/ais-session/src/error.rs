//! Error types for session and fetch operations

/// Errors from credential storage, negotiation and date fetching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential record missing or malformed: {0}")]
    ConfigMissing(String),

    #[error("bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("transient network failure after {attempts} attempts: {message}")]
    TransientNetwork { attempts: u32, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
