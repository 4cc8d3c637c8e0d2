//! Error types for the GitHub login flow

/// Errors from login, token exchange and session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unusable configuration (e.g. empty client id).
    /// Raised at call time, fatal to the attempt.
    #[error("configuration error: {0}")]
    Config(String),

    /// Callback `state` does not match the pending login. Signals a
    /// forged, stale or replayed callback.
    #[error("invalid OAuth state")]
    InvalidState,

    /// No login is pending, so there is no code verifier to exchange
    /// with (different process, or the flow was never started).
    #[error("missing PKCE code verifier")]
    MissingVerifier,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("user fetch failed: {0}")]
    UserFetch(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// The operation's cancellation token fired. Not an application
    /// failure; callers drop this silently.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
