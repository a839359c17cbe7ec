use thiserror::Error;

/// Top-level error type for the `mastertherm-api` crate.
///
/// The first five variants mirror the failure modes the cloud service
/// reports. The remaining ones cover local problems (bad URLs, client
/// construction) that never reach the network.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, locked account, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The account logged in, but its role cannot read heat-pump data.
    #[error("Unsupported account role: {role}")]
    UnsupportedRole { role: String },

    /// The session token expired, was revoked, or the session was closed.
    #[error("Session token invalid -- re-authentication required")]
    TokenInvalid,

    // ── Transport ───────────────────────────────────────────────────
    /// Connection refused, DNS failure, timeout or a 5xx from the servlet.
    #[error("Connection error: {message}")]
    Connection { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The reply could not be understood, with the raw body for debugging.
    #[error("Unexpected response format: {message}")]
    ResponseFormat { message: String, body: String },

    // ── Local ───────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl Error {
    /// Returns `true` if logging in again might resolve this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::TokenInvalid)
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::TokenInvalid)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Connection { message }
    }
}

/// Result type for MasterTherm API calls.
pub type Result<T> = std::result::Result<T, Error>;
