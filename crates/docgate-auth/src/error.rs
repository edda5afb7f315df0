//! Error types for token acquisition

/// Errors from token acquisition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint returned {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl Error {
    /// HTTP status returned by the token endpoint, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::TokenExchange { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body returned by the token endpoint, when there was one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::TokenExchange { body, .. } => Some(body),
            Error::InvalidCredentials(body) => Some(body),
            _ => None,
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
