//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider has no credentials at all.
    #[error("provider {provider} has no configured credentials")]
    Unconfigured { provider: String },

    /// Every credential is inside its failure cooldown.
    #[error("provider {provider} exhausted: {failed} of {total} credentials cooling down")]
    Exhausted {
        provider: String,
        total: usize,
        failed: usize,
    },

    #[error("credential not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this is the "nothing configured" flavour of `NoneAvailable`.
    pub fn is_unconfigured(&self) -> bool {
        matches!(self, Error::Unconfigured { .. })
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
