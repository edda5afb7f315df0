//! Gateway error taxonomy
//!
//! Quota errors are resolved inside the orchestrator and surface only as
//! `QuotaExceeded` once a provider's pool is used up. Everything else
//! propagates to the router, which logs it and moves to the next option.

use provider::Tool;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("provider {provider} has no configured credentials")]
    Unconfigured { provider: String },

    #[error("provider {provider} has no operation for {tool}")]
    Unsupported { provider: String, tool: Tool },

    #[error("provider {provider} quota exhausted after {attempts} attempt(s)")]
    QuotaExceeded { provider: String, attempts: usize },

    #[error("provider {provider} rejected credentials: {reason}")]
    AuthFailure { provider: String, reason: String },

    #[error("network error talking to {provider}: {reason}")]
    TransientNetwork { provider: String, reason: String },

    #[error("job on {provider} failed: {reason}")]
    JobFailed { provider: String, reason: String },

    #[error("job on {provider} timed out after {attempts} poll(s)")]
    JobTimedOut { provider: String, attempts: u32 },

    #[error("all providers exhausted for {tool} after {attempts} attempt(s): {source}")]
    AllProvidersExhausted {
        tool: Tool,
        attempts: usize,
        #[source]
        source: Cause,
    },
}

impl GatewayError {
    /// Stable machine-readable name, used as the `type` of API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unconfigured { .. } => "unconfigured",
            GatewayError::Unsupported { .. } => "unsupported",
            GatewayError::QuotaExceeded { .. } => "quota_exceeded",
            GatewayError::AuthFailure { .. } => "auth_failure",
            GatewayError::TransientNetwork { .. } => "network_error",
            GatewayError::JobFailed { .. } => "job_failed",
            GatewayError::JobTimedOut { .. } => "job_timed_out",
            GatewayError::AllProvidersExhausted { .. } => "all_providers_exhausted",
        }
    }

    /// Label for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::JobTimedOut { .. } => "timed_out",
            GatewayError::QuotaExceeded { .. } => "quota",
            GatewayError::AuthFailure { .. } => "auth",
            GatewayError::TransientNetwork { .. } => "network",
            _ => "failed",
        }
    }

    pub(crate) fn from_pool(error: docgate_pool::Error, attempts: usize) -> Self {
        match error {
            docgate_pool::Error::Unconfigured { provider } => GatewayError::Unconfigured { provider },
            docgate_pool::Error::Exhausted { provider, .. } => {
                GatewayError::QuotaExceeded { provider, attempts }
            }
            docgate_pool::Error::NotFound(id) => GatewayError::JobFailed {
                provider: String::from("<unknown>"),
                reason: format!("credential {id} vanished from pool"),
            },
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
