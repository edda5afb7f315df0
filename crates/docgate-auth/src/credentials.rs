//! Provider credentials and their environment loader
//!
//! Credentials are supplied as indexed environment entries, one account per
//! index starting at 1:
//!
//! ```text
//! ADOBE_1_ID=...        ADOBE_1_SECRET=...     ADOBE_1_LABEL=personal (optional)
//! ADOBE_2_ID=...        ADOBE_2_SECRET=...
//! CONVERTAPI_1_KEY=...                          (single-key providers)
//! ```
//!
//! Scanning stops at the first index with no entries at all. A half-specified
//! index (an id without a secret or the reverse) is a configuration error
//! rather than a silently skipped account.

use common::Secret;
use tracing::{debug, info, warn};

use crate::constants::MAX_INDEXED_ACCOUNTS;

/// One account's authentication material for a provider.
///
/// Identity is `public_id`. The secret is redacted in Debug output.
#[derive(Debug, Clone)]
pub struct Credential {
    pub provider_id: String,
    /// Public half of the key pair (client id, project key, ...)
    pub public_id: String,
    /// Private half (client secret, signing key, API key)
    pub secret: Secret<String>,
    /// Human-readable name for logs and status output
    pub label: String,
}

impl Credential {
    pub fn new(
        provider_id: impl Into<String>,
        public_id: impl Into<String>,
        secret: impl Into<Secret<String>>,
    ) -> Self {
        let provider_id = provider_id.into();
        let public_id = public_id.into();
        Self {
            label: format!("{provider_id}:{public_id}"),
            provider_id,
            public_id,
            secret: secret.into(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Identity of the credential.
    pub fn id(&self) -> &str {
        &self.public_id
    }
}

/// Load a provider's credentials through an arbitrary lookup function.
///
/// Blank values count as absent.
pub fn load_indexed_from<F>(
    provider_id: &str,
    prefix: &str,
    lookup: F,
) -> common::Result<Vec<Credential>>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
    let mut credentials: Vec<Credential> = Vec::new();

    for index in 1..=MAX_INDEXED_ACCOUNTS {
        let id_var = format!("{prefix}_{index}_ID");
        let secret_var = format!("{prefix}_{index}_SECRET");
        let key_var = format!("{prefix}_{index}_KEY");

        let credential = match (get(&id_var), get(&secret_var), get(&key_var)) {
            (None, None, None) => break,
            (Some(public_id), Some(secret), None) => {
                Credential::new(provider_id, public_id, secret)
            }
            (None, None, Some(key)) => {
                // Single-key accounts: the index doubles as the public identity.
                Credential::new(provider_id, format!("{provider_id}-{index}"), key)
            }
            (Some(_), None, None) => {
                return Err(common::Error::Env {
                    var: secret_var,
                    reason: format!("missing while {id_var} is set"),
                });
            }
            (None, Some(_), None) => {
                return Err(common::Error::Env {
                    var: id_var,
                    reason: format!("missing while {secret_var} is set"),
                });
            }
            (_, _, Some(_)) => {
                return Err(common::Error::Env {
                    var: key_var,
                    reason: format!("cannot be combined with {id_var}/{secret_var}"),
                });
            }
        };

        let credential = match get(&format!("{prefix}_{index}_LABEL")) {
            Some(label) => credential.with_label(label),
            None => credential.with_label(format!("{provider_id}#{index}")),
        };

        if credentials.iter().any(|c| c.public_id == credential.public_id) {
            warn!(
                provider = provider_id,
                index, "duplicate credential public id, skipping"
            );
            continue;
        }
        debug!(provider = provider_id, index, label = %credential.label, "loaded credential");
        credentials.push(credential);
    }

    info!(
        provider = provider_id,
        prefix,
        accounts = credentials.len(),
        "credentials loaded from environment"
    );
    Ok(credentials)
}
