//! Per-provider token cache
//!
//! One `TokenBroker` per provider. Tokens are keyed by credential public id
//! and reused until they come within the safety margin of expiry. The cache
//! lock is never held across a network call, so a slow token endpoint does
//! not block callers holding other credentials.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::Secret;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::{DEFAULT_SAFETY_MARGIN, MAX_TOKEN_LIFETIME, SELF_SIGNED_TTL};
use crate::credentials::Credential;
use crate::error::Result;
use crate::{jwt, token};

/// How a provider turns a credential into a bearer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// OAuth2 client-credentials grant against `token_url`
    ClientCredentials { token_url: String },
    /// Locally signed HS256 token
    SelfSigned { issuer: Option<String>, ttl: Duration },
    /// The secret is sent as-is and never expires
    ApiKey,
}

impl AuthScheme {
    pub fn self_signed() -> Self {
        AuthScheme::SelfSigned {
            issuer: None,
            ttl: SELF_SIGNED_TTL,
        }
    }
}

/// A bearer value and its expiry. `None` never expires.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: Secret<String>,
    pub expires_at: Option<Instant>,
}

impl Token {
    /// Whether the token can still be used at `now` given the safety margin.
    pub fn is_fresh(&self, now: Instant, margin: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => now.checked_add(margin).is_some_and(|limit| limit < at),
        }
    }
}

pub struct TokenBroker {
    provider_id: String,
    scheme: AuthScheme,
    safety_margin: Duration,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Token>>,
}

impl TokenBroker {
    pub fn new(provider_id: impl Into<String>, scheme: AuthScheme, client: reqwest::Client) -> Self {
        Self {
            provider_id: provider_id.into(),
            scheme,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Return a usable token for the credential, minting one if needed.
    pub async fn get_token(&self, credential: &Credential) -> Result<Token> {
        if self.scheme == AuthScheme::ApiKey {
            return Ok(Token {
                value: credential.secret.clone(),
                expires_at: None,
            });
        }

        let now = Instant::now();
        {
            let cache = self.cache.lock().await;
            if let Some(token) = cache.get(credential.id())
                && token.is_fresh(now, self.safety_margin)
            {
                return Ok(token.clone());
            }
        }

        let token = self.mint(credential).await?;
        self.cache
            .lock()
            .await
            .insert(credential.id().to_owned(), token.clone());
        Ok(token)
    }

    async fn mint(&self, credential: &Credential) -> Result<Token> {
        match &self.scheme {
            AuthScheme::ClientCredentials { token_url } => {
                let response =
                    token::exchange_client_credentials(&self.client, token_url, credential)
                        .await?;
                info!(
                    provider = %self.provider_id,
                    credential = %credential.label,
                    expires_in = response.expires_in,
                    "token acquired"
                );
                Ok(Token {
                    value: Secret::new(response.access_token),
                    expires_at: Some(expiry_after(Duration::from_secs(response.expires_in))),
                })
            }
            AuthScheme::SelfSigned { issuer, ttl } => {
                let issued_at = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                let signed =
                    jwt::sign_hs256(issuer.as_deref().unwrap_or(""), credential, issued_at, *ttl)?;
                debug!(
                    provider = %self.provider_id,
                    credential = %credential.label,
                    "self-signed token minted"
                );
                Ok(Token {
                    value: Secret::new(signed),
                    expires_at: Some(expiry_after(*ttl)),
                })
            }
            AuthScheme::ApiKey => Ok(Token {
                value: credential.secret.clone(),
                expires_at: None,
            }),
        }
    }

    /// Drop the cached token for a credential. Returns whether one was cached.
    pub async fn invalidate(&self, credential_id: &str) -> bool {
        let removed = self.cache.lock().await.remove(credential_id).is_some();
        if removed {
            debug!(provider = %self.provider_id, credential = credential_id, "token invalidated");
        }
        removed
    }

    /// Drop every cached token.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Number of cached tokens.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Expiry instant for a lifetime reported by an issuer, capped at
/// [`MAX_TOKEN_LIFETIME`].
fn expiry_after(lifetime: Duration) -> Instant {
    Instant::now() + lifetime.min(MAX_TOKEN_LIFETIME)
}
