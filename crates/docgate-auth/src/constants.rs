//! Token defaults
//!
//! Values shared by the token broker and the self-signed token builder.
//! Providers can override the lifetimes through configuration.

use std::time::Duration;

/// Cached tokens are refreshed once they are this close to expiry.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime of self-signed bearer tokens.
pub const SELF_SIGNED_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Longest lifetime a cached token is trusted for, whatever the issuer says.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Used when a token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// JOSE header for HMAC-SHA256 signed tokens.
pub const HS256_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Upper bound on indexed credential entries scanned per provider.
pub const MAX_INDEXED_ACCOUNTS: usize = 64;
