//! Self-signed HS256 bearer tokens
//!
//! Some providers accept a JWT signed locally with the account secret instead
//! of running a token exchange. Claims: `iss`, `sub` (the public id), `iat`,
//! `nbf` and `exp`, all times in unix seconds.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::constants::HS256_HEADER;
use crate::credentials::Credential;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    iat: u64,
    nbf: u64,
    exp: u64,
}

/// Sign a compact HS256 token for the credential.
///
/// An empty `issuer` falls back to the credential's public id.
pub fn sign_hs256(
    issuer: &str,
    credential: &Credential,
    issued_at_secs: u64,
    ttl: Duration,
) -> Result<String> {
    let issuer = if issuer.trim().is_empty() {
        credential.public_id.as_str()
    } else {
        issuer
    };
    let claims = Claims {
        iss: issuer,
        sub: &credential.public_id,
        iat: issued_at_secs,
        nbf: issued_at_secs,
        exp: issued_at_secs.saturating_add(ttl.as_secs()),
    };
    let payload = serde_json::to_vec(&claims).map_err(|e| Error::Signing(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HS256_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let mut mac = HmacSha256::new_from_slice(credential.secret.expose_str().as_bytes())
        .map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}
