//! Client-credentials token exchange
//!
//! POSTs `grant_type=client_credentials` with the credential's id and secret
//! to the provider's token endpoint. The endpoint is per provider and comes
//! from configuration.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EXPIRES_IN_SECS;
use crate::credentials::Credential;
use crate::error::{Error, Result};

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The broker
/// converts it into an absolute instant when caching.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

/// Exchange a credential for a bearer token.
///
/// 401/403 map to `InvalidCredentials` so callers can tell a revoked key
/// apart from a throttled or broken endpoint. Every other non-success status
/// keeps its code and body in `TokenExchange`.
pub async fn exchange_client_credentials(
    client: &reqwest::Client,
    token_url: &str,
    credential: &Credential,
) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credential.public_id.as_str()),
            ("client_secret", credential.secret.expose_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "token endpoint rejected {} ({status}): {body}",
                credential.label
            )));
        }

        return Err(Error::TokenExchange {
            status: status.as_u16(),
            body,
        });
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(e.to_string()))?;

    if token.access_token.trim().is_empty() {
        return Err(Error::InvalidResponse("empty access_token".into()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Router, http::StatusCode, routing::post};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    fn credential() -> Credential {
        Credential::new("adobe", "client-1", "secret-1")
    }

    #[test]
    fn token_response_defaults_expiry() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.expires_in, DEFAULT_EXPIRES_IN_SECS);
    }

    #[tokio::test]
    async fn exchange_sends_client_credentials_form() {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "client_credentials");
                assert_eq!(form["client_id"], "client-1");
                assert_eq!(form["client_secret"], "secret-1");
                axum::Json(serde_json::json!({"access_token": "at_ok", "expires_in": 86399}))
            }),
        );
        let url = serve(app).await;

        let token = exchange_client_credentials(&reqwest::Client::new(), &url, &credential())
            .await
            .unwrap();
        assert_eq!(token.access_token, "at_ok");
        assert_eq!(token.expires_in, 86399);
    }

    #[tokio::test]
    async fn rejected_secret_is_invalid_credentials() {
        let app = Router::new().route(
            "/token",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid_client") }),
        );
        let url = serve(app).await;

        let err = exchange_client_credentials(&reqwest::Client::new(), &url, &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(ref msg) if msg.contains("invalid_client")));
    }

    #[tokio::test]
    async fn throttled_endpoint_keeps_status_and_body() {
        let app = Router::new().route(
            "/token",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let url = serve(app).await;

        let err = exchange_client_credentials(&reqwest::Client::new(), &url, &credential())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.body(), Some("slow down"));
    }

    #[tokio::test]
    async fn empty_access_token_is_invalid_response() {
        let app = Router::new().route(
            "/token",
            post(|| async { axum::Json(serde_json::json!({"access_token": ""})) }),
        );
        let url = serve(app).await;

        let err = exchange_client_credentials(&reqwest::Client::new(), &url, &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let err = exchange_client_credentials(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/token",
            &credential(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
