//! Generic REST job client
//!
//! Speaks the asset/operation/poll/download protocol most document APIs
//! share:
//!
//! 1. `POST {base}/assets {mediaType}` → asset slot, then `PUT uploadUri` with the bytes
//! 2. `POST {base}/operation/{op} {assetId, targetFormat}` → poll locator
//! 3. `GET {locator}` → status
//! 4. `GET downloadUri` → result bytes
//!
//! Authorization headers are only sent to URLs on the same origin (scheme,
//! host, port) as `base_url`; pre-signed storage URLs returned by the provider
//! reject unexpected auth headers.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use tracing::debug;

use crate::wire::{self, AssetSlot, Polled, Started, Uploaded};
use crate::{Artifact, BoxFuture, JobApi, ProviderError, RequestAuth, Result, Step, Tool};

/// Static description of one REST provider.
#[derive(Debug, Clone)]
pub struct RestSettings {
    pub id: String,
    pub base_url: String,
    /// Header that carries the credential's public id (e.g. "x-api-key")
    pub api_key_header: Option<String>,
    /// Remote operation name per tool
    pub operations: HashMap<Tool, String>,
    /// Per-request timeout
    pub timeout: Duration,
}

/// `JobApi` implementation over the generic REST protocol.
pub struct RestJobApi {
    settings: RestSettings,
    client: reqwest::Client,
}

impl RestJobApi {
    pub fn new(settings: RestSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn base(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    fn is_own_origin(&self, uri: &str) -> bool {
        let (Ok(base), Ok(target)) = (Url::parse(self.base()), Url::parse(uri)) else {
            return false;
        };
        base.scheme() == target.scheme()
            && base.host_str() == target.host_str()
            && base.port_or_known_default() == target.port_or_known_default()
    }

    /// Attach credentials only when `uri` is on the provider's own origin.
    fn authorize_for(
        &self,
        uri: &str,
        builder: reqwest::RequestBuilder,
        auth: RequestAuth<'_>,
    ) -> reqwest::RequestBuilder {
        if self.is_own_origin(uri) {
            self.authorize(builder, auth)
        } else {
            debug!(provider = %self.settings.id, "foreign origin, sending without credentials");
            builder
        }
    }

    fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        auth: RequestAuth<'_>,
    ) -> reqwest::RequestBuilder {
        let builder = builder.bearer_auth(auth.bearer);
        match &self.settings.api_key_header {
            Some(header) => builder.header(header.as_str(), auth.public_id),
            None => builder,
        }
    }

    /// Send a request; non-2xx responses become `ProviderError::Http` with the body kept
    /// for quota classification.
    async fn send(&self, step: Step, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                step,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(ProviderError::Http {
                step,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn read_body(step: Step, response: reqwest::Response) -> Result<bytes::Bytes> {
        response.bytes().await.map_err(|e| ProviderError::Network {
            step,
            reason: format!("reading response body: {e}"),
        })
    }

    async fn register(&self, auth: RequestAuth<'_>, media_type: &str) -> Result<AssetSlot> {
        let url = format!("{}/assets", self.base());
        let request = self
            .authorize(self.client.post(&url), auth)
            .json(&serde_json::json!({ "mediaType": media_type }));
        let response = self.send(Step::Register, request).await?;
        let body = Self::read_body(Step::Register, response).await?;
        let mut slot = wire::parse_asset_slot(&body).map_err(|reason| ProviderError::Protocol {
            step: Step::Register,
            reason,
        })?;
        slot.upload_uri = wire::resolve_uri(self.base(), &slot.upload_uri);
        Ok(slot)
    }
}

impl JobApi for RestJobApi {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn supports(&self, tool: Tool) -> bool {
        self.settings.operations.contains_key(&tool)
    }

    fn upload<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        input: &'a Artifact,
    ) -> BoxFuture<'a, Result<Uploaded>> {
        Box::pin(async move {
            let slot = self.register(auth, &input.media_type).await?;
            debug!(provider = %self.settings.id, asset_id = %slot.asset_id, bytes = input.len(), "asset registered, uploading");

            let request = self
                .client
                .put(&slot.upload_uri)
                .header(CONTENT_TYPE, input.media_type.as_str())
                .body(input.bytes.clone());
            let request = self.authorize_for(&slot.upload_uri, request, auth);
            self.send(Step::Upload, request).await?;

            Ok(Uploaded {
                asset_id: slot.asset_id,
            })
        })
    }

    fn start<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        tool: Tool,
        uploaded: &'a Uploaded,
        target_format: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Started>> {
        Box::pin(async move {
            let operation = self
                .settings
                .operations
                .get(&tool)
                .ok_or(ProviderError::Unsupported(tool))?;
            let url = format!("{}/operation/{operation}", self.base());

            let mut payload = serde_json::json!({ "assetId": uploaded.asset_id });
            if let Some(format) = target_format {
                payload["targetFormat"] = serde_json::Value::String(format.to_string());
            }

            let request = self.authorize(self.client.post(&url), auth).json(&payload);
            let response = self.send(Step::Start, request).await?;
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = Self::read_body(Step::Start, response).await?;

            wire::parse_started(location.as_deref(), &body, self.base()).map_err(|reason| {
                ProviderError::Protocol {
                    step: Step::Start,
                    reason,
                }
            })
        })
    }

    fn poll<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        started: &'a Started,
    ) -> BoxFuture<'a, Result<Polled>> {
        Box::pin(async move {
            let request =
                self.authorize_for(&started.locator, self.client.get(&started.locator), auth);
            let response = self.send(Step::Poll, request).await?;
            let body = Self::read_body(Step::Poll, response).await?;
            wire::parse_polled(&body).map_err(|reason| ProviderError::Protocol {
                step: Step::Poll,
                reason,
            })
        })
    }

    fn download<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        uri: &'a str,
    ) -> BoxFuture<'a, Result<Artifact>> {
        Box::pin(async move {
            let uri = wire::resolve_uri(self.base(), uri);
            let request = self.authorize_for(&uri, self.client.get(&uri), auth);
            let response = self.send(Step::Download, request).await?;
            let media_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = Self::read_body(Step::Download, response).await?;
            Ok(Artifact::new(bytes, media_type))
        })
    }
}
