//! Typed step results and their boundary parsers
//!
//! Provider APIs return loosely-typed JSON. Each response is parsed exactly
//! once here into a small typed result; the orchestrator works only with
//! these types.
//!
//! Wire shapes:
//! - `POST /assets` → `{"assetId": "...", "uploadUri": "..."}`
//! - `POST /operation/{op}` → `Location` header, or `{"jobId": "..."}`
//! - `GET {locator}` → `{"status": "queued|processing|done|failed", "asset": {"downloadUri": "..."}}`

use serde::Deserialize;

/// A registered remote asset slot, ready to receive bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSlot {
    pub asset_id: String,
    pub upload_uri: String,
}

/// Payload transferred; the asset can now be referenced by operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub asset_id: String,
}

/// Operation accepted; `locator` is the absolute URL to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub locator: String,
}

/// Remote job status as reported by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl RemoteStatus {
    /// Parse a provider status string. Providers disagree on spelling
    /// ("in progress", "succeeded", ...), so a few synonyms are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" | "waiting" | "created" => Some(RemoteStatus::Queued),
            "processing" | "in progress" | "in_progress" | "running" => {
                Some(RemoteStatus::Processing)
            }
            "done" | "succeeded" | "success" | "completed" | "finished" => Some(RemoteStatus::Done),
            "failed" | "error" | "cancelled" => Some(RemoteStatus::Failed),
            _ => None,
        }
    }
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled {
    pub status: RemoteStatus,
    pub download_uri: Option<String>,
    /// Provider-supplied failure text, if any
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetBody {
    asset_id: String,
    upload_uri: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    job_id: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollBody {
    status: String,
    asset: Option<PollAsset>,
    download_uri: Option<String>,
    error: Option<serde_json::Value>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollAsset {
    download_uri: Option<String>,
}

/// Parse the asset registration response.
pub fn parse_asset_slot(body: &[u8]) -> Result<AssetSlot, String> {
    let parsed: AssetBody =
        serde_json::from_slice(body).map_err(|e| format!("invalid asset response: {e}"))?;
    if parsed.upload_uri.is_empty() {
        return Err("asset response has an empty uploadUri".into());
    }
    Ok(AssetSlot {
        asset_id: parsed.asset_id,
        upload_uri: parsed.upload_uri,
    })
}

/// Parse the job-start response into an absolute poll locator.
///
/// The `Location` header wins. Otherwise the body must carry `jobId` (polled at
/// `{base_url}/jobs/{jobId}`) or `location`.
pub fn parse_started(
    location_header: Option<&str>,
    body: &[u8],
    base_url: &str,
) -> Result<Started, String> {
    if let Some(location) = location_header
        && !location.trim().is_empty()
    {
        return Ok(Started {
            locator: resolve_uri(base_url, location.trim()),
        });
    }

    let parsed: StartBody = serde_json::from_slice(body)
        .map_err(|e| format!("start response has no Location header and invalid body: {e}"))?;

    if let Some(location) = parsed.location.filter(|l| !l.is_empty()) {
        return Ok(Started {
            locator: resolve_uri(base_url, &location),
        });
    }
    match parsed.job_id.filter(|id| !id.is_empty()) {
        Some(job_id) => Ok(Started {
            locator: format!("{}/jobs/{job_id}", base_url.trim_end_matches('/')),
        }),
        None => Err("start response carries neither Location header nor jobId".into()),
    }
}

/// Parse a status poll response.
pub fn parse_polled(body: &[u8]) -> Result<Polled, String> {
    let parsed: PollBody =
        serde_json::from_slice(body).map_err(|e| format!("invalid status response: {e}"))?;

    let status = RemoteStatus::parse(&parsed.status)
        .ok_or_else(|| format!("unknown job status {:?}", parsed.status))?;

    let download_uri = parsed
        .asset
        .and_then(|a| a.download_uri)
        .or(parsed.download_uri)
        .filter(|uri| !uri.is_empty());

    let message = parsed
        .error
        .as_ref()
        .and_then(message_from_value)
        .or(parsed.message);

    Ok(Polled {
        status,
        download_uri,
        message,
    })
}

/// Extract the human-readable error text from a provider error body.
///
/// Understands `{"error": {"message": ...}}`, `{"error": "..."}`,
/// `{"message": ...}` and `{"detail": ...}`. Non-JSON bodies are returned
/// trimmed as-is; empty bodies yield `None`.
pub fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => message_from_value(&value),
        Err(_) => Some(trimmed.to_string()),
    }
}

fn message_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => {
            for key in ["error", "message", "detail", "title", "reason"] {
                if let Some(inner) = map.get(key)
                    && let Some(text) = message_from_value(inner)
                {
                    return Some(text);
                }
            }
            None
        }
        _ => None,
    }
}

/// Resolve a possibly relative URI against the provider base URL.
pub fn resolve_uri(base_url: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            uri.trim_start_matches('/')
        )
    }
}
