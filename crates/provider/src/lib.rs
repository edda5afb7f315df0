//! Provider abstraction for third-party conversion APIs
//!
//! Defines the `JobApi` trait that decouples the job orchestrator from each
//! SaaS provider's wire protocol, and the `LocalConverter` trait for the
//! offline converters at the end of every fallback chain. Provider responses
//! are parsed once into the typed step results in [`wire`]; nothing above
//! this crate looks at raw JSON again.

pub mod local;
pub mod rest;
pub mod wire;

pub use local::{FnConverter, LocalConverter, LocalError};
pub use rest::{RestJobApi, RestSettings};
pub use wire::{AssetSlot, Polled, RemoteStatus, Started, Uploaded};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Boxed future used by the dyn-compatible traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A user-facing tool. Each tool maps to one remote operation per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    PdfToWord,
    WordToPdf,
    ImageToPdf,
    MergePdf,
    CompressPdf,
    GrammarCheck,
    PlagiarismScan,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::PdfToWord,
        Tool::WordToPdf,
        Tool::ImageToPdf,
        Tool::MergePdf,
        Tool::CompressPdf,
        Tool::GrammarCheck,
        Tool::PlagiarismScan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::PdfToWord => "pdf-to-word",
            Tool::WordToPdf => "word-to-pdf",
            Tool::ImageToPdf => "image-to-pdf",
            Tool::MergePdf => "merge-pdf",
            Tool::CompressPdf => "compress-pdf",
            Tool::GrammarCheck => "grammar-check",
            Tool::PlagiarismScan => "plagiarism-scan",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        Tool::ALL
            .into_iter()
            .find(|tool| tool.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProviderError::UnknownTool(s.to_string()))
    }
}

/// Opaque binary payload: the input document or the converted result.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Bytes,
    pub media_type: String,
    pub file_name: Option<String>,
}

impl Artifact {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The caller-facing unit of work.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub tool: Tool,
    pub input: Artifact,
    /// Target format hint, e.g. "docx". Providers fall back to their own default.
    pub output_format: Option<String>,
}

impl ConversionRequest {
    pub fn new(tool: Tool, input: Artifact) -> Self {
        Self {
            tool,
            input,
            output_format: None,
        }
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }
}

/// Classification of provider errors to determine rotation strategy.
///
/// - QuotaExceeded marks the credential failed and restarts the job on the next one
/// - AuthRejected invalidates the token; the credential gets one rotation
/// - Fatal ends this provider's attempt; the router moves on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    QuotaExceeded,
    AuthRejected,
    Fatal,
}

/// Pipeline step that produced an error, for logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Register,
    Upload,
    Start,
    Poll,
    Download,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Register => "asset registration",
            Step::Upload => "upload",
            Step::Start => "job start",
            Step::Poll => "status poll",
            Step::Download => "download",
        };
        f.write_str(name)
    }
}

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{step} returned HTTP {status}: {body}")]
    Http { step: Step, status: u16, body: String },

    #[error("{step} request failed: {reason}")]
    Network { step: Step, reason: String },

    #[error("{step} response malformed: {reason}")]
    Protocol { step: Step, reason: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("provider has no operation for {0}")]
    Unsupported(Tool),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Authentication material attached to every pipeline request.
#[derive(Debug, Clone, Copy)]
pub struct RequestAuth<'a> {
    /// Bearer token from the token broker
    pub bearer: &'a str,
    /// Public identifier of the credential (some providers want it as an API key header)
    pub public_id: &'a str,
}

/// One provider's asynchronous job protocol.
///
/// The orchestrator drives the steps in order and owns all retry, rotation
/// and polling decisions; implementations only perform the single request
/// (or request pair, for upload) each step describes.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn JobApi>`).
pub trait JobApi: Send + Sync {
    /// Identifier for logging and status reporting (e.g. "adobe", "convertapi")
    fn id(&self) -> &str;

    /// Whether this provider has an operation for the tool.
    fn supports(&self, tool: Tool) -> bool;

    /// Register a remote asset (if the provider needs it) and transfer the bytes.
    fn upload<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        input: &'a Artifact,
    ) -> BoxFuture<'a, Result<Uploaded>>;

    /// Submit the operation for an uploaded asset.
    fn start<'a>(
        &'a self,
        auth: RequestAuth<'a>,
        tool: Tool,
        uploaded: &'a Uploaded,
        target_format: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Started>>;

    /// Query the job status once.
    fn poll<'a>(&'a self, auth: RequestAuth<'a>, started: &'a Started)
    -> BoxFuture<'a, Result<Polled>>;

    /// Fetch the finished result.
    fn download<'a>(&'a self, auth: RequestAuth<'a>, uri: &'a str)
    -> BoxFuture<'a, Result<Artifact>>;
}
