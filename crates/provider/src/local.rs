//! Offline converters at the end of every fallback chain
//!
//! The gateway never looks inside a local converter: it hands over the
//! request and returns whatever artifact comes back.

use crate::{Artifact, BoxFuture, ConversionRequest, Tool};

/// Errors raised by local converters.
#[derive(Debug, thiserror::Error)]
pub enum LocalError {
    #[error("no local converter registered for {0}")]
    Missing(Tool),

    #[error("local conversion failed: {0}")]
    Failed(String),

    #[error("local converter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A deterministic, quota-free conversion function.
pub trait LocalConverter: Send + Sync {
    /// Name for logs (e.g. "soffice", "in-process")
    fn name(&self) -> &str;

    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<Artifact, LocalError>>;
}

/// Adapter turning a synchronous closure into a `LocalConverter`.
///
/// Suited to in-process converters that finish quickly; anything slow should
/// implement the trait directly and offload work.
pub struct FnConverter<F> {
    name: String,
    convert: F,
}

impl<F> FnConverter<F>
where
    F: Fn(&ConversionRequest) -> Result<Artifact, LocalError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, convert: F) -> Self {
        Self {
            name: name.into(),
            convert,
        }
    }
}

impl<F> LocalConverter for FnConverter<F>
where
    F: Fn(&ConversionRequest) -> Result<Artifact, LocalError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<Artifact, LocalError>> {
        let result = (self.convert)(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_converter_passes_request_through() {
        let converter = FnConverter::new("upper", |req: &ConversionRequest| {
            let upper: Vec<u8> = req.input.bytes.iter().map(u8::to_ascii_uppercase).collect();
            Ok(Artifact::new(upper, "text/plain"))
        });
        let request = ConversionRequest::new(
            Tool::GrammarCheck,
            Artifact::new(b"hello".to_vec(), "text/plain"),
        );

        let out = converter.convert(&request).await.unwrap();
        assert_eq!(out.bytes.as_ref(), b"HELLO");
        assert_eq!(converter.name(), "upper");
    }

    #[tokio::test]
    async fn fn_converter_surfaces_errors() {
        let converter = FnConverter::new("broken", |_req: &ConversionRequest| {
            Err(LocalError::Failed("corrupt input".into()))
        });
        let request =
            ConversionRequest::new(Tool::MergePdf, Artifact::new(Vec::new(), "application/pdf"));

        let err = converter.convert(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "local conversion failed: corrupt input");
    }
}
