//! Per-tool fallback across providers, ending at a local converter
//!
//! For each tool the router walks its provider chain in priority order.
//! Unconfigured providers are skipped; any other provider error is logged
//! and the router moves on. The local converter, when registered, is always
//! the last option and its result is returned unchanged.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use docgate_auth::Credential;
use docgate_pool::{LimiterStatus, PoolHealth, PoolStatus};
use provider::{Artifact, ConversionRequest, LocalConverter, LocalError, Tool};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{GatewayError, Result};
use crate::orchestrator::JobOrchestrator;

/// Read-only view of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub pool: PoolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<LimiterStatus>,
    pub cached_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    /// healthy | degraded
    pub status: &'static str,
    pub providers: Vec<PoolHealth>,
    pub local_tools: Vec<Tool>,
}

impl GatewayHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Default)]
pub struct FallbackRouter {
    providers: BTreeMap<String, Arc<JobOrchestrator>>,
    chains: HashMap<Tool, Vec<String>>,
    local: HashMap<Tool, Arc<dyn LocalConverter>>,
}

impl FallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, orchestrator: Arc<JobOrchestrator>) -> Self {
        self.providers
            .insert(orchestrator.provider_id().to_string(), orchestrator);
        self
    }

    /// Set the provider priority order for a tool.
    pub fn with_chain(mut self, tool: Tool, providers: Vec<String>) -> Self {
        self.chains.insert(tool, providers);
        self
    }

    pub fn with_local(mut self, tool: Tool, converter: Arc<dyn LocalConverter>) -> Self {
        self.local.insert(tool, converter);
        self
    }

    pub fn chain(&self, tool: Tool) -> &[String] {
        self.chains.get(&tool).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_local(&self, tool: Tool) -> bool {
        self.local.contains_key(&tool)
    }

    pub async fn convert(&self, request: &ConversionRequest) -> Result<Artifact> {
        self.convert_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Convert with a cancellation signal. A cancelled request returns
    /// `JobTimedOut` straight away and never reaches later providers or the
    /// local converter.
    #[instrument(skip_all, fields(tool = %request.tool))]
    pub async fn convert_with_cancel(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        let tool = request.tool;
        let mut attempts = 0usize;
        let mut last: Option<GatewayError> = None;

        for provider_id in self.chain(tool) {
            let Some(orchestrator) = self.providers.get(provider_id) else {
                warn!(provider = %provider_id, "chain names unknown provider, skipping");
                continue;
            };
            if !orchestrator.pool().is_configured().await {
                debug!(provider = %provider_id, "provider unconfigured, skipping");
                last.get_or_insert(GatewayError::Unconfigured {
                    provider: provider_id.clone(),
                });
                continue;
            }
            if !orchestrator.supports(tool) {
                debug!(provider = %provider_id, "provider lacks tool, skipping");
                continue;
            }

            attempts += 1;
            match orchestrator.run(request, cancel).await {
                Ok(artifact) => {
                    info!(provider = %provider_id, attempts, "conversion served by provider");
                    return Ok(artifact);
                }
                Err(err) if cancel.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(
                        provider = %provider_id,
                        error = %err,
                        kind = err.kind(),
                        "provider failed, falling back"
                    );
                    metrics::counter!(
                        "docgate_fallbacks_total",
                        "tool" => tool.as_str(),
                        "provider" => provider_id.clone()
                    )
                    .increment(1);
                    last = Some(err);
                }
            }
        }

        let Some(converter) = self.local.get(&tool) else {
            let source: Box<dyn std::error::Error + Send + Sync> = match last {
                Some(err) => Box::new(err),
                None => Box::new(LocalError::Missing(tool)),
            };
            return Err(GatewayError::AllProvidersExhausted {
                tool,
                attempts,
                source,
            });
        };

        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GatewayError::JobTimedOut {
                    provider: converter.name().to_string(),
                    attempts: 0,
                });
            }
            result = converter.convert(request) => result,
        };
        match result {
            Ok(artifact) => {
                info!(converter = converter.name(), attempts, "conversion served locally");
                Ok(artifact)
            }
            Err(err) => {
                warn!(converter = converter.name(), error = %err, "local converter failed");
                Err(GatewayError::AllProvidersExhausted {
                    tool,
                    attempts,
                    source: Box::new(err),
                })
            }
        }
    }

    /// Per-provider pool counts, limiter usage and token cache size.
    pub async fn status(&self) -> Vec<ProviderStatus> {
        let mut out = Vec::with_capacity(self.providers.len());
        for (id, orchestrator) in &self.providers {
            let rate_limit = match orchestrator.limiter() {
                Some(limiter) => Some(limiter.status().await),
                None => None,
            };
            out.push(ProviderStatus {
                provider: id.clone(),
                pool: orchestrator.pool().status().await,
                rate_limit,
                cached_tokens: orchestrator.broker().cached().await,
            });
        }
        out
    }

    /// Healthy when any provider has a usable credential or every tool has
    /// a local converter.
    pub async fn health(&self) -> GatewayHealth {
        let mut providers = Vec::with_capacity(self.providers.len());
        for orchestrator in self.providers.values() {
            providers.push(orchestrator.pool().health().await);
        }
        let mut local_tools: Vec<Tool> = self.local.keys().copied().collect();
        local_tools.sort();

        let any_active = providers.iter().any(|p| p.active > 0);
        let all_local = Tool::ALL.iter().all(|t| self.local.contains_key(t));
        GatewayHealth {
            status: if any_active || all_local {
                "healthy"
            } else {
                "degraded"
            },
            providers,
            local_tools,
        }
    }

    /// Push freshly loaded credentials into every pool and drop cached
    /// tokens. Providers missing from `credentials` end up unconfigured.
    pub async fn reload(&self, mut credentials: HashMap<String, Vec<Credential>>) {
        for (id, orchestrator) in &self.providers {
            let fresh = credentials.remove(id).unwrap_or_default();
            orchestrator.pool().reload(fresh).await;
            orchestrator.broker().clear().await;
        }
        for id in credentials.keys() {
            warn!(provider = %id, "credentials loaded for unknown provider, ignoring");
        }
        info!(providers = self.providers.len(), "gateway credentials reloaded");
    }
}
