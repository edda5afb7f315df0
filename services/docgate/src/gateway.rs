//! Assembles the conversion gateway from configuration
//!
//! One `JobOrchestrator` per `[[providers]]` entry, one chain and optional
//! `CommandConverter` per `[tools.<tool>]` section.

use std::collections::HashMap;
use std::sync::Arc;

use docgate_auth::{Credential, TokenBroker};
use docgate_core::{FallbackRouter, JobOrchestrator};
use docgate_pool::{CredentialPool, RateLimiter};
use provider::{RestJobApi, Tool};
use tracing::{info, warn};

use crate::config::Config;
use crate::local::CommandConverter;

pub struct Gateway {
    pub router: FallbackRouter,
    pub pools: Vec<Arc<CredentialPool>>,
    /// Output format used when a request does not name one
    pub target_formats: HashMap<Tool, String>,
}

impl Gateway {
    pub fn default_format(&self, tool: Tool) -> Option<&str> {
        self.target_formats.get(&tool).map(String::as_str)
    }
}

/// Build every provider and tool chain. Providers without credentials are
/// kept (unconfigured) so a later reload can bring them online.
pub fn build(
    config: &Config,
    mut credentials: HashMap<String, Vec<Credential>>,
    client: reqwest::Client,
) -> common::Result<Gateway> {
    let mut router = FallbackRouter::new();
    let mut pools = Vec::with_capacity(config.providers.len());

    for provider in &config.providers {
        let accounts = credentials.remove(&provider.id).unwrap_or_default();
        if accounts.is_empty() {
            warn!(provider = %provider.id, prefix = %provider.env_prefix, "no credentials found, provider unconfigured");
        } else {
            info!(provider = %provider.id, credentials = accounts.len(), "provider credentials loaded");
        }

        let pool = Arc::new(CredentialPool::new(
            provider.id.clone(),
            accounts,
            config.gateway.cooldown(),
        ));
        let broker = Arc::new(
            TokenBroker::new(provider.id.clone(), provider.auth_scheme(), client.clone())
                .with_safety_margin(config.gateway.token_safety_margin()),
        );
        let api = Arc::new(RestJobApi::new(provider.rest_settings()?, client.clone()));

        let mut orchestrator = JobOrchestrator::new(api, pool.clone(), broker)
            .with_quota_policy(provider.quota_policy())
            .with_poll_settings(config.gateway.poll_settings());
        if let Some(params) = provider.rate_limit_params() {
            orchestrator =
                orchestrator.with_limiter(Arc::new(RateLimiter::new(provider.id.clone(), params)));
        }

        router = router.with_provider(Arc::new(orchestrator));
        pools.push(pool);
    }

    let mut target_formats = HashMap::new();
    for (tool, section) in config.tools()? {
        router = router.with_chain(tool, section.chain.clone());
        if let Some(format) = &section.target_format {
            target_formats.insert(tool, format.clone());
        }
        if let Some(argv) = &section.local_command {
            let converter = CommandConverter::new(argv.clone(), section.target_format.clone());
            router = router.with_local(tool, Arc::new(converter));
        }
    }

    Ok(Gateway {
        router,
        pools,
        target_formats,
    })
}
