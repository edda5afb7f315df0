//! Asynchronous job pipeline for one provider
//!
//! Drives upload → start → poll → download through the job state machine,
//! with credential rotation on quota-class failures. Each pipeline request
//! first takes a rate-limiter slot when the provider has one. Every wait
//! (limiter, poll interval, the request itself) is raced against the
//! caller's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docgate_auth::{Credential, TokenBroker};
use docgate_pool::{CredentialPool, QuotaPolicy, RateLimiter};
use provider::{
    Artifact, ConversionRequest, ErrorClassification, JobApi, ProviderError, RemoteStatus,
    RequestAuth, Started, Tool, Uploaded,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{GatewayError, Result};
use crate::job::{Job, JobAction, JobEvent, JobState};

/// Poll cadence and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

/// How one credential's attempt ended, when it did not produce a result.
#[derive(Debug)]
enum Failure {
    /// Allowance used up: mark failed, rotate
    Quota(String),
    /// Token rejected: invalidate, mark failed, rotate once
    Auth(String),
    /// Anything else: this provider is done
    Fatal(GatewayError),
}

enum Interrupt {
    Cancelled,
    Failed(ProviderError),
}

pub struct JobOrchestrator {
    api: Arc<dyn JobApi>,
    pool: Arc<CredentialPool>,
    broker: Arc<TokenBroker>,
    limiter: Option<Arc<RateLimiter>>,
    quota: QuotaPolicy,
    poll: PollSettings,
}

impl JobOrchestrator {
    pub fn new(api: Arc<dyn JobApi>, pool: Arc<CredentialPool>, broker: Arc<TokenBroker>) -> Self {
        Self {
            api,
            pool,
            broker,
            limiter: None,
            quota: QuotaPolicy::default(),
            poll: PollSettings::default(),
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_quota_policy(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.api.id()
    }

    pub fn supports(&self, tool: Tool) -> bool {
        self.api.supports(tool)
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn broker(&self) -> &Arc<TokenBroker> {
        &self.broker
    }

    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Run the conversion on this provider, rotating credentials on quota
    /// exhaustion. At most one attempt per credential in the pool.
    #[instrument(skip_all, fields(provider = %self.provider_id(), tool = %request.tool))]
    pub async fn run(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<Artifact> {
        let provider = self.provider_id().to_string();
        if !self.api.supports(request.tool) {
            return Err(GatewayError::Unsupported {
                provider,
                tool: request.tool,
            });
        }

        let max_attempts = self.pool.len().await.max(1);
        let mut auth_rejected = false;
        // Reason of the latest failure when it was an auth rejection
        let mut last_auth: Option<String> = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(GatewayError::JobTimedOut {
                    provider,
                    attempts: 0,
                });
            }
            let credential = match self.pool.next().await {
                Ok(credential) => credential,
                Err(e) => {
                    return Err(match last_auth {
                        Some(reason) => GatewayError::AuthFailure { provider, reason },
                        None => GatewayError::from_pool(e, attempt - 1),
                    });
                }
            };
            debug!(attempt, credential = %credential.label, "attempt starting");

            match self.attempt(request, &credential, cancel).await {
                Ok(artifact) => {
                    self.record_outcome("completed");
                    return Ok(artifact);
                }
                Err(Failure::Quota(reason)) => {
                    warn!(
                        attempt,
                        credential = %credential.label,
                        reason = %reason,
                        "quota exhausted, rotating credential"
                    );
                    self.record_outcome("quota");
                    self.mark_failed(&credential).await;
                    last_auth = None;
                }
                Err(Failure::Auth(reason)) => {
                    self.record_outcome("auth");
                    self.broker.invalidate(credential.id()).await;
                    self.mark_failed(&credential).await;
                    if auth_rejected {
                        return Err(GatewayError::AuthFailure { provider, reason });
                    }
                    warn!(
                        attempt,
                        credential = %credential.label,
                        reason = %reason,
                        "credentials rejected, retrying once on next credential"
                    );
                    auth_rejected = true;
                    last_auth = Some(reason);
                }
                Err(Failure::Fatal(err)) => {
                    self.record_outcome(err.outcome());
                    return Err(err);
                }
            }
        }

        Err(match last_auth {
            Some(reason) => GatewayError::AuthFailure { provider, reason },
            None => GatewayError::QuotaExceeded {
                provider,
                attempts: max_attempts,
            },
        })
    }

    /// One full pipeline run with one credential.
    async fn attempt(
        &self,
        request: &ConversionRequest,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> std::result::Result<Artifact, Failure> {
        let token = self
            .broker
            .get_token(credential)
            .await
            .map_err(|e| self.token_failure(e))?;
        let auth = RequestAuth {
            bearer: token.value.expose_str(),
            public_id: &credential.public_id,
        };

        let mut job = Job::new(self.provider_id(), request.tool, self.poll.max_attempts);
        let mut action = job.apply(JobEvent::Submitted);
        debug!(job_id = %job.id, "job created");

        loop {
            let outcome = match action {
                JobAction::Upload => self
                    .step(cancel, self.api.upload(auth, &request.input))
                    .await
                    .map(JobEvent::Uploaded),
                JobAction::Start { asset_id } => {
                    let uploaded = Uploaded { asset_id };
                    let format = request.output_format.as_deref();
                    self.step(cancel, self.api.start(auth, request.tool, &uploaded, format))
                        .await
                        .map(JobEvent::Started)
                }
                JobAction::Poll { locator } => {
                    let started = Started { locator };
                    let wait = tokio::time::sleep(self.poll.interval);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
                        _ = wait => self.step(cancel, self.api.poll(auth, &started))
                            .await
                            .map(JobEvent::Polled),
                    }
                }
                JobAction::Download { uri } => {
                    match self.step(cancel, self.api.download(auth, &uri)).await {
                        Ok(artifact) => {
                            job.apply(JobEvent::Downloaded);
                            info!(
                                job_id = %job.id,
                                credential = %credential.label,
                                bytes = artifact.len(),
                                "job completed"
                            );
                            return Ok(artifact);
                        }
                        Err(interrupt) => Err(interrupt),
                    }
                }
                JobAction::Finish | JobAction::None => break,
            };

            let event = match outcome {
                Ok(event) => event,
                Err(Interrupt::Cancelled) => JobEvent::Cancelled,
                Err(Interrupt::Failed(err)) => match self.quota.classify(&err) {
                    ErrorClassification::QuotaExceeded => return Err(Failure::Quota(err.to_string())),
                    ErrorClassification::AuthRejected => return Err(Failure::Auth(err.to_string())),
                    ErrorClassification::Fatal => {
                        if let ProviderError::Network { .. } = err {
                            return Err(Failure::Fatal(GatewayError::TransientNetwork {
                                provider: job.provider.clone(),
                                reason: err.to_string(),
                            }));
                        }
                        JobEvent::StepFailed {
                            reason: err.to_string(),
                        }
                    }
                },
            };

            if let JobEvent::Polled(polled) = &event
                && polled.status == RemoteStatus::Failed
                && let Some(message) = &polled.message
                && self.quota.is_quota_message(message)
            {
                return Err(Failure::Quota(message.clone()));
            }

            action = job.apply(event);
            debug!(job_id = %job.id, state = job.state.label(), "job transition");
        }

        Err(Failure::Fatal(match job.state {
            JobState::TimedOut { attempts } => GatewayError::JobTimedOut {
                provider: job.provider,
                attempts,
            },
            JobState::Failed { reason } => GatewayError::JobFailed {
                provider: job.provider,
                reason,
            },
            other => GatewayError::JobFailed {
                provider: job.provider,
                reason: format!("job stopped in state {}", other.label()),
            },
        }))
    }

    /// Take a limiter slot, then run one request. Both race the cancel token.
    async fn step<T>(
        &self,
        cancel: &CancellationToken,
        request: impl Future<Output = provider::Result<T>>,
    ) -> std::result::Result<T, Interrupt> {
        let throttled = async {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            request.await
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            result = throttled => result.map_err(Interrupt::Failed),
        }
    }

    fn token_failure(&self, error: docgate_auth::Error) -> Failure {
        if let Some(status) = error.status() {
            let body = error.body().unwrap_or_default();
            match self.quota.classify_status(status, body) {
                ErrorClassification::QuotaExceeded => return Failure::Quota(error.to_string()),
                ErrorClassification::AuthRejected => return Failure::Auth(error.to_string()),
                ErrorClassification::Fatal => {}
            }
        }
        match error {
            docgate_auth::Error::InvalidCredentials(reason) => Failure::Auth(reason),
            docgate_auth::Error::Http(reason) => Failure::Fatal(GatewayError::TransientNetwork {
                provider: self.provider_id().to_string(),
                reason,
            }),
            other => Failure::Fatal(GatewayError::AuthFailure {
                provider: self.provider_id().to_string(),
                reason: other.to_string(),
            }),
        }
    }

    async fn mark_failed(&self, credential: &Credential) {
        if let Err(e) = self.pool.mark_failed(credential.id()).await {
            // Credential list was replaced by a reload mid-flight
            debug!(error = %e, "could not mark credential failed");
        }
    }

    fn record_outcome(&self, outcome: &'static str) {
        metrics::counter!(
            "docgate_jobs_total",
            "provider" => self.provider_id().to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}
