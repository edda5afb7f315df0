//! Credential state machine and round-robin selection
//!
//! The pool holds one provider's credentials in configuration order plus a
//! rotation cursor. Failed credentials are skipped until their cooldown has
//! elapsed. Expiry is lazy: a scan that finds an expired failure flips it
//! back to `Available` on the spot, without an explicit reset.

use std::time::Duration;

use docgate_auth::Credential;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Runtime state of one credential.
///
/// Transitions:
/// - Available → Failed (quota-class or auth failure)
/// - Failed → Available (cooldown elapsed, reset, or reload)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Available,
    Failed { at: Instant },
}

impl CredentialState {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Available => "available",
            CredentialState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug)]
struct Slot {
    credential: Credential,
    state: CredentialState,
}

impl Slot {
    fn new(credential: Credential) -> Self {
        Self {
            credential,
            state: CredentialState::Available,
        }
    }

    /// Whether the failure cooldown is over (strictly longer than `cooldown`).
    fn cooldown_elapsed(&self, now: Instant, cooldown: Duration) -> bool {
        match self.state {
            CredentialState::Available => true,
            CredentialState::Failed { at } => now.saturating_duration_since(at) > cooldown,
        }
    }
}

#[derive(Debug)]
struct Inner {
    slots: Vec<Slot>,
    next_index: usize,
}

/// Pool counts for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub provider: String,
    pub total: usize,
    pub active: usize,
    pub exhausted: usize,
}

/// Per-credential detail for the health view.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialHealth {
    pub label: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub provider: String,
    /// healthy | degraded | unhealthy | unconfigured
    pub status: &'static str,
    pub total: usize,
    pub active: usize,
    pub exhausted: usize,
    pub credentials: Vec<CredentialHealth>,
}

/// Ordered credentials for one provider with a rotation cursor.
pub struct CredentialPool {
    provider_id: String,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CredentialPool {
    pub fn new(provider_id: impl Into<String>, credentials: Vec<Credential>, cooldown: Duration) -> Self {
        let provider_id = provider_id.into();
        info!(
            provider = %provider_id,
            credentials = credentials.len(),
            cooldown_secs = cooldown.as_secs(),
            "credential pool initialized"
        );
        Self {
            provider_id,
            cooldown,
            inner: Mutex::new(Inner {
                slots: credentials.into_iter().map(Slot::new).collect(),
                next_index: 0,
            }),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Select the next usable credential.
    ///
    /// Scans at most `len()` candidates starting at the cursor, wrapping. The
    /// cursor moves one past the returned credential, so consecutive calls
    /// rotate round-robin over the eligible set.
    pub async fn next(&self) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        let n = inner.slots.len();
        if n == 0 {
            return Err(Error::Unconfigured {
                provider: self.provider_id.clone(),
            });
        }

        let now = Instant::now();
        let start = inner.next_index % n;
        for offset in 0..n {
            let idx = (start + offset) % n;
            let slot = &mut inner.slots[idx];
            if !slot.cooldown_elapsed(now, self.cooldown) {
                continue;
            }
            if matches!(slot.state, CredentialState::Failed { .. }) {
                info!(
                    provider = %self.provider_id,
                    credential = %slot.credential.label,
                    "cooldown expired, credential available again"
                );
                slot.state = CredentialState::Available;
            }
            let credential = slot.credential.clone();
            inner.next_index = (idx + 1) % n;
            debug!(provider = %self.provider_id, credential = %credential.label, "credential selected");
            return Ok(credential);
        }

        Err(Error::Exhausted {
            provider: self.provider_id.clone(),
            total: n,
            failed: n,
        })
    }

    /// Record a failure for a credential and move the cursor past it.
    pub async fn mark_failed(&self, credential_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let n = inner.slots.len();
        let idx = inner
            .slots
            .iter()
            .position(|s| s.credential.id() == credential_id)
            .ok_or_else(|| Error::NotFound(credential_id.to_owned()))?;

        let slot = &mut inner.slots[idx];
        slot.state = CredentialState::Failed { at: Instant::now() };
        warn!(
            provider = %self.provider_id,
            credential = %slot.credential.label,
            cooldown_secs = self.cooldown.as_secs(),
            "credential marked failed"
        );
        if inner.next_index == idx {
            inner.next_index = (idx + 1) % n;
        }
        metrics::counter!(
            "docgate_credential_rotations_total",
            "provider" => self.provider_id.clone()
        )
        .increment(1);
        Ok(())
    }

    /// Counts of usable and cooling credentials, with lazy expiry applied.
    pub async fn status(&self) -> PoolStatus {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        let total = inner.slots.len();
        let active = inner
            .slots
            .iter()
            .filter(|s| s.cooldown_elapsed(now, self.cooldown))
            .count();
        PoolStatus {
            provider: self.provider_id.clone(),
            total,
            active,
            exhausted: total - active,
        }
    }

    /// Per-credential health with an overall label.
    ///
    /// All usable → healthy, some usable → degraded, none → unhealthy,
    /// no credentials → unconfigured.
    pub async fn health(&self) -> PoolHealth {
        let inner = self.inner.lock().await;
        let now = Instant::now();

        let credentials: Vec<CredentialHealth> = inner
            .slots
            .iter()
            .map(|slot| {
                if slot.cooldown_elapsed(now, self.cooldown) {
                    CredentialHealth {
                        label: slot.credential.label.clone(),
                        status: "available",
                        cooldown_remaining_secs: None,
                    }
                } else {
                    let remaining = match slot.state {
                        CredentialState::Failed { at } => {
                            (at + self.cooldown).saturating_duration_since(now).as_secs()
                        }
                        CredentialState::Available => 0,
                    };
                    CredentialHealth {
                        label: slot.credential.label.clone(),
                        status: "failed",
                        cooldown_remaining_secs: Some(remaining),
                    }
                }
            })
            .collect();

        let total = credentials.len();
        let active = credentials.iter().filter(|c| c.status == "available").count();
        let status = if total == 0 {
            "unconfigured"
        } else if active == total {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        PoolHealth {
            provider: self.provider_id.clone(),
            status,
            total,
            active,
            exhausted: total - active,
            credentials,
        }
    }

    /// Clear all failure state and rewind the cursor.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        for slot in inner.slots.iter_mut() {
            slot.state = CredentialState::Available;
        }
        inner.next_index = 0;
        info!(provider = %self.provider_id, "credential pool reset");
    }

    /// Replace the credential list. All new credentials start `Available`.
    pub async fn reload(&self, credentials: Vec<Credential>) {
        let mut inner = self.inner.lock().await;
        let before = inner.slots.len();
        inner.slots = credentials.into_iter().map(Slot::new).collect();
        inner.next_index = 0;
        info!(
            provider = %self.provider_id,
            before,
            after = inner.slots.len(),
            "credential pool reloaded"
        );
    }

    /// Flip every failed credential whose cooldown has elapsed back to
    /// `Available`. Returns how many were restored.
    pub async fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let mut restored = 0;
        for slot in inner.slots.iter_mut() {
            if matches!(slot.state, CredentialState::Failed { .. })
                && slot.cooldown_elapsed(now, self.cooldown)
            {
                slot.state = CredentialState::Available;
                restored += 1;
            }
        }
        if restored > 0 {
            info!(provider = %self.provider_id, restored, "expired credential failures swept");
        }
        restored
    }

    /// State of a credential by id, if present.
    pub async fn state_of(&self, credential_id: &str) -> Option<CredentialState> {
        self.inner
            .lock()
            .await
            .slots
            .iter()
            .find(|s| s.credential.id() == credential_id)
            .map(|s| s.state)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_configured(&self) -> bool {
        self.len().await > 0
    }
}
