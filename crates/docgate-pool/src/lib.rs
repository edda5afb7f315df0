//! Credential pool, rate limiter and quota classification
//!
//! One `CredentialPool` and at most one `RateLimiter` per provider, both
//! shared via `Arc` between concurrent conversions. State lives behind a
//! mutex so selection, failure marking and slot acquisition are atomic with
//! respect to each other.
//!
//! Credential lifecycle:
//! 1. Startup loads credentials into the pool, all `Available`
//! 2. `next()` hands them out round-robin
//! 3. A quota-class failure calls `mark_failed()` → `Failed { at }`
//! 4. Once the cooldown has elapsed the credential is selectable again,
//!    either lazily on the next scan or through the periodic sweep
//! 5. An admin reload replaces the list and clears all failure state

pub mod error;
pub mod limiter;
pub mod pool;
pub mod quota;
pub mod sweep;

pub use error::{Error, Result};
pub use limiter::{LimiterStatus, RateLimitParams, RateLimiter};
pub use pool::{CredentialHealth, CredentialPool, CredentialState, PoolHealth, PoolStatus};
pub use quota::QuotaPolicy;
pub use sweep::spawn_sweep_task;

use std::time::Duration;

/// Default failure cooldown: monthly quotas reset slowly, so a day is the floor.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);
