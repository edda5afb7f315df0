//! Conversion gateway core
//!
//! Ties the pieces together: a `JobOrchestrator` per provider drives the
//! remote job lifecycle with credential rotation, and the `FallbackRouter`
//! walks each tool's provider chain down to the local converter.
//!
//! Request flow:
//! 1. `FallbackRouter::convert()` picks the first configured provider for the tool
//! 2. `JobOrchestrator::run()` takes a credential from the pool and a token from the broker
//! 3. The job state machine (`job::handle_event`) decides each pipeline step
//! 4. Quota-class failures mark the credential failed and restart on the next one
//! 5. Pool exhaustion or any other error returns to the router, which moves on

pub mod error;
pub mod job;
pub mod orchestrator;
pub mod router;

#[cfg(test)]
mod testing;

pub use error::{GatewayError, Result};
pub use job::{Job, JobAction, JobEvent, JobState, handle_event};
pub use orchestrator::{JobOrchestrator, PollSettings};
pub use router::{FallbackRouter, GatewayHealth, ProviderStatus};
