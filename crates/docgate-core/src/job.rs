//! Job lifecycle state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The orchestrator executes the I/O implied by each action and feeds the
//! outcome back in as the next event.
//!
//! ```text
//! Created → Uploaded → Started → Polling → Completed
//!                                        ↘ Failed
//!                                        ↘ TimedOut
//! ```

use provider::{Polled, RemoteStatus, Started, Tool, Uploaded};

/// Lifecycle state of one conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Created,
    Uploaded { asset_id: String },
    Started { locator: String },
    /// `attempts` polls have been answered with a non-terminal status
    Polling { locator: String, attempts: u32 },
    Completed,
    Failed { reason: String },
    TimedOut { attempts: u32 },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed { .. } | JobState::TimedOut { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Uploaded { .. } => "uploaded",
            JobState::Started { .. } => "started",
            JobState::Polling { .. } => "polling",
            JobState::Completed => "completed",
            JobState::Failed { .. } => "failed",
            JobState::TimedOut { .. } => "timed_out",
        }
    }
}

#[derive(Debug)]
pub enum JobEvent {
    /// Conversion accepted for this provider
    Submitted,
    Uploaded(Uploaded),
    Started(Started),
    Polled(Polled),
    /// Result bytes fetched
    Downloaded,
    /// Non-recoverable error from a pipeline step
    StepFailed { reason: String },
    /// Caller gave up
    Cancelled,
}

/// Actions the caller should execute after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Upload,
    Start { asset_id: String },
    /// Wait one poll interval, then query the locator
    Poll { locator: String },
    Download { uri: String },
    /// Terminal state reached
    Finish,
    None,
}

/// Handle a state transition. Pure function: no I/O.
///
/// `ceiling` is the maximum number of polls. The poll that brings the count
/// to `ceiling` without a terminal status moves the job to `TimedOut`.
pub fn handle_event(state: JobState, event: JobEvent, ceiling: u32) -> (JobState, JobAction) {
    match (state, event) {
        // --- Created ---
        (JobState::Created, JobEvent::Submitted) => (JobState::Created, JobAction::Upload),

        (JobState::Created, JobEvent::Uploaded(uploaded)) => (
            JobState::Uploaded {
                asset_id: uploaded.asset_id.clone(),
            },
            JobAction::Start {
                asset_id: uploaded.asset_id,
            },
        ),

        // --- Uploaded ---
        (JobState::Uploaded { .. }, JobEvent::Started(started)) => (
            JobState::Started {
                locator: started.locator.clone(),
            },
            JobAction::Poll {
                locator: started.locator,
            },
        ),

        // --- Started / Polling ---
        (JobState::Started { locator }, JobEvent::Polled(polled)) => {
            on_poll(locator, 0, polled, ceiling)
        }
        (JobState::Polling { locator, attempts }, JobEvent::Polled(polled)) => {
            on_poll(locator, attempts, polled, ceiling)
        }

        (JobState::Polling { .. }, JobEvent::Downloaded) => (JobState::Completed, JobAction::Finish),

        // --- Failures from any live state ---
        (state, JobEvent::StepFailed { reason }) if !state.is_terminal() => {
            (JobState::Failed { reason }, JobAction::Finish)
        }

        (state, JobEvent::Cancelled) if !state.is_terminal() => {
            let attempts = match state {
                JobState::Polling { attempts, .. } => attempts,
                _ => 0,
            };
            (JobState::TimedOut { attempts }, JobAction::Finish)
        }

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, JobAction::None),
    }
}

fn on_poll(locator: String, attempts: u32, polled: Polled, ceiling: u32) -> (JobState, JobAction) {
    let attempts = attempts + 1;
    match polled.status {
        RemoteStatus::Done => match polled.download_uri {
            Some(uri) => (JobState::Polling { locator, attempts }, JobAction::Download { uri }),
            None => (
                JobState::Failed {
                    reason: "job finished without a download location".into(),
                },
                JobAction::Finish,
            ),
        },
        RemoteStatus::Failed => (
            JobState::Failed {
                reason: polled
                    .message
                    .unwrap_or_else(|| String::from("provider reported failure")),
            },
            JobAction::Finish,
        ),
        RemoteStatus::Queued | RemoteStatus::Processing if attempts >= ceiling => {
            (JobState::TimedOut { attempts }, JobAction::Finish)
        }
        RemoteStatus::Queued | RemoteStatus::Processing => (
            JobState::Polling {
                locator: locator.clone(),
                attempts,
            },
            JobAction::Poll { locator },
        ),
    }
}

/// One conversion attempt on one provider. Never persisted.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub provider: String,
    pub tool: Tool,
    /// Remote asset id once uploaded
    pub remote_id: Option<String>,
    pub state: JobState,
    ceiling: u32,
}

impl Job {
    pub fn new(provider: impl Into<String>, tool: Tool, ceiling: u32) -> Self {
        Self {
            id: format!("job_{}", uuid::Uuid::new_v4().as_simple()),
            provider: provider.into(),
            tool,
            remote_id: None,
            state: JobState::Created,
            ceiling,
        }
    }

    /// Feed an event through the state machine and return the next action.
    pub fn apply(&mut self, event: JobEvent) -> JobAction {
        if let JobEvent::Uploaded(uploaded) = &event {
            self.remote_id = Some(uploaded.asset_id.clone());
        }
        let state = std::mem::replace(&mut self.state, JobState::Created);
        let (next, action) = handle_event(state, event, self.ceiling);
        self.state = next;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polled(status: RemoteStatus) -> JobEvent {
        JobEvent::Polled(Polled {
            status,
            download_uri: None,
            message: None,
        })
    }

    fn started_job(ceiling: u32) -> Job {
        let mut job = Job::new("adobe", Tool::PdfToWord, ceiling);
        job.apply(JobEvent::Submitted);
        job.apply(JobEvent::Uploaded(Uploaded {
            asset_id: "a-1".into(),
        }));
        job.apply(JobEvent::Started(Started {
            locator: "https://p/jobs/1".into(),
        }));
        job
    }

    #[test]
    fn happy_path_walks_every_state() {
        let mut job = Job::new("adobe", Tool::PdfToWord, 60);
        assert_eq!(job.apply(JobEvent::Submitted), JobAction::Upload);

        let action = job.apply(JobEvent::Uploaded(Uploaded {
            asset_id: "a-1".into(),
        }));
        assert_eq!(action, JobAction::Start { asset_id: "a-1".into() });
        assert_eq!(job.remote_id.as_deref(), Some("a-1"));

        let action = job.apply(JobEvent::Started(Started {
            locator: "loc".into(),
        }));
        assert_eq!(action, JobAction::Poll { locator: "loc".into() });

        assert_eq!(
            job.apply(polled(RemoteStatus::Processing)),
            JobAction::Poll { locator: "loc".into() }
        );

        let action = job.apply(JobEvent::Polled(Polled {
            status: RemoteStatus::Done,
            download_uri: Some("https://dl/x".into()),
            message: None,
        }));
        assert_eq!(action, JobAction::Download { uri: "https://dl/x".into() });

        assert_eq!(job.apply(JobEvent::Downloaded), JobAction::Finish);
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn always_processing_times_out_at_exactly_the_ceiling() {
        let mut job = started_job(60);
        for n in 1..60 {
            let action = job.apply(polled(RemoteStatus::Processing));
            assert!(matches!(action, JobAction::Poll { .. }), "poll {n}: {action:?}");
        }
        assert_eq!(job.apply(polled(RemoteStatus::Processing)), JobAction::Finish);
        assert_eq!(job.state, JobState::TimedOut { attempts: 60 });
    }

    #[test]
    fn success_on_the_last_allowed_poll_still_downloads() {
        let mut job = started_job(3);
        job.apply(polled(RemoteStatus::Queued));
        job.apply(polled(RemoteStatus::Queued));
        let action = job.apply(JobEvent::Polled(Polled {
            status: RemoteStatus::Done,
            download_uri: Some("u".into()),
            message: None,
        }));
        assert_eq!(action, JobAction::Download { uri: "u".into() });
    }

    #[test]
    fn provider_failure_carries_message() {
        let mut job = started_job(60);
        job.apply(JobEvent::Polled(Polled {
            status: RemoteStatus::Failed,
            download_uri: None,
            message: Some("password protected".into()),
        }));
        assert_eq!(
            job.state,
            JobState::Failed {
                reason: "password protected".into()
            }
        );
    }

    #[test]
    fn done_without_uri_fails() {
        let mut job = started_job(60);
        job.apply(polled(RemoteStatus::Done));
        assert!(matches!(job.state, JobState::Failed { .. }));
    }

    #[test]
    fn step_failure_from_any_live_state() {
        let (state, action) = handle_event(
            JobState::Uploaded {
                asset_id: "a".into(),
            },
            JobEvent::StepFailed {
                reason: "HTTP 500".into(),
            },
            60,
        );
        assert_eq!(state, JobState::Failed { reason: "HTTP 500".into() });
        assert_eq!(action, JobAction::Finish);
    }

    #[test]
    fn cancellation_reports_timed_out_with_poll_count() {
        let mut job = started_job(60);
        job.apply(polled(RemoteStatus::Processing));
        job.apply(polled(RemoteStatus::Processing));
        assert_eq!(job.apply(JobEvent::Cancelled), JobAction::Finish);
        assert_eq!(job.state, JobState::TimedOut { attempts: 2 });
    }

    #[test]
    fn terminal_states_ignore_further_events() {
        let (state, action) = handle_event(JobState::Completed, JobEvent::Cancelled, 60);
        assert_eq!(state, JobState::Completed);
        assert_eq!(action, JobAction::None);

        let (state, _) = handle_event(
            JobState::TimedOut { attempts: 3 },
            polled(RemoteStatus::Done),
            60,
        );
        assert_eq!(state, JobState::TimedOut { attempts: 3 });
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let (state, action) = handle_event(
            JobState::Created,
            JobEvent::Started(Started {
                locator: "x".into(),
            }),
            60,
        );
        assert_eq!(state, JobState::Created);
        assert_eq!(action, JobAction::None);
    }
}
