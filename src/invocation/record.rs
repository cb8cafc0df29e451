use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobState;

/// A state the invocation entered, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub state: JobState,
    pub at: DateTime<Utc>,
}

/// Serializable snapshot of a job invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: String,
    pub state: JobState,
    /// Every state the invocation has been in, oldest first, including the
    /// current one.
    pub state_history: Vec<JobState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl JobInfo {
    pub(crate) fn from_transitions(job_id: &str, transitions: &[Transition]) -> Self {
        let created_at = transitions.first().map(|t| t.at).unwrap_or_else(Utc::now);
        let (state, updated_at) = transitions
            .last()
            .map(|t| (t.state, t.at))
            .unwrap_or((JobState::Stopped, created_at));

        Self {
            job_id: job_id.to_string(),
            state,
            state_history: transitions.iter().map(|t| t.state).collect(),
            created_at,
            updated_at,
            duration_ms: (updated_at - created_at).num_milliseconds(),
        }
    }
}
