use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle states of a job invocation.
///
/// An invocation is created in `Stopped`, moves through `Starting` and
/// `Running` when started, and settles in `Done`, `Failed` or `Unspecified`
/// once its execution completes. `Cancelled` and `Drained` are part of the
/// vocabulary shared with job services but never produced by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Stopped,
    Starting,
    Running,
    Done,
    Failed,
    Cancelled,
    Drained,
    Unspecified,
}

impl JobState {
    /// Every state, in declaration order.
    pub const ALL: [JobState; 8] = [
        JobState::Stopped,
        JobState::Starting,
        JobState::Running,
        JobState::Done,
        JobState::Failed,
        JobState::Cancelled,
        JobState::Drained,
        JobState::Unspecified,
    ];

    /// Returns true if no further transition is defined out of this state.
    ///
    /// `Unspecified` is deliberately not terminal: it means the runner gave
    /// no result, not that the job is known to be finished.
    pub fn is_terminated(self) -> bool {
        matches!(
            self,
            JobState::Done | JobState::Failed | JobState::Cancelled | JobState::Drained
        )
    }
}

/// Free-function form of [`JobState::is_terminated`], for callers polling a
/// job service until they can stop waiting.
pub fn is_terminated(state: JobState) -> bool {
    state.is_terminated()
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Stopped => write!(f, "STOPPED"),
            JobState::Starting => write!(f, "STARTING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Done => write!(f, "DONE"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Drained => write!(f, "DRAINED"),
            JobState::Unspecified => write!(f, "UNSPECIFIED"),
        }
    }
}
