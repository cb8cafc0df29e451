//! Seams to the execution engine that actually runs a job's pipeline.
//!
//! The invocation controller only needs two things from an engine: a way to
//! run a pipeline to completion ([`PipelineRunner`]) and, for whatever that
//! run produced, a terminal status plus a way to cancel it
//! ([`PipelineResult`]). The pipeline itself is opaque to the controller.

pub mod simulated;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use simulated::{SimulatedOutcome, SimulatedResult, SimulatedRunner};

/// Status reported by a pipeline result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Unknown,
    Stopped,
    Running,
    Done,
    Failed,
    Cancelled,
    Updated,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Done
                | PipelineState::Failed
                | PipelineState::Cancelled
                | PipelineState::Updated
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Unknown => write!(f, "UNKNOWN"),
            PipelineState::Stopped => write!(f, "STOPPED"),
            PipelineState::Running => write!(f, "RUNNING"),
            PipelineState::Done => write!(f, "DONE"),
            PipelineState::Failed => write!(f, "FAILED"),
            PipelineState::Cancelled => write!(f, "CANCELLED"),
            PipelineState::Updated => write!(f, "UPDATED"),
        }
    }
}

/// An execution engine capable of running a pipeline.
///
/// A runner may be shared by many invocations and must tolerate concurrent
/// calls to [`run`](PipelineRunner::run).
pub trait PipelineRunner: Send + Sync + 'static {
    type Pipeline: Send + Sync + 'static;
    type Result: PipelineResult;

    /// Run `pipeline` to completion.
    ///
    /// `Ok(None)` means the engine finished without producing a result.
    fn run(
        &self,
        pipeline: Arc<Self::Pipeline>,
    ) -> impl Future<Output = anyhow::Result<Option<Self::Result>>> + Send;
}

/// Whatever a runner hands back after a successful run.
pub trait PipelineResult: Send + Sync + 'static {
    fn state(&self) -> PipelineState;

    /// Ask the engine to cancel the work behind this result.
    ///
    /// Must be safe to call on a result that is already terminal.
    fn cancel(&self) -> impl Future<Output = anyhow::Result<PipelineState>> + Send;
}
