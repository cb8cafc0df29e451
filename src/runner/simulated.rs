//! In-process runner with a scripted outcome.
//!
//! [`SimulatedRunner`] stands in for a real execution engine: it waits for a
//! configurable duration and then settles the way it was told to. The CLI
//! uses it to exercise the controller end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, bail};

use super::{PipelineResult, PipelineRunner, PipelineState};

/// How a simulated run ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOutcome {
    /// Produce a result reporting `DONE`.
    Done,
    /// Fail the run with the given root cause.
    Fail(String),
    /// Produce a result that claims success but reports another state.
    NonDone(PipelineState),
    /// Finish without producing any result.
    Empty,
}

#[derive(Debug, Clone)]
pub struct SimulatedRunner {
    outcome: SimulatedOutcome,
    duration: Duration,
    fail_cancel: bool,
}

impl SimulatedRunner {
    pub fn new(outcome: SimulatedOutcome, duration: Duration) -> Self {
        Self {
            outcome,
            duration,
            fail_cancel: false,
        }
    }

    /// Make results produced by this runner refuse cancellation.
    pub fn with_failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }
}

impl PipelineRunner for SimulatedRunner {
    /// Simulated pipelines are identified by name only.
    type Pipeline = String;
    type Result = SimulatedResult;

    async fn run(&self, pipeline: Arc<String>) -> anyhow::Result<Option<SimulatedResult>> {
        tracing::debug!(
            pipeline = %pipeline,
            duration = ?self.duration,
            "simulating pipeline run"
        );
        tokio::time::sleep(self.duration).await;

        match &self.outcome {
            SimulatedOutcome::Done => Ok(Some(SimulatedResult::new(
                PipelineState::Done,
                self.fail_cancel,
            ))),
            SimulatedOutcome::NonDone(state) => {
                Ok(Some(SimulatedResult::new(*state, self.fail_cancel)))
            }
            SimulatedOutcome::Empty => Ok(None),
            SimulatedOutcome::Fail(reason) => Err(anyhow::anyhow!("{reason}"))
                .with_context(|| format!("pipeline {pipeline} failed")),
        }
    }
}

/// Result of a simulated run.
#[derive(Debug)]
pub struct SimulatedResult {
    state: Mutex<PipelineState>,
    cancel_calls: AtomicUsize,
    fail_cancel: bool,
}

impl SimulatedResult {
    pub fn new(state: PipelineState, fail_cancel: bool) -> Self {
        Self {
            state: Mutex::new(state),
            cancel_calls: AtomicUsize::new(0),
            fail_cancel,
        }
    }

    /// How many times `cancel` has been called on this result.
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl PipelineResult for SimulatedResult {
    fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn cancel(&self) -> anyhow::Result<PipelineState> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_cancel {
            bail!("engine refused to cancel");
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_terminal() {
            *state = PipelineState::Cancelled;
        }
        Ok(*state)
    }
}
