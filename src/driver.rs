use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::runtime::Handle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::invocation::{JobInfo, JobInvocation};
use crate::runner::{SimulatedOutcome, SimulatedRunner};
use crate::ui::JobProgress;

/// Name given to the pipeline of every simulated invocation.
const SIMULATED_PIPELINE: &str = "simulated-pipeline";

/// What a single simulated invocation should do.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub outcome: SimulatedOutcome,
    pub duration: Duration,
    /// Cancel the job this long after starting it.
    pub cancel_after: Option<Duration>,
    /// Make the produced result refuse cancellation.
    pub fail_cancel: bool,
}

/// Drives one simulated job invocation from start to completion.
pub struct InvocationDriver {
    runtime: Handle,
    show_progress: bool,
}

impl InvocationDriver {
    pub fn new(runtime: Handle, show_progress: bool) -> Self {
        Self {
            runtime,
            show_progress,
        }
    }

    /// Start a job on a [`SimulatedRunner`], optionally cancel it, wait for
    /// the outcome and return the resulting [`JobInfo`].
    pub async fn run(&self, options: RunOptions) -> Result<JobInfo> {
        let mut runner = SimulatedRunner::new(options.outcome, options.duration);
        if options.fail_cancel {
            runner = runner.with_failing_cancel();
        }

        let job = JobInvocation::new(
            Uuid::new_v4().to_string(),
            self.runtime.clone(),
            SIMULATED_PIPELINE.to_string(),
            Arc::new(runner),
        );

        let progress = self.show_progress.then(|| JobProgress::start(job.id()));
        if let Some(progress) = &progress {
            progress.attach(&job);
        }

        job.start()?;

        if let Some(delay) = options.cancel_after {
            sleep(delay).await;
            if let Some(cancellation) = job.cancel() {
                cancellation.await?;
            }
        }

        let state = job.wait_for_completion().await;
        let info = job.info();
        if let Some(progress) = progress {
            progress.complete(state);
            progress.print_info(&info);
        }
        Ok(info)
    }
}
