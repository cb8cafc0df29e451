//! Job invocation controller.
//!
//! A [`JobInvocation`] represents one submitted job: it dispatches the run of
//! a pipeline onto a tokio runtime, tracks the job through a fixed set of
//! [`JobState`]s, propagates cancellation to the runner, and fans out state
//! changes and diagnostic [`JobMessage`]s to registered listeners.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod invocation;
pub mod logging;
pub mod runner;
pub mod ui;

pub use error::InvokerError;
pub use invocation::{
    JobInfo, JobInvocation, JobMessage, JobState, MessageImportance, is_terminated,
};
pub use runner::{PipelineResult, PipelineRunner, PipelineState};
