use thiserror::Error;

use crate::invocation::JobState;

#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("Job {job_id} already running (state {state}).")]
    AlreadyStarted { job_id: String, state: JobState },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
