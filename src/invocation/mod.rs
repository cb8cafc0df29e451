mod job;
mod message;
mod record;
mod state;

pub use job::JobInvocation;
pub use message::{JobMessage, MessageImportance};
pub use record::JobInfo;
pub use state::{JobState, is_terminated};
