use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity attached to a diagnostic message.
///
/// The controller itself only emits `Debug`, `Warning` and `Error`; the full
/// scale is kept for consumers that emit or filter their own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageImportance {
    Debug,
    Detailed,
    Basic,
    Warning,
    Error,
}

impl std::fmt::Display for MessageImportance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageImportance::Debug => write!(f, "debug"),
            MessageImportance::Detailed => write!(f, "detailed"),
            MessageImportance::Basic => write!(f, "basic"),
            MessageImportance::Warning => write!(f, "warning"),
            MessageImportance::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message emitted by a job invocation.
///
/// The controller forwards these to message listeners as-is; formatting for
/// a wire protocol is left to whoever consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub message_id: String,
    pub time: DateTime<Utc>,
    pub importance: MessageImportance,
    pub text: String,
}

impl JobMessage {
    pub fn new(importance: MessageImportance, text: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            time: Utc::now(),
            importance,
            text: text.into(),
        }
    }

    pub fn debug(text: impl Into<String>) -> Self {
        Self::new(MessageImportance::Debug, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageImportance::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageImportance::Error, text)
    }
}
