use thiserror::Error;

use powermgmt_alerts::AlertError;
use powermgmt_core::PowerMgmtError;
use powermgmt_queue::QueueError;
use powermgmt_schedule::ScheduleError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] PowerMgmtError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("alert rules: {0}")]
    Alerts(#[from] AlertError),

    /// A queue message that cannot be decoded or acted on. Returned so the
    /// consumer leaves it for the host's dead-letter policy.
    #[error("malformed {kind} message: {reason}")]
    MalformedMessage { kind: &'static str, reason: String },
}

impl EngineError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        EngineError::MalformedMessage {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
