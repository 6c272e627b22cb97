use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("unparsable alert condition: {0}")]
    UnparsableCondition(String),

    #[error("invalid alert rules: {0}")]
    InvalidRules(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AlertError>;
