use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("model parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        EngineError::IllegalState(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        EngineError::Parse(msg.into())
    }
}
