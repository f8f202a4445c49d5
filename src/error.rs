use thiserror::Error;

#[derive(Debug, Error)]
pub enum IfritError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("invalid handler: {0}")]
    InvalidHandler(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("execution cancelled")]
    Cancelled,
}

pub use crate::Result;

impl From<serde_json::Error> for IfritError {
    fn from(err: serde_json::Error) -> Self {
        IfritError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for IfritError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IfritError::Http(format!("request timed out: {err}"))
        } else {
            IfritError::Http(err.to_string())
        }
    }
}
