use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("provider returned an error status: {0}")]
    ProviderStatus(String),

    #[error("response did not contain a completion")]
    EmptyCompletion,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type LlmResult<T> = Result<T, LlmError>;
