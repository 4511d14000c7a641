use thiserror::Error;

/// Error kinds shared by all three pipeline processes. Every boundary
/// (LLM call, market-data call, store query) converts into one of
/// these; raw provider errors never surface past the crate that made
/// the call.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transient provider error: {0}")]
    TransientProvider(String),

    #[error("ticker not found: {0}")]
    AuthoritativeNotFound(String),

    #[error("LLM response did not parse: {0}")]
    LlmParse(String),

    #[error("admission refused: {0}")]
    AdmissionRefused(String),

    #[error("ledger consistency violation: {0}")]
    LedgerConsistency(String),

    #[error("data store error: {0}")]
    DataStore(#[from] sqlx::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
