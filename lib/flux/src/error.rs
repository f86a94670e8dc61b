use thiserror::Error;

/// Errors that can occur in the ambient stack itself (config loading,
/// token handling). Component-specific errors (`NetworkError`,
/// `AuthError`, `PredictionError`) live in their own crates.
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("failed to load config: {0}")]
    Config(String),
    #[error("malformed bearer token")]
    MalformedToken,
    #[error("bearer token signature mismatch")]
    BadSignature,
}

pub type FluxResult<T> = Result<T, FluxError>;
