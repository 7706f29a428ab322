use thiserror::Error;

/// Failure of one external collaborator for one data point. Never fatal for a
/// run: callers degrade to the estimator's neutral default.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} unavailable: {detail}")]
    Unavailable {
        provider: &'static str,
        detail: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed fixture data; isolates the offending fixture only.
#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} is negative ({value})")]
    Negative { field: &'static str, value: f64 },
}
