use thiserror::Error;

#[derive(Error, Debug)]
pub enum QEstimateError {
    #[error("Invalid invariant (quantile {quantile}, error {error}): {reason}")]
    InvalidInvariant {
        quantile: f64,
        error: f64,
        reason: &'static str,
    },

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, QEstimateError>;
