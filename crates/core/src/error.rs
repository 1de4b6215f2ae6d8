use thiserror::Error;

pub type FunnelResult<T> = Result<T, FunnelError>;

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: required column `{0}` is missing")]
    MissingColumn(String),

    #[error("Invalid timestamp `{value}` at row {row}")]
    InvalidTimestamp { row: usize, value: String },

    #[error("Unknown event kind `{value}` at row {row}")]
    UnknownEventKind { row: usize, value: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for FunnelError {
    fn from(err: config::ConfigError) -> Self {
        FunnelError::Config(err.to_string())
    }
}
