use thiserror::Error;

/// Error type that captures fatal export and import failures.
///
/// Data-quality problems in the source ledger (unsupported transfer shapes,
/// unresolvable QIF references) are not errors; they are logged and collected
/// in the build report instead.
#[derive(Debug, Error)]
pub enum QifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid reference: {0}")]
    InvalidRef(String),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QifError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        QifError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QifError>;
