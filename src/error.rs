use thiserror::Error;

/// Result type for the KGTK engine modules.
pub type Result<T> = std::result::Result<T, KgtkError>;

#[derive(Debug, Error)]
pub enum KgtkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{file}: key column '{column}' not found")]
    MissingKeyColumn { file: String, column: String },

    #[error("input has {input} key columns but filter has {filter}")]
    KeyCountMismatch { input: usize, filter: usize },

    #[error("{file}: key '{key}' at line {line} sorts before previous key '{previous}'")]
    OutOfOrder {
        file: String,
        line: u64,
        key: String,
        previous: String,
    },

    #[error("key column index {index} is out of range for a row with {width} fields")]
    KeyIndex { index: usize, width: usize },

    #[error("line {line}: {reason} (expected {expected} fields, found {found})")]
    RowShape {
        line: u64,
        expected: usize,
        found: usize,
        reason: &'static str,
    },

    #[error("{file}: duplicate column name '{name}'")]
    DuplicateColumn { file: String, name: String },

    #[error("{file}: column {position} has an empty name")]
    EmptyColumnName { file: String, position: usize },

    #[error("failed to open {path}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {path}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl KgtkError {
    pub fn config(message: impl Into<String>) -> Self {
        KgtkError::Config(message.into())
    }
}
