//! Error types for the dataset / export pipeline
//!
//! どのステージで何が起きたかをメッセージから特定できるようにする。

use std::path::PathBuf;

/// Boxed cause from an external capability (model training, quantization codec)
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline errors. All of them abort the run; nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed or mismatched row shape
    #[error("schema error at line {line}: {reason}")]
    Schema { line: usize, reason: String },

    /// No rows were consumed
    #[error("empty input: no data rows were read")]
    EmptyInput,

    /// Rows were consumed but no (label, take_id) key resulted
    #[error("no takes: input produced zero (label, take_id) groups")]
    NoTakes,

    /// Fewer than 2 label classes
    #[error("need at least 2 gesture classes, found {found} ({})", labels.join(", "))]
    InsufficientClasses { found: usize, labels: Vec<String> },

    /// Model training failed
    #[error("training failed")]
    Training {
        #[source]
        source: BoxedCause,
    },

    /// Quantization codec rejected the model or the calibration data
    #[error("quantization failed")]
    Quantization {
        #[source]
        source: BoxedCause,
    },

    /// Input CSV could not be located
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file parse error
    #[error("failed to parse config {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Metadata serialization error
    #[error(transparent)]
    Metadata(#[from] serde_json::Error),

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn schema(line: usize, reason: impl Into<String>) -> Self {
        Error::Schema {
            line,
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
