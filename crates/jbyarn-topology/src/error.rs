//! Topology writer error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors that can occur while reading or rewriting configuration files.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("failed to serialize document: {0}")]
    Serialize(String),

    #[error("missing element: {0}")]
    MissingElement(String),

    #[error("cannot resolve host {0} to an address")]
    Resolve(String),
}

impl TopologyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TopologyError::Io {
            path: path.into(),
            source,
        }
    }
}
