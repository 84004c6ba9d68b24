//! Master error types.

use thiserror::Error;

/// Failure reported by a resource manager, node agent, or artifact store.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("not available: {0}")]
    Unavailable(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("unsupported artifact location: {0}")]
    UnsupportedArtifact(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CollaboratorError {
    fn from(e: std::io::Error) -> Self {
        CollaboratorError::Io(e.to_string())
    }
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Errors that end a run of the application master.
#[derive(Debug, Error)]
pub enum MasterError {
    #[error("cannot run the application master with no containers")]
    NoContainers,

    #[error("registration with the resource manager failed: {0}")]
    Registration(#[source] CollaboratorError),

    #[error("allocation request failed: {0}")]
    Request(#[source] CollaboratorError),

    #[error("resource manager error: {0}")]
    Collaborator(String),

    #[error("event channel closed before the run finished")]
    ChannelClosed,

    #[error(transparent)]
    Config(#[from] jbyarn_core::ConfigError),

    #[error("invalid artifact: {0}")]
    Artifact(#[from] jbyarn_core::ArtifactError),
}

pub type MasterResult<T> = Result<T, MasterError>;
