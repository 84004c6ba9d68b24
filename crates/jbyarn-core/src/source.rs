//! Artifact location parsing.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ArtifactUri {
    /// Local file: file:///opt/dist/server.tar.gz or /opt/dist/server.tar.gz
    File { path: String },
    /// Distributed filesystem: hdfs://namenode:9000/apps/server.tar.gz
    Hdfs { authority: String, path: String },
    /// HTTPS: https://releases.example.com/server.tar.gz
    Https { url: String },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("unsupported artifact scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid artifact URI: {0}")]
    InvalidUri(String),
}

impl ArtifactUri {
    pub fn parse(uri: &str) -> Result<Self, ArtifactError> {
        if let Some(rest) = uri.strip_prefix("hdfs://") {
            let (authority, path) = rest
                .split_once('/')
                .ok_or_else(|| ArtifactError::InvalidUri(uri.to_string()))?;
            if authority.is_empty() || path.is_empty() {
                return Err(ArtifactError::InvalidUri(uri.to_string()));
            }
            Ok(ArtifactUri::Hdfs {
                authority: authority.to_string(),
                path: format!("/{path}"),
            })
        } else if uri.starts_with("https://") || uri.starts_with("http://") {
            Ok(ArtifactUri::Https { url: uri.to_string() })
        } else if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ArtifactError::InvalidUri(uri.to_string()));
            }
            Ok(ArtifactUri::File { path: path.to_string() })
        } else if uri.starts_with("./") || uri.starts_with('/') {
            Ok(ArtifactUri::File { path: uri.to_string() })
        } else {
            Err(ArtifactError::UnsupportedScheme(uri.to_string()))
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ArtifactUri::File { .. } => "file",
            ArtifactUri::Hdfs { .. } => "hdfs",
            ArtifactUri::Https { .. } => "https",
        }
    }

    /// Path on the local filesystem, if the artifact lives there.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            ArtifactUri::File { path } => Some(Path::new(path)),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactUri::File { path } => write!(f, "file://{path}"),
            ArtifactUri::Hdfs { authority, path } => write!(f, "hdfs://{authority}{path}"),
            ArtifactUri::Https { url } => f.write_str(url),
        }
    }
}
