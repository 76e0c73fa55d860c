//! Error taxonomy shared by every kdeploy crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to turn bytes into an [`crate::Object`] or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("cannot convert document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document is empty")]
    Empty,
    #[error("document is not a mapping")]
    NotAMapping,
    #[error("document has no kind")]
    MissingKind,
}

/// A field exists but holds a value of the wrong shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("{path}: expected {expected}, found {found}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors surfaced by the Prepare and Apply phases.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("decoding {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: CodecError,
    },
    #[error("parsing {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("io on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("validation: {0}")]
    Validation(String),
    #[error("naming: {0}")]
    Naming(String),
    #[error("{context}: {source:#}")]
    Cluster {
        context: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("cannot determine readiness of {kind} {name:?}: {source}")]
    Readiness {
        kind: String,
        name: String,
        #[source]
        source: FieldError,
    },
    #[error("{context}: {source:#}")]
    Transfer {
        context: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("timed out after {waited:?} waiting for {} object(s) to become ready: {}", .pending.len(), .pending.join(", "))]
    Timeout { waited: Duration, pending: Vec<String> },
}

impl DeployError {
    pub fn cluster(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Cluster { context: context.into(), source }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse { path: path.into(), message: message.into() }
    }

    /// True for the one soft failure: objects were applied but did not confirm in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
