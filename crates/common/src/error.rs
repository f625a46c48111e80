//! Common error types and handling for Strata
//!
//! Every caller-visible failure of the ingestion and persistence core is a
//! variant here. The transport layer (out of scope for this workspace) maps
//! these to protocol-specific responses via [`Error::error_code`].

use serde::{Deserialize, Serialize};

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// A single structural rule violation found by the artifact verifier.
///
/// Violations are accumulated rather than raised one at a time, so a caller
/// sees every problem with a candidate artifact in a single error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationViolation {
    /// Human-readable description of the violation
    pub message: String,
    /// Field or relationship name the violation applies to, when known
    pub field: Option<String>,
}

impl ValidationViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn on_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl std::fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Common error type for the Strata core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown artifact type: {model}/{artifact_type}")]
    UnknownArtifactType {
        model: String,
        artifact_type: String,
    },

    #[error("Invalid artifact: {} violation(s)", violations.len())]
    InvalidArtifact { violations: Vec<ValidationViolation> },

    #[error("Invalid artifact creation: {0}")]
    InvalidArtifactCreation(String),

    #[error("Derived artifact type '{0}' cannot be created directly")]
    DerivedArtifactCreate(String),

    #[error("Derived artifact type '{0}' cannot be deleted directly")]
    DerivedArtifactDelete(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(uuid::Uuid),

    #[error("No content found for artifact: {0}")]
    ContentNotFound(uuid::Uuid),

    #[error("Artifact already exists: {0}")]
    AlreadyExists(uuid::Uuid),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("A filename is required for this operation")]
    FilenameRequired,

    #[error("Artifact {uuid} does not belong to model/type {model}/{artifact_type}")]
    WrongModel {
        uuid: uuid::Uuid,
        model: String,
        artifact_type: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl Error {
    /// Get the error code for transport-layer responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unexpected(_) => "UNEXPECTED_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::UnknownArtifactType { .. } => "UNKNOWN_ARTIFACT_TYPE",
            Error::InvalidArtifact { .. } => "INVALID_ARTIFACT",
            Error::InvalidArtifactCreation(_) => "INVALID_ARTIFACT_CREATION",
            Error::DerivedArtifactCreate(_) => "DERIVED_ARTIFACT_CREATE",
            Error::DerivedArtifactDelete(_) => "DERIVED_ARTIFACT_DELETE",
            Error::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            Error::ContentNotFound(_) => "CONTENT_NOT_FOUND",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::Conflict(_) => "CONFLICT",
            Error::FilenameRequired => "FILENAME_REQUIRED",
            Error::WrongModel { .. } => "WRONG_MODEL",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// The violations carried by an `InvalidArtifact` error, empty otherwise
    pub fn violations(&self) -> &[ValidationViolation] {
        match self {
            Error::InvalidArtifact { violations } => violations,
            _ => &[],
        }
    }
}
