//! Domain model for the artifacts crate

pub mod content;
pub mod entities;
pub mod verifier;

pub use content::ArtifactContent;
pub use entities::{
    BaseArtifact, ContentDescriptor, Relationship, EXPANDED_ARCHIVE_PATH_PROPERTY,
    EXPANDED_FROM_DOCUMENT, RELATED_DOCUMENT,
};
pub use verifier::ArtifactVerifier;
