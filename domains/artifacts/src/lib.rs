//! Artifacts domain: the artifact model, verification, and the persistence
//! gateway contract

pub mod domain;
pub mod repository;

// Re-export domain types at the crate root for convenience
pub use domain::content::ArtifactContent;
pub use domain::entities::{
    BaseArtifact, ContentDescriptor, Relationship, EXPANDED_ARCHIVE_PATH_PROPERTY,
    EXPANDED_FROM_DOCUMENT, RELATED_DOCUMENT,
};
pub use domain::verifier::ArtifactVerifier;

// Re-export repository types
pub use repository::{BatchEntry, BatchUnit, EngineEvent, InMemoryGateway, PersistenceGateway};
