//! Artifact type values and the read-only type catalog for Strata
//!
//! The catalog is the contract between the ingestion pipeline and the type
//! system: detection and verification both consult it, and it is immutable
//! after process start.

pub mod artifact_type;
pub mod catalog;

pub use artifact_type::{ArtifactType, CORE_MODEL, EXTENDED_DOCUMENT};
pub use catalog::{RelationshipRule, TypeCatalog, TypeCatalogBuilder, TypeRule};
