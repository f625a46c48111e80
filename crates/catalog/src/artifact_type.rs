//! Resolved artifact type values
//!
//! An [`ArtifactType`] identifies a (model, type) pair from the catalog,
//! carries the classification flags registered for it, and — once resolution
//! and MIME sniffing are done — the payload's MIME type. The value is
//! immutable for the remainder of an ingestion once resolved.

use serde::{Deserialize, Serialize};

/// Model name of the built-in core types
pub const CORE_MODEL: &str = "core";

/// Type name used when an extended type carries document content
pub const EXTENDED_DOCUMENT: &str = "ExtendedDocument";

/// A resolved artifact type: a (model, type) pair plus its classification flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactType {
    pub model: String,
    pub name: String,
    /// MIME type, once resolved by the ingestion pipeline
    pub mime_type: Option<String>,
    /// Derived types only exist as a byproduct of sequencing another artifact
    pub is_derived: bool,
    /// Document types carry binary content and content descriptors
    pub is_document: bool,
    /// Extended types are user-defined additions to the base model
    pub is_extended: bool,
}

impl ArtifactType {
    /// Qualified `model/type` key for this type
    pub fn key(&self) -> String {
        format!("{}/{}", self.model, self.name)
    }

    /// Attach a resolved MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Default filename for uploads that arrive without a Slug name.
    ///
    /// Only used when the caller supplied an explicit type hint; nameless
    /// autodetect uploads are rejected instead.
    pub fn default_filename(&self) -> String {
        match (self.model.as_str(), self.name.as_str()) {
            (CORE_MODEL, "Document") => "newartifact.bin".to_string(),
            (CORE_MODEL, "XmlDocument") => "newartifact.xml".to_string(),
            _ => format!("newartifact.{}", self.model),
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.model, self.name)
    }
}
