//! Domain entities for the Artifacts domain
//!
//! A [`BaseArtifact`] is the metadata record the repository versions: a name,
//! a resolved artifact type, custom properties, typed relationships to other
//! artifacts, and — for document-like types — content descriptors recorded
//! when binary content is attached.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use strata_catalog::ArtifactType;

/// Relationship attached to every artifact produced by archive expansion,
/// pointing at the archive's own UUID
pub const EXPANDED_FROM_DOCUMENT: &str = "expandedFromDocument";

/// Relationship linking a sequenced (derived) artifact back to its source
pub const RELATED_DOCUMENT: &str = "relatedDocument";

/// Custom property recording an expanded entry's archive-relative path
pub const EXPANDED_ARCHIVE_PATH_PROPERTY: &str = "expanded.from.archive.path";

/// A named, directed edge from one artifact to one or more target UUIDs.
///
/// Generic relationships carry an arbitrary caller-defined name; target
/// existence is not validated at edge-creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub targets: Vec<Uuid>,
}

/// Size and hash of an artifact's binary content, recorded at attachment time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub size_bytes: u64,
    pub content_hash: String,
}

impl ContentDescriptor {
    /// Whether this descriptor describes actual content
    pub fn is_present(&self) -> bool {
        self.size_bytes > 0 && !self.content_hash.is_empty()
    }
}

/// Artifact metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseArtifact {
    /// Assigned by the persistence gateway at first persistence; `None` for
    /// a candidate that has never been stored
    pub uuid: Option<Uuid>,
    pub name: String,
    pub artifact_type: ArtifactType,
    pub properties: BTreeMap<String, String>,
    pub relationships: Vec<Relationship>,
    /// Present only when the artifact is document-like and content has been
    /// attached
    pub content: Option<ContentDescriptor>,
    /// Optimistic concurrency version; bumped by every successful update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

impl BaseArtifact {
    /// Create a new, not-yet-persisted artifact of the given type
    pub fn new(name: impl Into<String>, artifact_type: ArtifactType) -> Self {
        let now = Utc::now();
        Self {
            uuid: None,
            name: name.into(),
            artifact_type,
            properties: BTreeMap::new(),
            relationships: Vec::new(),
            content: None,
            version: 0,
            created_at: now,
            last_modified_at: now,
        }
    }

    /// Set (or replace) a custom property
    pub fn set_custom_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Look up a custom property value
    pub fn custom_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Add a generic relationship target. Targets accumulate under a single
    /// edge per relationship name (one-to-many cardinality per name).
    pub fn add_generic_relationship(&mut self, name: impl Into<String>, target: Uuid) {
        let name = name.into();
        if let Some(rel) = self.relationships.iter_mut().find(|r| r.name == name) {
            if !rel.targets.contains(&target) {
                rel.targets.push(target);
            }
        } else {
            self.relationships.push(Relationship {
                name,
                targets: vec![target],
            });
        }
    }

    /// The relationship with the given name, if any
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Whether this artifact has binary content attached
    pub fn has_content(&self) -> bool {
        self.content.as_ref().is_some_and(ContentDescriptor::is_present)
    }

    /// Whether this artifact's type carries document content
    pub fn is_document(&self) -> bool {
        self.artifact_type.is_document
    }
}
