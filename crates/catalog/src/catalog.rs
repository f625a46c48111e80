//! Read-only registry of artifact type rules
//!
//! The catalog maps every known (model, type) pair to its structural rules:
//! classification flags, required custom properties, and per-relationship
//! target constraints. It is populated once at process start through
//! [`TypeCatalogBuilder`] and never mutated afterward, so it can be shared
//! freely across request workers behind an `Arc`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use strata_common::{Error, Result};

use crate::artifact_type::{ArtifactType, CORE_MODEL, EXTENDED_DOCUMENT};

/// Constraints for one named relationship on a type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRule {
    /// Allowed target type names; empty means any type is accepted
    pub allowed_target_types: Vec<String>,
    /// Maximum number of targets; `None` means unbounded
    pub max_targets: Option<usize>,
}

/// Structural rules registered for one (model, type) pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    pub is_derived: bool,
    pub is_document: bool,
    pub is_extended: bool,
    /// Custom properties that must be present and non-empty
    pub required_properties: Vec<String>,
    /// Rules for relationships the verifier should constrain. Relationship
    /// names not listed here are generic and accepted as-is.
    pub relationship_rules: BTreeMap<String, RelationshipRule>,
    /// MIME type to fall back on when neither extension nor sniffing decide
    pub default_mime_type: Option<String>,
}

/// Immutable (model, type) → rules registry
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    entries: BTreeMap<(String, String), TypeRule>,
}

impl TypeCatalog {
    pub fn builder() -> TypeCatalogBuilder {
        TypeCatalogBuilder {
            entries: BTreeMap::new(),
        }
    }

    /// The built-in core model: plain and XML documents, zip archives, the
    /// extended types, and one derived type produced by sequencing.
    pub fn core() -> Self {
        Self::builder()
            .register(CORE_MODEL, "Document", {
                TypeRule {
                    is_document: true,
                    default_mime_type: Some("application/octet-stream".to_string()),
                    ..TypeRule::default()
                }
            })
            .register(CORE_MODEL, "XmlDocument", {
                TypeRule {
                    is_document: true,
                    default_mime_type: Some("application/xml".to_string()),
                    ..TypeRule::default()
                }
            })
            .register(CORE_MODEL, "ZipArchive", {
                TypeRule {
                    is_document: true,
                    default_mime_type: Some("application/zip".to_string()),
                    ..TypeRule::default()
                }
            })
            .register(CORE_MODEL, "ExtendedArtifactType", {
                TypeRule {
                    is_extended: true,
                    ..TypeRule::default()
                }
            })
            .register(CORE_MODEL, EXTENDED_DOCUMENT, {
                TypeRule {
                    is_extended: true,
                    is_document: true,
                    default_mime_type: Some("application/octet-stream".to_string()),
                    ..TypeRule::default()
                }
            })
            .register(CORE_MODEL, "DocumentFragment", {
                TypeRule {
                    is_derived: true,
                    ..TypeRule::default()
                }
            })
            .build()
    }

    /// Look up the rules registered for a (model, type) pair
    pub fn rule(&self, model: &str, name: &str) -> Option<&TypeRule> {
        self.entries
            .get(&(model.to_string(), name.to_string()))
    }

    /// Resolve a (model, type) pair into an [`ArtifactType`] value.
    ///
    /// Fails with `UnknownArtifactType` for pairs not present in the catalog;
    /// this is the validation applied to explicit caller-supplied type hints.
    pub fn resolve(&self, model: &str, name: &str) -> Result<ArtifactType> {
        let rule = self
            .rule(model, name)
            .ok_or_else(|| Error::UnknownArtifactType {
                model: model.to_string(),
                artifact_type: name.to_string(),
            })?;
        Ok(ArtifactType {
            model: model.to_string(),
            name: name.to_string(),
            mime_type: rule.default_mime_type.clone(),
            is_derived: rule.is_derived,
            is_document: rule.is_document,
            is_extended: rule.is_extended,
        })
    }

    /// Coerce an extended (non-document) type hint to the extended-document
    /// type. Applied when an extended-type hint arrives with binary content.
    pub fn extended_document(&self) -> Result<ArtifactType> {
        self.resolve(CORE_MODEL, EXTENDED_DOCUMENT)
    }

    /// All registered (model, type) pairs, in catalog order
    pub fn registered_types(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .keys()
            .map(|(model, name)| (model.as_str(), name.as_str()))
    }
}

/// Builder used to populate the catalog at process start
pub struct TypeCatalogBuilder {
    entries: BTreeMap<(String, String), TypeRule>,
}

impl TypeCatalogBuilder {
    /// Register a (model, type) pair. Registering the same pair twice
    /// replaces the earlier rule.
    pub fn register(mut self, model: &str, name: &str, rule: TypeRule) -> Self {
        self.entries
            .insert((model.to_string(), name.to_string()), rule);
        self
    }

    pub fn build(self) -> TypeCatalog {
        TypeCatalog {
            entries: self.entries,
        }
    }
}
