//! Structural verification of candidate artifacts
//!
//! The verifier walks a candidate's fields and relationships against the
//! rules registered for its declared type, accumulating every violation
//! rather than failing fast. The caller then raises a single aggregate
//! error via [`ArtifactVerifier::throw_error`], so an invalid update is
//! never partially applied.

use std::collections::HashMap;

use uuid::Uuid;

use strata_catalog::{ArtifactType, TypeRule};
use strata_common::{Error, Result, ValidationViolation};

use crate::domain::entities::BaseArtifact;

/// Accumulating verifier for one candidate artifact
pub struct ArtifactVerifier<'a> {
    declared_type: &'a ArtifactType,
    rule: &'a TypeRule,
    previous: Option<&'a BaseArtifact>,
    /// Target uuid → type name, for targets whose types the caller already
    /// knows (batch siblings, the enclosing archive). Targets not listed
    /// are skipped: existence is not required at edge-creation time.
    known_target_types: HashMap<Uuid, String>,
    violations: Vec<ValidationViolation>,
}

impl<'a> ArtifactVerifier<'a> {
    /// Verifier for a create operation
    pub fn new(declared_type: &'a ArtifactType, rule: &'a TypeRule) -> Self {
        Self {
            declared_type,
            rule,
            previous: None,
            known_target_types: HashMap::new(),
            violations: Vec::new(),
        }
    }

    /// Verifier for an update: also checks that immutable fields are
    /// unchanged relative to the stored version.
    pub fn for_update(
        previous: &'a BaseArtifact,
        declared_type: &'a ArtifactType,
        rule: &'a TypeRule,
    ) -> Self {
        Self {
            declared_type,
            rule,
            previous: Some(previous),
            known_target_types: HashMap::new(),
            violations: Vec::new(),
        }
    }

    /// Tell the verifier the type of a relationship target it would
    /// otherwise not be able to resolve
    pub fn add_known_target_type(&mut self, target: Uuid, type_name: impl Into<String>) {
        self.known_target_types.insert(target, type_name.into());
    }

    /// Walk the candidate, accumulating violations
    pub fn visit(&mut self, candidate: &BaseArtifact) {
        self.check_declared_type(candidate);
        self.check_name(candidate);
        self.check_required_properties(candidate);
        self.check_relationships(candidate);
        if self.previous.is_some() {
            self.check_immutable_fields(candidate);
        }
    }

    /// All violations found so far
    pub fn violations(&self) -> &[ValidationViolation] {
        &self.violations
    }

    /// Raise the accumulated violations as a single error, or no-op when
    /// the candidate is valid
    pub fn throw_error(&self) -> Result<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArtifact {
                violations: self.violations.clone(),
            })
        }
    }

    fn check_declared_type(&mut self, candidate: &BaseArtifact) {
        if candidate.artifact_type.model != self.declared_type.model
            || candidate.artifact_type.name != self.declared_type.name
        {
            self.violations.push(ValidationViolation::on_field(
                format!(
                    "artifact carries type {} but {} was declared",
                    candidate.artifact_type, self.declared_type
                ),
                "artifactType",
            ));
        }
    }

    fn check_name(&mut self, candidate: &BaseArtifact) {
        if candidate.name.trim().is_empty() {
            self.violations.push(ValidationViolation::on_field(
                "artifact name must not be empty",
                "name",
            ));
        }
    }

    fn check_required_properties(&mut self, candidate: &BaseArtifact) {
        for property in &self.rule.required_properties {
            match candidate.custom_property(property) {
                Some(value) if !value.trim().is_empty() => {}
                _ => {
                    self.violations.push(ValidationViolation::on_field(
                        "required property missing or empty",
                        property.clone(),
                    ));
                }
            }
        }
    }

    fn check_relationships(&mut self, candidate: &BaseArtifact) {
        let mut seen = std::collections::BTreeSet::new();
        for rel in &candidate.relationships {
            if rel.name.trim().is_empty() {
                self.violations.push(ValidationViolation::new(
                    "relationship name must not be empty",
                ));
                continue;
            }
            if !seen.insert(rel.name.clone()) {
                self.violations.push(ValidationViolation::on_field(
                    "duplicate relationship edge; targets must accumulate under one name",
                    rel.name.clone(),
                ));
            }
            if rel.targets.is_empty() {
                self.violations.push(ValidationViolation::on_field(
                    "relationship has no targets",
                    rel.name.clone(),
                ));
            }

            let Some(rule) = self.rule.relationship_rules.get(&rel.name) else {
                // Generic relationship: arbitrary caller-defined name, no
                // registered constraints.
                continue;
            };
            if let Some(max) = rule.max_targets {
                if rel.targets.len() > max {
                    self.violations.push(ValidationViolation::on_field(
                        format!("relationship allows at most {} target(s)", max),
                        rel.name.clone(),
                    ));
                }
            }
            if !rule.allowed_target_types.is_empty() {
                for target in &rel.targets {
                    if let Some(target_type) = self.known_target_types.get(target) {
                        if !rule.allowed_target_types.contains(target_type) {
                            self.violations.push(ValidationViolation::on_field(
                                format!(
                                    "target {} has type {} not allowed for this relationship",
                                    target, target_type
                                ),
                                rel.name.clone(),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_immutable_fields(&mut self, candidate: &BaseArtifact) {
        let Some(previous) = self.previous else {
            return;
        };

        if candidate.uuid != previous.uuid {
            self.violations.push(ValidationViolation::on_field(
                "artifact UUID is immutable",
                "uuid",
            ));
        }
        if candidate.artifact_type.model != previous.artifact_type.model
            || candidate.artifact_type.name != previous.artifact_type.name
        {
            self.violations.push(ValidationViolation::on_field(
                "artifact type is immutable",
                "artifactType",
            ));
        }
        if candidate.created_at != previous.created_at {
            self.violations.push(ValidationViolation::on_field(
                "creation timestamp is immutable",
                "createdAt",
            ));
        }
    }
}
