//! The persistence gateway contract
//!
//! This is the sole storage-facing API surface of the core: any versioned,
//! hierarchical content store can back the repository by implementing
//! [`PersistenceGateway`]. The core never talks to an engine directly.

use async_trait::async_trait;
use uuid::Uuid;

use strata_catalog::ArtifactType;
use strata_common::Result;

use crate::domain::content::ArtifactContent;
use crate::domain::entities::BaseArtifact;

/// One member of an atomic batch: metadata, optional content, and the
/// caller-meaningful path it came from (e.g. the archive-relative path)
#[derive(Debug)]
pub struct BatchEntry {
    pub artifact: BaseArtifact,
    pub content: Option<ArtifactContent>,
    pub path: String,
}

/// Event emitted by the storage engine after committing binary content.
///
/// The sequencing listener consumes these asynchronously; the engine may
/// redeliver an identical event, so consumers must be idempotent.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    NodeSequenced {
        uuid: Uuid,
        artifact_type: ArtifactType,
        content_hash: String,
    },
}

/// Abstract contract for artifact metadata and content persistence.
///
/// Derived-type artifacts reject direct create/delete through this gateway;
/// they are produced only via [`persist_derived_artifact`]
/// (the sequencing path) and removed only as a cascade of their source
/// artifact's deletion.
///
/// [`persist_derived_artifact`]: PersistenceGateway::persist_derived_artifact
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist a new artifact, assigning a UUID if the caller did not
    /// supply one. Fails with `AlreadyExists` on UUID collision and
    /// `DerivedArtifactCreate` for derived types.
    async fn persist_artifact(
        &self,
        artifact: BaseArtifact,
        content: Option<&ArtifactContent>,
    ) -> Result<BaseArtifact>;

    /// Sequencing-only creation path for derived artifacts. Links the new
    /// artifact to its source; not reachable from the upstream caller
    /// contract.
    async fn persist_derived_artifact(
        &self,
        artifact: BaseArtifact,
        source: Uuid,
    ) -> Result<BaseArtifact>;

    /// Fetch an artifact's metadata. Returns `None` when the UUID is
    /// unknown or the stored artifact does not belong to the given type.
    async fn get_artifact(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<Option<BaseArtifact>>;

    /// Fetch an artifact's metadata by UUID alone, whatever its stored
    /// type. Lets callers distinguish an unknown UUID from a type
    /// mismatch.
    async fn get_artifact_by_uuid(&self, uuid: Uuid) -> Result<Option<BaseArtifact>>;

    /// Update an artifact's metadata. Enforces optimistic concurrency: the
    /// candidate's version must match the stored version or the call fails
    /// with `Conflict`.
    async fn update_artifact(
        &self,
        artifact: BaseArtifact,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact>;

    /// Attach or replace an artifact's binary content, updating its content
    /// descriptors
    async fn update_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
        content: &ArtifactContent,
    ) -> Result<BaseArtifact>;

    /// Delete an artifact, returning a snapshot of the deleted metadata.
    /// Cascades to derived artifacts sequenced from it.
    async fn delete_artifact(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact>;

    /// Remove an artifact's binary content, keeping the metadata row
    async fn delete_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact>;

    /// Read back an artifact's binary content
    async fn get_artifact_content(&self, uuid: Uuid, artifact_type: &ArtifactType)
        -> Result<Vec<u8>>;

    /// Persist an ordered batch with all-or-nothing semantics: either every
    /// entry is visible afterwards, or none are.
    ///
    /// The default implementation simulates atomicity for engines without
    /// native transactions: entries are persisted in order, and on the first
    /// failure every already-written sibling is removed with a compensating
    /// delete before the error propagates. Engines with real transactions
    /// should override this.
    async fn batch_execute(&self, entries: &mut [BatchEntry]) -> Result<Vec<BaseArtifact>> {
        let mut persisted: Vec<(Uuid, ArtifactType)> = Vec::new();
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries.iter() {
            match self
                .persist_artifact(entry.artifact.clone(), entry.content.as_ref())
                .await
            {
                Ok(artifact) => {
                    if let Some(uuid) = artifact.uuid {
                        persisted.push((uuid, artifact.artifact_type.clone()));
                    }
                    results.push(artifact);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %entry.path,
                        error = %e,
                        "batch entry failed; rolling back {} sibling(s)",
                        persisted.len()
                    );
                    for (uuid, artifact_type) in persisted.iter().rev() {
                        if let Err(rollback_err) =
                            self.delete_artifact(*uuid, artifact_type).await
                        {
                            tracing::error!(
                                uuid = %uuid,
                                error = %rollback_err,
                                "compensating delete failed during batch rollback"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(results)
    }
}
