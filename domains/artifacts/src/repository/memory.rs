//! In-memory persistence gateway
//!
//! Reference engine for tests and for integrators that have no real store
//! wired up yet. Implements the full gateway contract: optimistic
//! versioning, derived-type guards, cascade deletion of sequenced children,
//! content-addressed descriptors, and `NodeSequenced` event emission after
//! every content commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use strata_catalog::ArtifactType;
use strata_common::{sha256_hex, Error, Result};

use crate::domain::content::ArtifactContent;
use crate::domain::entities::{BaseArtifact, ContentDescriptor, RELATED_DOCUMENT};
use crate::repository::gateway::{BatchEntry, EngineEvent, PersistenceGateway};

#[derive(Debug, Clone)]
struct StoredArtifact {
    artifact: BaseArtifact,
    content: Option<Vec<u8>>,
    /// Source artifact this row was sequenced from, for cascade deletion
    derived_from: Option<Uuid>,
}

/// In-memory storage engine implementing [`PersistenceGateway`]
#[derive(Clone)]
pub struct InMemoryGateway {
    store: Arc<Mutex<HashMap<Uuid, StoredArtifact>>>,
    events: mpsc::Sender<EngineEvent>,
    receiver: Arc<Mutex<Option<mpsc::Receiver<EngineEvent>>>>,
}

impl InMemoryGateway {
    pub fn new(event_capacity: usize) -> Self {
        let (events, receiver) = mpsc::channel(event_capacity);
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            events,
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    pub fn from_config(config: &strata_common::Config) -> Self {
        Self::new(config.sequencing_channel_capacity)
    }

    /// Claim the engine's event stream. Yields `Some` exactly once; the
    /// sequencing listener is the intended (single) consumer.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.receiver
            .lock()
            .expect("event receiver lock poisoned")
            .take()
    }

    /// Emit an engine event. Also used by tests to simulate the engine
    /// redelivering an identical event.
    pub fn emit_event(&self, event: EngineEvent) {
        // Notification is best-effort; a full channel drops the event the
        // same way a crashed listener would miss it (delayed derivation,
        // not data loss).
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(error = %e, "sequencing event dropped");
        }
    }

    /// Number of artifacts currently stored
    pub fn artifact_count(&self) -> usize {
        self.store.lock().expect("store lock poisoned").len()
    }

    /// Snapshot of every stored artifact, in no particular order
    pub fn artifacts(&self) -> Vec<BaseArtifact> {
        self.store
            .lock()
            .expect("store lock poisoned")
            .values()
            .map(|stored| stored.artifact.clone())
            .collect()
    }

    fn type_matches(stored: &BaseArtifact, requested: &ArtifactType) -> bool {
        stored.artifact_type.model == requested.model
            && stored.artifact_type.name == requested.name
    }

    fn descriptor_for(bytes: &[u8]) -> ContentDescriptor {
        ContentDescriptor {
            size_bytes: bytes.len() as u64,
            content_hash: sha256_hex(bytes),
        }
    }

    /// Write a new artifact row without emitting the engine event; callers
    /// emit it once the commit is final (immediately for single persists,
    /// after the whole batch for batched ones).
    fn store_artifact(
        &self,
        mut artifact: BaseArtifact,
        bytes: Option<Vec<u8>>,
    ) -> Result<(BaseArtifact, Option<EngineEvent>)> {
        if artifact.artifact_type.is_derived {
            return Err(Error::DerivedArtifactCreate(
                artifact.artifact_type.name.clone(),
            ));
        }

        let mut store = self.store.lock().expect("store lock poisoned");

        let uuid = match artifact.uuid {
            Some(uuid) if store.contains_key(&uuid) => {
                return Err(Error::AlreadyExists(uuid));
            }
            Some(uuid) => uuid,
            None => Uuid::new_v4(),
        };
        artifact.uuid = Some(uuid);
        artifact.version = 1;
        artifact.last_modified_at = Utc::now();
        if let Some(bytes) = &bytes {
            artifact.content = Some(Self::descriptor_for(bytes));
        }

        store.insert(
            uuid,
            StoredArtifact {
                artifact: artifact.clone(),
                content: bytes.clone(),
                derived_from: None,
            },
        );

        let event = bytes.map(|bytes| EngineEvent::NodeSequenced {
            uuid,
            artifact_type: artifact.artifact_type.clone(),
            content_hash: sha256_hex(&bytes),
        });
        Ok((artifact, event))
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn persist_artifact(
        &self,
        artifact: BaseArtifact,
        content: Option<&ArtifactContent>,
    ) -> Result<BaseArtifact> {
        // Read content outside the lock; the store mutex must never be held
        // across I/O.
        let bytes = match content {
            Some(content) => Some(content.bytes()?),
            None => None,
        };

        let (persisted, event) = self.store_artifact(artifact, bytes)?;
        if let Some(event) = event {
            self.emit_event(event);
        }
        Ok(persisted)
    }

    async fn persist_derived_artifact(
        &self,
        mut artifact: BaseArtifact,
        source: Uuid,
    ) -> Result<BaseArtifact> {
        if !artifact.artifact_type.is_derived {
            return Err(Error::Validation(format!(
                "type {} is not a derived type",
                artifact.artifact_type
            )));
        }

        let mut store = self.store.lock().expect("store lock poisoned");
        if !store.contains_key(&source) {
            return Err(Error::ArtifactNotFound(source));
        }

        let uuid = match artifact.uuid {
            Some(uuid) if store.contains_key(&uuid) => {
                return Err(Error::AlreadyExists(uuid));
            }
            Some(uuid) => uuid,
            None => Uuid::new_v4(),
        };
        artifact.uuid = Some(uuid);
        artifact.version = 1;
        artifact.last_modified_at = Utc::now();
        artifact.add_generic_relationship(RELATED_DOCUMENT, source);

        store.insert(
            uuid,
            StoredArtifact {
                artifact: artifact.clone(),
                content: None,
                derived_from: Some(source),
            },
        );

        Ok(artifact)
    }

    async fn get_artifact(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<Option<BaseArtifact>> {
        let store = self.store.lock().expect("store lock poisoned");
        Ok(store
            .get(&uuid)
            .filter(|stored| Self::type_matches(&stored.artifact, artifact_type))
            .map(|stored| stored.artifact.clone()))
    }

    async fn get_artifact_by_uuid(&self, uuid: Uuid) -> Result<Option<BaseArtifact>> {
        let store = self.store.lock().expect("store lock poisoned");
        Ok(store.get(&uuid).map(|stored| stored.artifact.clone()))
    }

    async fn update_artifact(
        &self,
        mut artifact: BaseArtifact,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact> {
        let uuid = artifact
            .uuid
            .ok_or_else(|| Error::Validation("update requires a persisted UUID".to_string()))?;

        let mut store = self.store.lock().expect("store lock poisoned");
        let stored = store.get_mut(&uuid).ok_or(Error::ArtifactNotFound(uuid))?;

        if !Self::type_matches(&stored.artifact, artifact_type) {
            return Err(Error::WrongModel {
                uuid,
                model: artifact_type.model.clone(),
                artifact_type: artifact_type.name.clone(),
            });
        }
        if artifact.version != stored.artifact.version {
            return Err(Error::Conflict(format!(
                "artifact {} was modified: stored version {}, caller read version {}",
                uuid, stored.artifact.version, artifact.version
            )));
        }

        artifact.version = stored.artifact.version + 1;
        artifact.created_at = stored.artifact.created_at;
        artifact.content = stored.artifact.content.clone();
        artifact.last_modified_at = Utc::now();

        stored.artifact = artifact.clone();
        Ok(artifact)
    }

    async fn update_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
        content: &ArtifactContent,
    ) -> Result<BaseArtifact> {
        if artifact_type.is_derived {
            return Err(Error::DerivedArtifactCreate(artifact_type.name.clone()));
        }

        let bytes = content.bytes()?;
        let updated = {
            let mut store = self.store.lock().expect("store lock poisoned");
            let stored = store.get_mut(&uuid).ok_or(Error::ArtifactNotFound(uuid))?;

            if !Self::type_matches(&stored.artifact, artifact_type) {
                return Err(Error::WrongModel {
                    uuid,
                    model: artifact_type.model.clone(),
                    artifact_type: artifact_type.name.clone(),
                });
            }

            stored.artifact.content = Some(Self::descriptor_for(&bytes));
            stored.artifact.version += 1;
            stored.artifact.last_modified_at = Utc::now();
            stored.content = Some(bytes.clone());
            stored.artifact.clone()
        };

        self.emit_event(EngineEvent::NodeSequenced {
            uuid,
            artifact_type: updated.artifact_type.clone(),
            content_hash: sha256_hex(&bytes),
        });

        Ok(updated)
    }

    async fn delete_artifact(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact> {
        if artifact_type.is_derived {
            return Err(Error::DerivedArtifactDelete(artifact_type.name.clone()));
        }

        let mut store = self.store.lock().expect("store lock poisoned");
        let stored = store.get(&uuid).ok_or(Error::ArtifactNotFound(uuid))?;
        if stored.artifact.artifact_type.is_derived {
            return Err(Error::DerivedArtifactDelete(
                stored.artifact.artifact_type.name.clone(),
            ));
        }
        if !Self::type_matches(&stored.artifact, artifact_type) {
            return Err(Error::ArtifactNotFound(uuid));
        }

        let snapshot = store
            .remove(&uuid)
            .ok_or(Error::ArtifactNotFound(uuid))?
            .artifact;

        // Cascade: sequenced children only live as a byproduct of their
        // source artifact.
        let children: Vec<Uuid> = store
            .iter()
            .filter(|(_, stored)| stored.derived_from == Some(uuid))
            .map(|(child, _)| *child)
            .collect();
        for child in children {
            store.remove(&child);
            tracing::debug!(source = %uuid, derived = %child, "cascade-deleted derived artifact");
        }

        Ok(snapshot)
    }

    async fn delete_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact> {
        if artifact_type.is_derived {
            return Err(Error::DerivedArtifactDelete(artifact_type.name.clone()));
        }

        let mut store = self.store.lock().expect("store lock poisoned");
        let stored = store.get_mut(&uuid).ok_or(Error::ArtifactNotFound(uuid))?;
        if !Self::type_matches(&stored.artifact, artifact_type) {
            return Err(Error::ArtifactNotFound(uuid));
        }

        stored.content = None;
        stored.artifact.content = None;
        stored.artifact.version += 1;
        stored.artifact.last_modified_at = Utc::now();
        Ok(stored.artifact.clone())
    }

    async fn get_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<Vec<u8>> {
        let store = self.store.lock().expect("store lock poisoned");
        let stored = store.get(&uuid).ok_or(Error::ArtifactNotFound(uuid))?;
        if !Self::type_matches(&stored.artifact, artifact_type) {
            return Err(Error::ArtifactNotFound(uuid));
        }
        match &stored.content {
            Some(bytes) if !bytes.is_empty() => Ok(bytes.clone()),
            _ => Err(Error::ContentNotFound(uuid)),
        }
    }

    /// Batch persistence with sequencing events held back until the whole
    /// batch has committed: an entry removed by the compensating rollback
    /// must never be sequenced.
    async fn batch_execute(&self, entries: &mut [BatchEntry]) -> Result<Vec<BaseArtifact>> {
        let mut persisted: Vec<(Uuid, ArtifactType)> = Vec::new();
        let mut results = Vec::with_capacity(entries.len());
        let mut events = Vec::new();

        for entry in entries.iter() {
            let stored = match &entry.content {
                Some(content) => content.bytes().map(Some),
                None => Ok(None),
            }
            .and_then(|bytes| self.store_artifact(entry.artifact.clone(), bytes));
            match stored {
                Ok((artifact, event)) => {
                    if let Some(uuid) = artifact.uuid {
                        persisted.push((uuid, artifact.artifact_type.clone()));
                    }
                    events.extend(event);
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

        for event in events {
            self.emit_event(event);
        }
        Ok(results)
    }
}
