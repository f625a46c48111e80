//! Asynchronous derivation of artifacts from committed content
//!
//! The storage engine emits a `NodeSequenced` event after every content
//! commit. The listener here consumes those events on a background task,
//! runs the registered sequencers against the committed content, and
//! persists whatever derived artifacts they produce.
//!
//! Delivery is at-least-once: the engine may redeliver an event after a
//! crash. Derived UUIDs are deterministic (hashed from the source UUID and
//! the derived artifact's name), so a redelivered event collides with the
//! already-persisted children and is skipped.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use strata_artifacts::{BaseArtifact, EngineEvent, PersistenceGateway};
use strata_catalog::ArtifactType;
use strata_common::{Error, Result};

use crate::EventPublisher;

/// Derivation hook: inspects committed content and produces derived
/// artifacts from it
#[async_trait]
pub trait ArtifactSequencer: Send + Sync {
    /// Whether this sequencer handles the given type
    fn accepts(&self, artifact_type: &ArtifactType) -> bool;

    /// Derive artifacts from the source's committed content. Returned
    /// artifacts must carry derived types; UUIDs are assigned by the
    /// listener.
    async fn derive(&self, source: &BaseArtifact, content: &[u8]) -> Result<Vec<BaseArtifact>>;
}

/// Deterministic UUID for a derived artifact, keyed on the source UUID and
/// the derived artifact's name. Stable across event redeliveries.
pub fn derived_uuid(source: Uuid, name: &str) -> Uuid {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Background consumer of engine sequencing events
pub struct SequencingListener {
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Process-wide listener slot. First registration wins; later callers get
/// the existing handle back.
static LISTENER: Mutex<Option<Arc<SequencingListener>>> = Mutex::new(None);

impl SequencingListener {
    /// Spawn a listener on the given event stream. Prefer [`register`] for
    /// the process-wide singleton; this constructor exists for embedding
    /// multiple repositories in one process.
    ///
    /// [`register`]: SequencingListener::register
    pub fn spawn(
        mut events: mpsc::Receiver<EngineEvent>,
        gateway: Arc<dyn PersistenceGateway>,
        sequencers: Vec<Arc<dyn ArtifactSequencer>>,
        publisher: EventPublisher,
    ) -> Arc<Self> {
        let task = tokio::spawn(async move {
            tracing::info!(sequencers = sequencers.len(), "sequencing listener started");
            while let Some(event) = events.recv().await {
                handle_event(event, &*gateway, &sequencers, &publisher).await;
            }
            tracing::info!("sequencing event stream closed; listener exiting");
        });

        Arc::new(Self {
            task: Mutex::new(Some(task)),
        })
    }

    /// Register the process-wide listener. The first caller spawns it;
    /// every later caller gets the existing handle and its own arguments
    /// are dropped (including the receiver).
    pub fn register(
        events: mpsc::Receiver<EngineEvent>,
        gateway: Arc<dyn PersistenceGateway>,
        sequencers: Vec<Arc<dyn ArtifactSequencer>>,
        publisher: EventPublisher,
    ) -> Arc<Self> {
        let mut slot = LISTENER.lock().expect("listener slot poisoned");
        if let Some(existing) = slot.as_ref() {
            tracing::warn!("sequencing listener already registered; reusing existing handle");
            return existing.clone();
        }
        let listener = Self::spawn(events, gateway, sequencers, publisher);
        *slot = Some(listener.clone());
        listener
    }

    /// Tear down the process-wide listener. Safe to call when nothing is
    /// registered.
    pub fn shutdown() {
        let taken = LISTENER
            .lock()
            .expect("listener slot poisoned")
            .take();
        if let Some(listener) = taken {
            listener.stop();
            tracing::info!("sequencing listener shut down");
        }
    }

    /// Stop this listener's background task
    pub fn stop(&self) {
        if let Some(task) = self
            .task
            .lock()
            .expect("listener task lock poisoned")
            .take()
        {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("listener task lock poisoned")
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

async fn handle_event(
    event: EngineEvent,
    gateway: &dyn PersistenceGateway,
    sequencers: &[Arc<dyn ArtifactSequencer>],
    publisher: &EventPublisher,
) {
    let EngineEvent::NodeSequenced {
        uuid,
        artifact_type,
        content_hash,
    } = event;

    let accepting: Vec<&Arc<dyn ArtifactSequencer>> = sequencers
        .iter()
        .filter(|sequencer| sequencer.accepts(&artifact_type))
        .collect();
    if accepting.is_empty() {
        return;
    }

    tracing::debug!(
        source = %uuid,
        artifact_type = %artifact_type,
        content_hash = %content_hash,
        "sequencing committed content"
    );

    if let Err(e) = sequence_source(uuid, &artifact_type, &accepting, gateway, publisher).await {
        // A failed derivation never takes the listener down; the event may
        // be redelivered later.
        tracing::error!(source = %uuid, error = %e, "sequencing failed");
    }
}

async fn sequence_source(
    uuid: Uuid,
    artifact_type: &ArtifactType,
    sequencers: &[&Arc<dyn ArtifactSequencer>],
    gateway: &dyn PersistenceGateway,
    publisher: &EventPublisher,
) -> Result<()> {
    let source = match gateway.get_artifact(uuid, artifact_type).await? {
        Some(source) => source,
        None => {
            // Deleted between commit and delivery
            tracing::warn!(source = %uuid, "sequencing source no longer exists; skipping");
            return Ok(());
        }
    };
    let content = gateway.get_artifact_content(uuid, artifact_type).await?;

    for sequencer in sequencers {
        let derived = sequencer.derive(&source, &content).await?;
        for mut artifact in derived {
            artifact.uuid = Some(derived_uuid(uuid, &artifact.name));
            match gateway.persist_derived_artifact(artifact, uuid).await {
                Ok(persisted) => {
                    tracing::debug!(
                        source = %uuid,
                        derived = %persisted.name,
                        "persisted derived artifact"
                    );
                    publisher.publish_created(&persisted).await;
                }
                Err(Error::AlreadyExists(existing)) => {
                    tracing::debug!(
                        source = %uuid,
                        derived = %existing,
                        "derived artifact already persisted; skipping redelivery"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}
