//! Artifact lifecycle event fan-out
//!
//! Observers are notified after each successful persistence operation, once
//! per operation. An observer failure never fails the operation that
//! triggered it: errors are logged and swallowed, and the remaining
//! observers still run.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use strata_artifacts::BaseArtifact;
use strata_common::Result;

pub mod sequencing;

pub use sequencing::{ArtifactSequencer, SequencingListener};

/// Observer of artifact lifecycle events
#[async_trait]
pub trait ArtifactObserver: Send + Sync {
    /// A new artifact was persisted
    async fn on_created(&self, artifact: &BaseArtifact) -> Result<()>;

    /// An artifact's metadata or content changed. `old` is the snapshot
    /// before the change.
    async fn on_updated(&self, new: &BaseArtifact, old: &BaseArtifact) -> Result<()>;

    /// An artifact was deleted; `artifact` is the final snapshot
    async fn on_deleted(&self, artifact: &BaseArtifact) -> Result<()>;
}

/// Fan-out of lifecycle events to every registered observer
#[derive(Clone, Default)]
pub struct EventPublisher {
    observers: Vec<Arc<dyn ArtifactObserver>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn ArtifactObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub async fn publish_created(&self, artifact: &BaseArtifact) {
        for observer in &self.observers {
            if let Err(e) = observer.on_created(artifact).await {
                tracing::warn!(
                    artifact = %artifact.name,
                    error = %e,
                    "observer failed handling created event"
                );
            }
        }
    }

    pub async fn publish_updated(&self, new: &BaseArtifact, old: &BaseArtifact) {
        for observer in &self.observers {
            if let Err(e) = observer.on_updated(new, old).await {
                tracing::warn!(
                    artifact = %new.name,
                    error = %e,
                    "observer failed handling updated event"
                );
            }
        }
    }

    pub async fn publish_deleted(&self, artifact: &BaseArtifact) {
        for observer in &self.observers {
            if let Err(e) = observer.on_deleted(artifact).await {
                tracing::warn!(
                    artifact = %artifact.name,
                    error = %e,
                    "observer failed handling deleted event"
                );
            }
        }
    }
}

/// Lifecycle event captured by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Created { name: String },
    Updated { name: String, old_version: i64 },
    Deleted { name: String },
}

/// Observer that records every event in memory, for tests and local
/// development
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("recording lock poisoned").clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().expect("recording lock poisoned").len()
    }

    pub fn clear(&self) {
        self.events.lock().expect("recording lock poisoned").clear();
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock().expect("recording lock poisoned").push(event);
    }
}

#[async_trait]
impl ArtifactObserver for RecordingObserver {
    async fn on_created(&self, artifact: &BaseArtifact) -> Result<()> {
        self.record(RecordedEvent::Created {
            name: artifact.name.clone(),
        });
        Ok(())
    }

    async fn on_updated(&self, new: &BaseArtifact, old: &BaseArtifact) -> Result<()> {
        self.record(RecordedEvent::Updated {
            name: new.name.clone(),
            old_version: old.version,
        });
        Ok(())
    }

    async fn on_deleted(&self, artifact: &BaseArtifact) -> Result<()> {
        self.record(RecordedEvent::Deleted {
            name: artifact.name.clone(),
        });
        Ok(())
    }
}
