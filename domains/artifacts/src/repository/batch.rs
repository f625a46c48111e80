//! Atomic multi-artifact persistence unit
//!
//! Archive expansion appends every accepted member to a [`BatchUnit`] rather
//! than persisting members individually; the whole unit then executes
//! through the gateway's all-or-nothing batch operation. The unit owns its
//! members' content only for the duration of the request and releases it on
//! every exit path.

use strata_common::Result;

use crate::domain::content::ArtifactContent;
use crate::domain::entities::BaseArtifact;
use crate::repository::gateway::{BatchEntry, PersistenceGateway};

/// Ordered collection of (artifact, content, path) triples with a single
/// execute operation
#[derive(Debug, Default)]
pub struct BatchUnit {
    entries: Vec<BatchEntry>,
}

impl BatchUnit {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry. Order is preserved through execution.
    pub fn add(
        &mut self,
        artifact: BaseArtifact,
        content: Option<ArtifactContent>,
        path: impl Into<String>,
    ) {
        self.entries.push(BatchEntry {
            artifact,
            content,
            path: path.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Execute the batch atomically through the gateway. Either every entry
    /// is persisted and visible, or none are. Member content is released
    /// whether execution succeeds or fails.
    pub async fn execute(mut self, gateway: &dyn PersistenceGateway) -> Result<Vec<BaseArtifact>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(entries = self.entries.len(), "executing artifact batch");
        let result = gateway.batch_execute(&mut self.entries).await;

        for entry in &mut self.entries {
            if let Some(content) = entry.content.as_mut() {
                content.cleanup();
            }
        }

        result
    }
}
