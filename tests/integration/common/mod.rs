//! Shared fixtures for the integration tests

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;
use zip::write::SimpleFileOptions;

use strata_artifacts::{
    ArtifactContent, BaseArtifact, InMemoryGateway, PersistenceGateway,
};
use strata_catalog::{ArtifactType, TypeCatalog};
use strata_common::{Error, Result};
use strata_events::{EventPublisher, RecordingObserver};
use strata_ingestion::{DetectorChain, IngestionService};

/// Build an in-memory zip from (name, bytes) members
pub fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        for (name, bytes) in members {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

pub struct Fixture {
    pub service: IngestionService,
    pub gateway: InMemoryGateway,
    pub observer: Arc<RecordingObserver>,
}

/// A service wired to a fresh in-memory engine and a recording observer
pub fn fixture() -> Fixture {
    strata_common::init_tracing(&strata_common::Config::default().rust_log);
    let gateway = InMemoryGateway::new(64);
    let catalog = TypeCatalog::core();
    let detectors = DetectorChain::standard(&catalog).unwrap();
    let observer = Arc::new(RecordingObserver::new());
    let mut publisher = EventPublisher::new();
    publisher.register(observer.clone());

    let service = IngestionService::new(Arc::new(gateway.clone()), catalog, detectors, publisher);
    Fixture {
        service,
        gateway,
        observer,
    }
}

/// Gateway decorator that records the order of persistence operations and
/// can inject a failure when persisting an artifact with a given name
#[derive(Clone)]
pub struct TrackingGateway {
    inner: InMemoryGateway,
    ops: Arc<Mutex<Vec<String>>>,
    fail_on_persist_of: Option<String>,
    fail_on_content_of: Option<String>,
}

impl TrackingGateway {
    pub fn new(inner: InMemoryGateway) -> Self {
        Self {
            inner,
            ops: Arc::new(Mutex::new(Vec::new())),
            fail_on_persist_of: None,
            fail_on_content_of: None,
        }
    }

    pub fn failing_on(inner: InMemoryGateway, name: &str) -> Self {
        Self {
            fail_on_persist_of: Some(name.to_string()),
            ..Self::new(inner)
        }
    }

    pub fn failing_on_content(inner: InMemoryGateway, name: &str) -> Self {
        Self {
            fail_on_content_of: Some(name.to_string()),
            ..Self::new(inner)
        }
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl PersistenceGateway for TrackingGateway {
    async fn persist_artifact(
        &self,
        artifact: BaseArtifact,
        content: Option<&ArtifactContent>,
    ) -> Result<BaseArtifact> {
        if self.fail_on_persist_of.as_deref() == Some(artifact.name.as_str()) {
            self.record(format!("persist-failed:{}", artifact.name));
            return Err(Error::Persistence("injected failure".to_string()));
        }
        self.record(format!("persist:{}", artifact.name));
        self.inner.persist_artifact(artifact, content).await
    }

    async fn persist_derived_artifact(
        &self,
        artifact: BaseArtifact,
        source: Uuid,
    ) -> Result<BaseArtifact> {
        self.record(format!("persist-derived:{}", artifact.name));
        self.inner.persist_derived_artifact(artifact, source).await
    }

    async fn get_artifact(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<Option<BaseArtifact>> {
        self.inner.get_artifact(uuid, artifact_type).await
    }

    async fn get_artifact_by_uuid(&self, uuid: Uuid) -> Result<Option<BaseArtifact>> {
        self.inner.get_artifact_by_uuid(uuid).await
    }

    async fn update_artifact(
        &self,
        artifact: BaseArtifact,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact> {
        self.record(format!("update:{}", artifact.name));
        self.inner.update_artifact(artifact, artifact_type).await
    }

    async fn update_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
        content: &ArtifactContent,
    ) -> Result<BaseArtifact> {
        if self.fail_on_content_of.as_deref() == Some(content.filename()) {
            self.record(format!("update-content-failed:{}", content.filename()));
            return Err(Error::Persistence("injected failure".to_string()));
        }
        self.record(format!("update-content:{}", content.filename()));
        self.inner
            .update_artifact_content(uuid, artifact_type, content)
            .await
    }

    async fn delete_artifact(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact> {
        let snapshot = self.inner.delete_artifact(uuid, artifact_type).await?;
        self.record(format!("delete:{}", snapshot.name));
        Ok(snapshot)
    }

    async fn delete_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<BaseArtifact> {
        let updated = self
            .inner
            .delete_artifact_content(uuid, artifact_type)
            .await?;
        self.record(format!("delete-content:{}", updated.name));
        Ok(updated)
    }

    async fn get_artifact_content(
        &self,
        uuid: Uuid,
        artifact_type: &ArtifactType,
    ) -> Result<Vec<u8>> {
        self.inner.get_artifact_content(uuid, artifact_type).await
    }
}

/// A service over a [`TrackingGateway`]
pub fn tracking_fixture(gateway: TrackingGateway) -> IngestionService {
    let catalog = TypeCatalog::core();
    let detectors = DetectorChain::standard(&catalog).unwrap();
    IngestionService::new(
        Arc::new(gateway),
        catalog,
        detectors,
        EventPublisher::new(),
    )
}
