//! Sequencing flow: engine events drive derived-artifact creation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;

use strata_artifacts::{
    ArtifactContent, BaseArtifact, EngineEvent, InMemoryGateway, PersistenceGateway,
    RELATED_DOCUMENT,
};
use strata_catalog::{ArtifactType, TypeCatalog};
use strata_common::Result;
use strata_events::sequencing::derived_uuid;
use strata_events::{
    ArtifactSequencer, EventPublisher, RecordedEvent, RecordingObserver, SequencingListener,
};
use strata_ingestion::{DetectorChain, IngestionService};

/// Derives one fragment per XML document
struct FragmentSequencer;

#[async_trait]
impl ArtifactSequencer for FragmentSequencer {
    fn accepts(&self, artifact_type: &ArtifactType) -> bool {
        artifact_type.name == "XmlDocument"
    }

    async fn derive(&self, source: &BaseArtifact, _content: &[u8]) -> Result<Vec<BaseArtifact>> {
        let fragment_type = TypeCatalog::core()
            .resolve("core", "DocumentFragment")
            .unwrap();
        Ok(vec![BaseArtifact::new(
            format!("{}#root", source.name),
            fragment_type,
        )])
    }
}

struct Stack {
    service: IngestionService,
    gateway: InMemoryGateway,
    observer: Arc<RecordingObserver>,
    listener: Arc<SequencingListener>,
}

fn stack() -> Stack {
    let gateway = InMemoryGateway::new(64);
    let events = gateway.take_event_receiver().unwrap();
    let catalog = TypeCatalog::core();
    let detectors = DetectorChain::standard(&catalog).unwrap();
    let observer = Arc::new(RecordingObserver::new());
    let mut publisher = EventPublisher::new();
    publisher.register(observer.clone());

    let listener = SequencingListener::spawn(
        events,
        Arc::new(gateway.clone()),
        vec![Arc::new(FragmentSequencer)],
        publisher.clone(),
    );
    let service = IngestionService::new(Arc::new(gateway.clone()), catalog, detectors, publisher);
    Stack {
        service,
        gateway,
        observer,
        listener,
    }
}

async fn wait_for_count(gateway: &InMemoryGateway, expected: usize) {
    for _ in 0..200 {
        if gateway.artifact_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "gateway never reached {expected} artifacts (got {})",
        gateway.artifact_count()
    );
}

#[tokio::test]
async fn test_upload_triggers_derivation() {
    let s = stack();
    let source = s
        .service
        .upload(
            Some("a.xml"),
            ArtifactContent::from_bytes("", b"<?xml version=\"1.0\"?><a/>".to_vec()),
            None,
        )
        .await
        .unwrap();
    let source_uuid = source.uuid.unwrap();

    // Source plus the derived fragment
    wait_for_count(&s.gateway, 2).await;

    let fragment_type = TypeCatalog::core()
        .resolve("core", "DocumentFragment")
        .unwrap();
    let fragment = s
        .gateway
        .get_artifact(derived_uuid(source_uuid, "a.xml#root"), &fragment_type)
        .await
        .unwrap()
        .expect("derived fragment not persisted");
    let rel = fragment.relationship(RELATED_DOCUMENT).unwrap();
    assert_eq!(rel.targets, vec![source_uuid]);

    // Created events for the source and for the fragment
    for _ in 0..200 {
        if s.observer.event_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let events = s.observer.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, RecordedEvent::Created { name } if name == "a.xml#root")));

    s.listener.stop();
}

#[tokio::test]
async fn test_event_redelivery_is_a_noop() {
    let s = stack();
    let source = s
        .service
        .upload(
            Some("a.xml"),
            ArtifactContent::from_bytes("", b"<?xml version=\"1.0\"?><a/>".to_vec()),
            None,
        )
        .await
        .unwrap();
    wait_for_count(&s.gateway, 2).await;

    s.gateway.emit_event(EngineEvent::NodeSequenced {
        uuid: source.uuid.unwrap(),
        artifact_type: source.artifact_type.clone(),
        content_hash: "redelivered".to_string(),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(s.gateway.artifact_count(), 2);

    s.listener.stop();
}

#[tokio::test]
async fn test_deleting_source_cascades_to_derived() {
    let s = stack();
    let source = s
        .service
        .upload(
            Some("a.xml"),
            ArtifactContent::from_bytes("", b"<?xml version=\"1.0\"?><a/>".to_vec()),
            None,
        )
        .await
        .unwrap();
    let source_uuid = source.uuid.unwrap();
    wait_for_count(&s.gateway, 2).await;

    // Derived fragments cannot be deleted directly
    let err = s
        .service
        .delete(
            derived_uuid(source_uuid, "a.xml#root"),
            "core",
            "DocumentFragment",
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "DERIVED_ARTIFACT_DELETE");
    assert_eq!(s.gateway.artifact_count(), 2);

    // Deleting the source takes the fragment with it
    s.service
        .delete(source_uuid, "core", "XmlDocument")
        .await
        .unwrap();
    assert_eq!(s.gateway.artifact_count(), 0);

    s.listener.stop();
}

#[tokio::test]
#[serial]
async fn test_process_wide_registration_lifecycle() {
    SequencingListener::shutdown();

    let gateway = InMemoryGateway::new(64);
    let events = gateway.take_event_receiver().unwrap();
    let first = SequencingListener::register(
        events,
        Arc::new(gateway.clone()),
        vec![Arc::new(FragmentSequencer)],
        EventPublisher::new(),
    );
    assert!(first.is_running());

    // Concurrent second registration observes the existing listener
    let other = InMemoryGateway::new(64);
    let other_events = other.take_event_receiver().unwrap();
    let second = SequencingListener::register(
        other_events,
        Arc::new(other),
        vec![],
        EventPublisher::new(),
    );
    assert!(Arc::ptr_eq(&first, &second));

    // Events still flow to the registered listener
    gateway
        .persist_artifact(
            BaseArtifact::new(
                "a.xml",
                TypeCatalog::core().resolve("core", "XmlDocument").unwrap(),
            ),
            Some(&ArtifactContent::from_bytes(
                "a.xml",
                b"<?xml version=\"1.0\"?><a/>".to_vec(),
            )),
        )
        .await
        .unwrap();
    wait_for_count(&gateway, 2).await;

    SequencingListener::shutdown();
    assert!(!first.is_running());
}
