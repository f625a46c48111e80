//! The caller-facing ingestion service
//!
//! Composes the detector chain, verifier, archive expansion, persistence
//! gateway, and event fan-out into the operations an upstream transport
//! layer calls. Every operation publishes lifecycle events only after the
//! gateway has committed, and releases content handles and archive contexts
//! on every exit path.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use strata_artifacts::{
    ArtifactContent, ArtifactVerifier, BaseArtifact, BatchUnit, PersistenceGateway,
    EXPANDED_ARCHIVE_PATH_PROPERTY, EXPANDED_FROM_DOCUMENT,
};
use strata_catalog::{ArtifactType, TypeCatalog, TypeRule};
use strata_common::{Config, Error, Result};
use strata_events::EventPublisher;

use crate::archive::ArchiveContext;
use crate::detector::DetectorChain;
use crate::mime::determine_mime_type;

/// How many bytes the service sniffs for MIME resolution
const MIME_SNIFF_LEN: usize = 512;

pub struct IngestionService {
    gateway: Arc<dyn PersistenceGateway>,
    catalog: TypeCatalog,
    detectors: DetectorChain,
    publisher: EventPublisher,
    /// Root directory for archive expansion work dirs
    work_dir_root: PathBuf,
}

impl IngestionService {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        catalog: TypeCatalog,
        detectors: DetectorChain,
        publisher: EventPublisher,
    ) -> Self {
        Self::with_config(gateway, catalog, detectors, publisher, &Config::default())
    }

    pub fn with_config(
        gateway: Arc<dyn PersistenceGateway>,
        catalog: TypeCatalog,
        detectors: DetectorChain,
        publisher: EventPublisher,
        config: &Config,
    ) -> Self {
        Self {
            gateway,
            catalog,
            detectors,
            publisher,
            work_dir_root: config.work_dir_root.clone(),
        }
    }

    /// Create a metadata-only artifact from an explicit (model, type) hint.
    ///
    /// Document-family types carry binary content and cannot be created
    /// this way; derived types cannot be created directly at all.
    pub async fn create_metadata(
        &self,
        model: &str,
        type_name: &str,
        artifact: BaseArtifact,
    ) -> Result<BaseArtifact> {
        let ty = self.catalog.resolve(model, type_name)?;
        if ty.is_derived {
            return Err(Error::DerivedArtifactCreate(ty.name));
        }
        if ty.is_document {
            return Err(Error::InvalidArtifactCreation(format!(
                "document type {ty} requires content on creation"
            )));
        }

        self.verify_create(&ty, &artifact)?;
        let persisted = self.gateway.persist_artifact(artifact, None).await?;
        self.publisher.publish_created(&persisted).await;
        Ok(persisted)
    }

    /// Ingest a content payload: detect (or validate the hint), expand
    /// archives into child artifacts, persist, notify.
    ///
    /// `slug` is the caller-supplied name. A missing slug with a typed hint
    /// falls back to the type's default filename; a missing slug without a
    /// hint is rejected, since autodetection has nothing to name the
    /// artifact after.
    pub async fn upload(
        &self,
        slug: Option<&str>,
        mut content: ArtifactContent,
        hint: Option<(&str, &str)>,
    ) -> Result<BaseArtifact> {
        let result = self.upload_inner(slug, &mut content, hint).await;
        content.cleanup();
        result
    }

    async fn upload_inner(
        &self,
        slug: Option<&str>,
        content: &mut ArtifactContent,
        hint: Option<(&str, &str)>,
    ) -> Result<BaseArtifact> {
        if let Some(slug) = slug {
            content.set_filename(slug);
        }

        let ty = match hint {
            Some((model, type_name)) => {
                let ty = self.catalog.resolve(model, type_name)?;
                if ty.is_extended && !ty.is_document {
                    // An extended-type hint arriving with content means the
                    // caller wants an extended document.
                    self.catalog.extended_document()?
                } else {
                    ty
                }
            }
            None => {
                if slug.is_none() {
                    return Err(Error::FilenameRequired);
                }
                self.detectors.detect(content, None).ok_or_else(|| {
                    Error::UnknownArtifactType {
                        model: "autodetect".to_string(),
                        artifact_type: content.filename().to_string(),
                    }
                })?
            }
        };

        if ty.is_derived {
            return Err(Error::DerivedArtifactCreate(ty.name));
        }
        if slug.is_none() {
            content.set_filename(ty.default_filename());
        }

        let sniff = content.sniff(MIME_SNIFF_LEN)?;
        let ty = ty.clone().with_mime_type(determine_mime_type(
            content.filename(),
            &sniff,
            &ty,
        ));

        if self.detectors.allow_expansion(content, None) {
            return self.upload_archive(ty, content).await;
        }

        if !ty.is_document {
            return Err(Error::InvalidArtifactCreation(format!(
                "type {ty} cannot carry content"
            )));
        }

        let artifact = BaseArtifact::new(content.filename(), ty.clone());
        self.verify_create(&ty, &artifact)?;
        let persisted = self.gateway.persist_artifact(artifact, Some(content)).await?;
        self.publisher.publish_created(&persisted).await;
        Ok(persisted)
    }

    /// The archive pipeline. Ordering is load-bearing: the archive's
    /// metadata row is committed before any child references it, and the
    /// archive's own content is attached only after every child committed,
    /// so a half-expanded archive is never visible.
    async fn upload_archive(
        &self,
        ty: ArtifactType,
        content: &mut ArtifactContent,
    ) -> Result<BaseArtifact> {
        let artifact = BaseArtifact::new(content.filename(), ty.clone());
        self.verify_create(&ty, &artifact)?;
        let archive_row = self.gateway.persist_artifact(artifact, None).await?;
        let archive_uuid = archive_row.uuid.ok_or_else(|| {
            Error::Persistence("gateway returned a persisted artifact without a uuid".to_string())
        })?;

        let mut ctx = match ArchiveContext::create(content, ty.clone(), &self.work_dir_root) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.remove_aborted_archive_row(archive_uuid, &ty).await;
                return Err(e);
            }
        };
        let result = self
            .expand_and_persist(&mut ctx, archive_uuid, &ty, content)
            .await;
        ctx.cleanup();

        match result {
            Ok((archive, children)) => {
                self.publisher.publish_created(&archive).await;
                for child in &children {
                    self.publisher.publish_created(child).await;
                }
                Ok(archive)
            }
            Err(e) => {
                self.remove_aborted_archive_row(archive_uuid, &ty).await;
                Err(e)
            }
        }
    }

    async fn expand_and_persist(
        &self,
        ctx: &mut ArchiveContext,
        archive_uuid: Uuid,
        archive_type: &ArtifactType,
        content: &ArtifactContent,
    ) -> Result<(BaseArtifact, Vec<BaseArtifact>)> {
        let paths = ctx.expand()?;
        let mut batch = BatchUnit::new();

        for path in paths {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let member = ArtifactContent::from_file(&filename, &path);
            let archive_path = ctx.strip_work_dir(&path)?;

            let child_ty = match self.detectors.detect(&member, Some(ctx)) {
                Some(child_ty) => child_ty,
                None => {
                    // Permissive policy: unclaimed members are not errors
                    tracing::debug!(member = %archive_path, "no detector claimed archive member; skipping");
                    continue;
                }
            };
            let sniff = member.sniff(MIME_SNIFF_LEN)?;
            let child_ty = child_ty
                .clone()
                .with_mime_type(determine_mime_type(&filename, &sniff, &child_ty));

            let mut child = BaseArtifact::new(&filename, child_ty.clone());
            child.set_custom_property(EXPANDED_ARCHIVE_PATH_PROPERTY, &archive_path);
            child.add_generic_relationship(EXPANDED_FROM_DOCUMENT, archive_uuid);

            let rule = self.rule_for(&child_ty)?;
            let mut verifier = ArtifactVerifier::new(&child_ty, rule);
            verifier.add_known_target_type(archive_uuid, archive_type.name.clone());
            verifier.visit(&child);
            verifier.throw_error()?;

            batch.add(child, Some(member), archive_path);
        }

        let children = batch.execute(self.gateway.as_ref()).await?;

        // Content attachment marks the archive complete; it must not happen
        // if expansion failed partway. If it fails, the already-committed
        // children must go too, or they would reference a vanishing archive.
        match self
            .gateway
            .update_artifact_content(archive_uuid, archive_type, content)
            .await
        {
            Ok(archive) => Ok((archive, children)),
            Err(e) => {
                self.remove_expanded_children(&children).await;
                Err(e)
            }
        }
    }

    async fn remove_expanded_children(&self, children: &[BaseArtifact]) {
        for child in children {
            let Some(uuid) = child.uuid else { continue };
            if let Err(e) = self
                .gateway
                .delete_artifact(uuid, &child.artifact_type)
                .await
            {
                tracing::error!(
                    uuid = %uuid,
                    error = %e,
                    "failed to remove expanded child after aborted archive upload"
                );
            }
        }
    }

    async fn remove_aborted_archive_row(&self, uuid: Uuid, ty: &ArtifactType) {
        if let Err(e) = self.gateway.delete_artifact(uuid, ty).await {
            tracing::error!(
                uuid = %uuid,
                error = %e,
                "failed to remove archive row after aborted expansion"
            );
        }
    }

    /// Fetch for an update, distinguishing an unknown UUID from a row
    /// stored under a different (model, type)
    async fn fetch_existing(&self, uuid: Uuid, ty: &ArtifactType) -> Result<BaseArtifact> {
        if let Some(artifact) = self.gateway.get_artifact(uuid, ty).await? {
            return Ok(artifact);
        }
        if self.gateway.get_artifact_by_uuid(uuid).await?.is_some() {
            return Err(Error::WrongModel {
                uuid,
                model: ty.model.clone(),
                artifact_type: ty.name.clone(),
            });
        }
        Err(Error::ArtifactNotFound(uuid))
    }

    /// Update an artifact's metadata, enforcing the verifier's
    /// immutable-field rules against the stored version
    pub async fn update_metadata(
        &self,
        uuid: Uuid,
        model: &str,
        type_name: &str,
        mut artifact: BaseArtifact,
    ) -> Result<BaseArtifact> {
        let ty = self.catalog.resolve(model, type_name)?;
        let old = self.fetch_existing(uuid, &ty).await?;

        if artifact.uuid.is_none() {
            artifact.uuid = Some(uuid);
        }
        let rule = self.rule_for(&ty)?;
        let mut verifier = ArtifactVerifier::for_update(&old, &ty, rule);
        verifier.visit(&artifact);
        verifier.throw_error()?;

        let updated = self.gateway.update_artifact(artifact, &ty).await?;
        self.publisher.publish_updated(&updated, &old).await;
        Ok(updated)
    }

    /// Replace an artifact's binary content, re-resolving its MIME type
    pub async fn update_content(
        &self,
        uuid: Uuid,
        model: &str,
        type_name: &str,
        mut content: ArtifactContent,
    ) -> Result<BaseArtifact> {
        let result = self.update_content_inner(uuid, model, type_name, &content).await;
        content.cleanup();
        result
    }

    async fn update_content_inner(
        &self,
        uuid: Uuid,
        model: &str,
        type_name: &str,
        content: &ArtifactContent,
    ) -> Result<BaseArtifact> {
        let ty = self.catalog.resolve(model, type_name)?;
        if ty.is_derived {
            return Err(Error::DerivedArtifactCreate(ty.name));
        }
        let old = self.fetch_existing(uuid, &ty).await?;

        let sniff = content.sniff(MIME_SNIFF_LEN)?;
        let ty = ty
            .clone()
            .with_mime_type(determine_mime_type(content.filename(), &sniff, &ty));

        let updated = self
            .gateway
            .update_artifact_content(uuid, &ty, content)
            .await?;
        self.publisher.publish_updated(&updated, &old).await;
        Ok(updated)
    }

    pub async fn get_metadata(
        &self,
        uuid: Uuid,
        model: &str,
        type_name: &str,
    ) -> Result<BaseArtifact> {
        let ty = self.catalog.resolve(model, type_name)?;
        self.gateway
            .get_artifact(uuid, &ty)
            .await?
            .ok_or(Error::ArtifactNotFound(uuid))
    }

    /// Read back an artifact's content. Rows without content descriptors
    /// have nothing to return.
    pub async fn get_content(&self, uuid: Uuid, model: &str, type_name: &str) -> Result<Vec<u8>> {
        let ty = self.catalog.resolve(model, type_name)?;
        let artifact = self
            .gateway
            .get_artifact(uuid, &ty)
            .await?
            .ok_or(Error::ArtifactNotFound(uuid))?;
        if !artifact.has_content() {
            return Err(Error::ContentNotFound(uuid));
        }
        self.gateway.get_artifact_content(uuid, &ty).await
    }

    /// Delete an artifact (and, through the gateway, any artifacts derived
    /// from it)
    pub async fn delete(&self, uuid: Uuid, model: &str, type_name: &str) -> Result<BaseArtifact> {
        let ty = self.catalog.resolve(model, type_name)?;
        if ty.is_derived {
            return Err(Error::DerivedArtifactDelete(ty.name));
        }
        let snapshot = self.gateway.delete_artifact(uuid, &ty).await?;
        self.publisher.publish_deleted(&snapshot).await;
        Ok(snapshot)
    }

    /// Remove an artifact's content, keeping its metadata. Observers see
    /// this as an update.
    pub async fn delete_content(
        &self,
        uuid: Uuid,
        model: &str,
        type_name: &str,
    ) -> Result<BaseArtifact> {
        let ty = self.catalog.resolve(model, type_name)?;
        if ty.is_derived {
            return Err(Error::DerivedArtifactDelete(ty.name));
        }
        let old = self
            .gateway
            .get_artifact(uuid, &ty)
            .await?
            .ok_or(Error::ArtifactNotFound(uuid))?;
        let updated = self.gateway.delete_artifact_content(uuid, &ty).await?;
        self.publisher.publish_updated(&updated, &old).await;
        Ok(updated)
    }

    fn rule_for(&self, ty: &ArtifactType) -> Result<&TypeRule> {
        self.catalog
            .rule(&ty.model, &ty.name)
            .ok_or_else(|| Error::UnknownArtifactType {
                model: ty.model.clone(),
                artifact_type: ty.name.clone(),
            })
    }

    fn verify_create(&self, ty: &ArtifactType, artifact: &BaseArtifact) -> Result<()> {
        let rule = self.rule_for(ty)?;
        let mut verifier = ArtifactVerifier::new(ty, rule);
        verifier.visit(artifact);
        verifier.throw_error()
    }
}
