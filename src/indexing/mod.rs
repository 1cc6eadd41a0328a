//! Gallery-photo and client-selfie enrollment.
//!
//! One invocation walks received -> normalized -> staged -> indexed ->
//! persisted -> cleaned. The staged copy never outlives the provider call,
//! and face rows are written only from a successful index response.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::FaceConfig;
use crate::error::FaceError;
use crate::image_ops;
use crate::provider::CollectionClient;
use crate::records::{ClientFaceEnrollment, GalleryPhoto, PhotoFace, PhotoSource, RecordStore};
use crate::staging::{BridgeStore, StagedGuard, Variant};

/// Faces enrolled from one selfie; portraits rarely hold more.
const MAX_SELFIE_FACES: u32 = 5;

/// Provider-imposed cap on external image id length, in bytes.
const MAX_EXTERNAL_ID_BYTES: usize = 255;

#[derive(Debug, Clone)]
pub struct EnrollReport {
    pub photo_id: Uuid,
    pub faces_found: usize,
}

#[derive(Debug, Clone)]
pub struct EnrollmentReport {
    pub enrolled: bool,
    pub face_count: usize,
}

pub struct FaceIndexingWorkflow {
    bridge: Arc<dyn BridgeStore>,
    faces: CollectionClient,
    store: Arc<dyn RecordStore>,
    photos: Arc<dyn PhotoSource>,
    config: FaceConfig,
}

impl FaceIndexingWorkflow {
    pub fn new(
        bridge: Arc<dyn BridgeStore>,
        faces: CollectionClient,
        store: Arc<dyn RecordStore>,
        photos: Arc<dyn PhotoSource>,
        config: FaceConfig,
    ) -> Self {
        Self {
            bridge,
            faces,
            store,
            photos,
            config,
        }
    }

    /// Enroll every face in a gallery photo. Zero detected faces is a
    /// successful outcome (scenery shots are normal), reported as
    /// `faces_found == 0`.
    pub async fn enroll_photo(&self, photo: &GalleryPhoto) -> Result<EnrollReport, FaceError> {
        if photo.object_key.trim().is_empty() {
            return Err(FaceError::InvalidInput("empty photo object key".to_string()));
        }

        let bytes = self.photos.fetch(&photo.object_key).await?;
        let normalized = image_ops::normalize(bytes, self.config.max_image_dimension)?;

        let scope = photo.gallery_id.to_string();
        let staged = self
            .bridge
            .stage(
                &scope,
                Some(&photo.object_key),
                Variant::Enroll,
                normalized,
                "image/jpeg",
            )
            .await?;
        let guard = StagedGuard::new(Arc::clone(&self.bridge), staged);

        let external_id = external_image_id(photo.gallery_id, photo.photo_id)?;
        let result = self
            .faces
            .index_faces(
                guard.object(),
                &external_id,
                self.config.max_faces_per_image,
            )
            .await;
        guard.release().await;
        let indexed = result?;

        let now = Utc::now();
        let rows: Vec<PhotoFace> = indexed
            .iter()
            .map(|face| PhotoFace {
                provider_face_id: face.face_id.clone(),
                photo_id: photo.photo_id,
                gallery_id: photo.gallery_id,
                bounding_box: face.bounding_box,
                confidence: face.confidence,
                created_at: now,
            })
            .collect();
        if !rows.is_empty() {
            self.store.insert_photo_faces(&rows).await?;
        }

        log::info!(
            "enrolled photo {} in gallery {}: {} face(s)",
            photo.photo_id,
            photo.gallery_id,
            rows.len()
        );
        Ok(EnrollReport {
            photo_id: photo.photo_id,
            faces_found: rows.len(),
        })
    }

    /// Enroll a client's selfie so their face can later anchor gallery-side
    /// lookups. A selfie without a detectable face enrolls nothing but is
    /// not an error.
    pub async fn enroll_client_selfie(
        &self,
        gallery_id: Uuid,
        client_id: Uuid,
        selfie: Vec<u8>,
    ) -> Result<EnrollmentReport, FaceError> {
        let normalized = image_ops::normalize(selfie, self.config.max_image_dimension)?;

        let scope = gallery_id.to_string();
        let staged = self
            .bridge
            .stage(&scope, None, Variant::Enroll, normalized, "image/jpeg")
            .await?;
        let guard = StagedGuard::new(Arc::clone(&self.bridge), staged);

        let external_id = external_image_id(gallery_id, client_id)?;
        let result = self
            .faces
            .index_faces(guard.object(), &external_id, MAX_SELFIE_FACES)
            .await;
        guard.release().await;
        let indexed = result?;

        if indexed.is_empty() {
            log::info!(
                "selfie for client {} in gallery {} had no detectable face",
                client_id,
                gallery_id
            );
            return Ok(EnrollmentReport {
                enrolled: false,
                face_count: 0,
            });
        }

        let enrollment = ClientFaceEnrollment {
            external_image_id: external_id,
            gallery_id,
            client_id,
            provider_face_ids: indexed.iter().map(|f| f.face_id.clone()).collect(),
            created_at: Utc::now(),
        };
        self.store.insert_enrollment(&enrollment).await?;

        Ok(EnrollmentReport {
            enrolled: true,
            face_count: indexed.len(),
        })
    }

    /// Remove a photo's faces from the collection and its rows from the
    /// record store. The record rows go last so a provider failure leaves
    /// them discoverable for a retry.
    pub async fn forget_photo(&self, photo_id: Uuid) -> Result<usize, FaceError> {
        let rows = self.store.photo_faces(photo_id).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let face_ids: Vec<String> = rows.iter().map(|r| r.provider_face_id.clone()).collect();
        self.faces.delete_faces(&face_ids).await?;
        let removed = self.store.delete_photo_faces(photo_id).await?;

        log::info!("forgot photo {}: {} face(s) removed", photo_id, removed.len());
        Ok(removed.len())
    }
}

/// `<gallery>_<subject>` ties every enrolled face back to its origin without
/// a provider-side lookup table.
fn external_image_id(gallery_id: Uuid, subject_id: Uuid) -> Result<String, FaceError> {
    let id = format!("{}_{}", gallery_id, subject_id);
    if id.len() > MAX_EXTERNAL_ID_BYTES {
        return Err(FaceError::InvalidInput(format!(
            "external image id exceeds {} bytes",
            MAX_EXTERNAL_ID_BYTES
        )));
    }
    Ok(id)
}
