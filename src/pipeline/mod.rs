//! The pipeline facade the platform calls into.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::FaceError;
use crate::indexing::{EnrollReport, EnrollmentReport, FaceIndexingWorkflow};
use crate::matching::{FaceMatchingWorkflow, MatchOutcome};
use crate::provider::rekognition::RekognitionProvider;
use crate::provider::{CollectionClient, FaceProvider};
use crate::records::{GalleryPhoto, PhotoSource, RecordStore};
use crate::staging::{BridgeStore, S3StagingBridge};

pub struct FacePipeline {
    indexing: FaceIndexingWorkflow,
    matching: FaceMatchingWorkflow,
    store: Arc<dyn RecordStore>,
}

impl FacePipeline {
    /// Wire up against the real bridge bucket and face service. One SDK
    /// config load is shared by both clients so they agree on region and
    /// operation timeout.
    pub async fn connect(
        config: AppConfig,
        photos: Arc<dyn PhotoSource>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let bridge: Arc<dyn BridgeStore> = Arc::new(
            S3StagingBridge::connect(
                &config.bridge,
                &config.face.region,
                config.face.call_timeout_secs,
            )
            .await,
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.face.region.clone()))
            .timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(std::time::Duration::from_secs(
                        config.face.call_timeout_secs,
                    ))
                    .build(),
            )
            .load()
            .await;
        let provider: Arc<dyn FaceProvider> = Arc::new(RekognitionProvider::new(&sdk_config));

        Self::with_components(config, photos, store, bridge, provider)
    }

    /// Assemble from explicit components. This is how tests swap in the
    /// in-memory bridge and a scripted provider.
    pub fn with_components(
        config: AppConfig,
        photos: Arc<dyn PhotoSource>,
        store: Arc<dyn RecordStore>,
        bridge: Arc<dyn BridgeStore>,
        provider: Arc<dyn FaceProvider>,
    ) -> Self {
        let faces = CollectionClient::new(provider, &config.face.collection);
        let indexing = FaceIndexingWorkflow::new(
            Arc::clone(&bridge),
            faces.clone(),
            Arc::clone(&store),
            photos,
            config.face.clone(),
        );
        let matching =
            FaceMatchingWorkflow::new(bridge, faces, Arc::clone(&store), config.face.clone());
        Self {
            indexing,
            matching,
            store,
        }
    }

    /// Enroll every face in an uploaded gallery photo.
    pub async fn enroll_photo(
        &self,
        gallery_id: Uuid,
        photo_id: Uuid,
        primary_store_key: &str,
    ) -> Result<EnrollReport, FaceError> {
        let photo = match self.store.photo(photo_id).await? {
            Some(photo) => photo,
            None => GalleryPhoto {
                gallery_id,
                photo_id,
                object_key: primary_store_key.to_string(),
                uploaded_at: Utc::now(),
            },
        };
        self.indexing.enroll_photo(&photo).await
    }

    /// Enroll a client's reference selfie into the gallery's collection.
    pub async fn enroll_client_selfie(
        &self,
        gallery_id: Uuid,
        client_id: Uuid,
        selfie_bytes: Vec<u8>,
    ) -> Result<EnrollmentReport, FaceError> {
        self.indexing
            .enroll_client_selfie(gallery_id, client_id, selfie_bytes)
            .await
    }

    /// Find gallery photos whose faces match the submitted selfie.
    pub async fn match_selfie(
        &self,
        gallery_id: Uuid,
        selfie_bytes: Vec<u8>,
    ) -> Result<MatchOutcome, FaceError> {
        self.matching.match_selfie(gallery_id, selfie_bytes).await
    }

    /// Remove a deleted photo's faces from the collection and the record
    /// store. Returns how many faces were forgotten.
    pub async fn forget_photo(
        &self,
        _gallery_id: Uuid,
        photo_id: Uuid,
    ) -> Result<usize, FaceError> {
        self.indexing.forget_photo(photo_id).await
    }
}
