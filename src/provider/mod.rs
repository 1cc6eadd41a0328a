//! Face provider abstraction and the collection-scoped client the workflows
//! talk to.

pub mod rekognition;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::FaceError;
use crate::records::FaceBox;
use crate::staging::StagedObject;

/// A face found by detection, before any enrollment.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bounding_box: FaceBox,
    pub confidence: f32,
}

/// A face enrolled into a collection.
#[derive(Debug, Clone)]
pub struct IndexedFace {
    pub face_id: String,
    pub bounding_box: FaceBox,
    pub confidence: f32,
}

/// One collection face matching a query image.
#[derive(Debug, Clone)]
pub struct FaceMatchHit {
    pub face_id: String,
    pub similarity: f32,
}

/// Result of a similarity search over one query face.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub matches: Vec<FaceMatchHit>,
    pub face_model_version: String,
}

/// The remote face service surface. Implementations translate service errors
/// into the crate taxonomy; notably a missing collection must surface as
/// `CollectionMissing` so `CollectionClient` can create it transparently.
#[async_trait]
pub trait FaceProvider: Send + Sync {
    /// Create the collection. Must succeed if it already exists.
    async fn create_collection(&self, collection_id: &str) -> Result<(), FaceError>;

    async fn delete_faces(&self, collection_id: &str, face_ids: &[String])
        -> Result<(), FaceError>;

    /// Detect faces in a staged image without enrolling anything.
    async fn detect_faces(&self, source: &StagedObject) -> Result<Vec<DetectedFace>, FaceError>;

    /// Enroll up to `max_faces` faces from a staged image, tagging each with
    /// `external_image_id`.
    async fn index_faces(
        &self,
        collection_id: &str,
        source: &StagedObject,
        external_image_id: &str,
        max_faces: u32,
    ) -> Result<Vec<IndexedFace>, FaceError>;

    /// Search the collection with raw image bytes containing a single face.
    async fn search_by_bytes(
        &self,
        collection_id: &str,
        bytes: Vec<u8>,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError>;

    /// Search the collection with a staged image reference.
    async fn search_by_reference(
        &self,
        collection_id: &str,
        source: &StagedObject,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError>;
}

/// Provider handle bound to one named collection.
///
/// Collections are created lazily: every indexing/search call gets exactly
/// one retry after a `CollectionMissing` failure, preceded by a create. A
/// second failure propagates; nothing else is retried here.
#[derive(Clone)]
pub struct CollectionClient {
    provider: Arc<dyn FaceProvider>,
    collection_id: String,
}

impl CollectionClient {
    pub fn new(provider: Arc<dyn FaceProvider>, collection_id: &str) -> Self {
        Self {
            provider,
            collection_id: collection_id.to_string(),
        }
    }

    pub async fn detect_faces(
        &self,
        source: &StagedObject,
    ) -> Result<Vec<DetectedFace>, FaceError> {
        self.provider.detect_faces(source).await
    }

    pub async fn index_faces(
        &self,
        source: &StagedObject,
        external_image_id: &str,
        max_faces: u32,
    ) -> Result<Vec<IndexedFace>, FaceError> {
        match self
            .provider
            .index_faces(&self.collection_id, source, external_image_id, max_faces)
            .await
        {
            Err(FaceError::CollectionMissing(_)) => {
                self.create_and_log().await?;
                self.provider
                    .index_faces(&self.collection_id, source, external_image_id, max_faces)
                    .await
            }
            other => other,
        }
    }

    pub async fn search_by_bytes(
        &self,
        bytes: Vec<u8>,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError> {
        match self
            .provider
            .search_by_bytes(&self.collection_id, bytes.clone(), threshold, max_results)
            .await
        {
            Err(FaceError::CollectionMissing(_)) => {
                self.create_and_log().await?;
                self.provider
                    .search_by_bytes(&self.collection_id, bytes, threshold, max_results)
                    .await
            }
            other => other,
        }
    }

    pub async fn search_by_reference(
        &self,
        source: &StagedObject,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError> {
        match self
            .provider
            .search_by_reference(&self.collection_id, source, threshold, max_results)
            .await
        {
            Err(FaceError::CollectionMissing(_)) => {
                self.create_and_log().await?;
                self.provider
                    .search_by_reference(&self.collection_id, source, threshold, max_results)
                    .await
            }
            other => other,
        }
    }

    pub async fn delete_faces(&self, face_ids: &[String]) -> Result<(), FaceError> {
        // Nothing to recreate here: a missing collection has no faces left
        // to delete, so treat it as already done.
        match self.provider.delete_faces(&self.collection_id, face_ids).await {
            Err(FaceError::CollectionMissing(_)) => Ok(()),
            other => other,
        }
    }

    async fn create_and_log(&self) -> Result<(), FaceError> {
        log::info!("creating face collection {}", self.collection_id);
        self.provider.create_collection(&self.collection_id).await
    }
}
