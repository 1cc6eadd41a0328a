//! Data model and record-store capability contracts.
//!
//! Persistence of these rows lives in the platform's relational store and is
//! not this crate's concern; the pipeline only needs the narrow insert/query
//! surface below. `records::memory` provides in-process implementations for
//! tests and local development.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FaceError;

/// A face location normalized to image dimensions: every field is a fraction
/// in `[0,1]`, making boxes resolution-independent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// A gallery photo as the platform records it on upload. Immutable here;
/// this crate only reads it (object key, upload time for ranking ties).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryPhoto {
    pub gallery_id: Uuid,
    pub photo_id: Uuid,
    pub object_key: String,
    pub uploaded_at: DateTime<Utc>,
}

/// One enrolled face in a gallery photo. Created by the indexing workflow
/// from a successful provider call, never mutated, deleted only with its
/// photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoFace {
    pub provider_face_id: String,
    pub photo_id: Uuid,
    pub gallery_id: Uuid,
    pub bounding_box: FaceBox,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// A client's enrolled selfie: the caller-chosen external image id bound to
/// the provider face ids returned at enrollment time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFaceEnrollment {
    pub external_image_id: String,
    pub gallery_id: Uuid,
    pub client_id: Uuid,
    pub provider_face_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One query-face/photo-face pairing above threshold from a search call.
/// Rows for the same query are superseded wholesale, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatch {
    pub query_ref: String,
    pub gallery_id: Uuid,
    pub photo_id: Uuid,
    pub provider_face_id: String,
    pub similarity: f32,
    pub face_model_version: String,
    pub created_at: DateTime<Utc>,
}

/// Read-only byte fetch from the platform's primary object store.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch(&self, object_key: &str) -> Result<Vec<u8>, FaceError>;
}

/// Row insert/query capability over the face tables.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist the faces enrolled for one photo. Called with the complete
    /// set from a single successful provider call.
    async fn insert_photo_faces(&self, faces: &[PhotoFace]) -> Result<(), FaceError>;

    /// Faces already enrolled for a photo; lets callers dedupe re-indexing.
    async fn photo_faces(&self, photo_id: Uuid) -> Result<Vec<PhotoFace>, FaceError>;

    /// Resolve a provider face id back to its photo face, if enrolled.
    async fn find_face(&self, provider_face_id: &str) -> Result<Option<PhotoFace>, FaceError>;

    /// Remove every face row for a photo (photo deletion path).
    async fn delete_photo_faces(&self, photo_id: Uuid) -> Result<Vec<PhotoFace>, FaceError>;

    /// The photo row, for upload-time tie-breaking during ranking.
    async fn photo(&self, photo_id: Uuid) -> Result<Option<GalleryPhoto>, FaceError>;

    async fn insert_enrollment(
        &self,
        enrollment: &ClientFaceEnrollment,
    ) -> Result<(), FaceError>;

    /// Replace all match rows for `query_ref` with `matches` (supersede, do
    /// not merge).
    async fn replace_matches(
        &self,
        query_ref: &str,
        matches: &[FaceMatch],
    ) -> Result<(), FaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_rows_serialize_for_the_platform_api() {
        let face = PhotoFace {
            provider_face_id: "f-1".to_string(),
            photo_id: Uuid::nil(),
            gallery_id: Uuid::nil(),
            bounding_box: FaceBox {
                left: 0.1,
                top: 0.2,
                width: 0.3,
                height: 0.4,
            },
            confidence: 99.1,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&face).unwrap();
        assert_eq!(json["provider_face_id"], "f-1");
        assert_eq!(json["bounding_box"]["left"], 0.1f32 as f64);

        let back: PhotoFace = serde_json::from_value(json).unwrap();
        assert_eq!(back.bounding_box.width, 0.3);
    }
}
