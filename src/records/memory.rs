//! In-memory record store and photo source, for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ClientFaceEnrollment, FaceMatch, GalleryPhoto, PhotoFace, PhotoSource, RecordStore};
use crate::error::FaceError;

#[derive(Default)]
pub struct MemoryRecordStore {
    photos: RwLock<HashMap<Uuid, GalleryPhoto>>,
    faces: RwLock<Vec<PhotoFace>>,
    enrollments: RwLock<Vec<ClientFaceEnrollment>>,
    matches: RwLock<HashMap<String, Vec<FaceMatch>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a photo row the way the platform's upload path would.
    pub async fn put_photo(&self, photo: GalleryPhoto) {
        self.photos.write().await.insert(photo.photo_id, photo);
    }

    pub async fn enrollments(&self) -> Vec<ClientFaceEnrollment> {
        self.enrollments.read().await.clone()
    }

    pub async fn matches_for(&self, query_ref: &str) -> Vec<FaceMatch> {
        self.matches
            .read()
            .await
            .get(query_ref)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn all_matches(&self) -> Vec<FaceMatch> {
        self.matches.read().await.values().flatten().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_photo_faces(&self, faces: &[PhotoFace]) -> Result<(), FaceError> {
        self.faces.write().await.extend_from_slice(faces);
        Ok(())
    }

    async fn photo_faces(&self, photo_id: Uuid) -> Result<Vec<PhotoFace>, FaceError> {
        Ok(self
            .faces
            .read()
            .await
            .iter()
            .filter(|f| f.photo_id == photo_id)
            .cloned()
            .collect())
    }

    async fn find_face(&self, provider_face_id: &str) -> Result<Option<PhotoFace>, FaceError> {
        Ok(self
            .faces
            .read()
            .await
            .iter()
            .find(|f| f.provider_face_id == provider_face_id)
            .cloned())
    }

    async fn delete_photo_faces(&self, photo_id: Uuid) -> Result<Vec<PhotoFace>, FaceError> {
        let mut faces = self.faces.write().await;
        let (removed, kept): (Vec<_>, Vec<_>) =
            faces.drain(..).partition(|f| f.photo_id == photo_id);
        *faces = kept;
        Ok(removed)
    }

    async fn photo(&self, photo_id: Uuid) -> Result<Option<GalleryPhoto>, FaceError> {
        Ok(self.photos.read().await.get(&photo_id).cloned())
    }

    async fn insert_enrollment(
        &self,
        enrollment: &ClientFaceEnrollment,
    ) -> Result<(), FaceError> {
        self.enrollments.write().await.push(enrollment.clone());
        Ok(())
    }

    async fn replace_matches(
        &self,
        query_ref: &str,
        matches: &[FaceMatch],
    ) -> Result<(), FaceError> {
        self.matches
            .write()
            .await
            .insert(query_ref.to_string(), matches.to_vec());
        Ok(())
    }
}

/// Primary-store stand-in keyed by object key.
#[derive(Default)]
pub struct MemoryPhotoSource {
    objects: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryPhotoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, object_key: &str, bytes: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert(object_key.to_string(), Arc::new(bytes));
    }
}

#[async_trait]
impl PhotoSource for MemoryPhotoSource {
    async fn fetch(&self, object_key: &str) -> Result<Vec<u8>, FaceError> {
        self.objects
            .read()
            .await
            .get(object_key)
            .map(|b| b.as_ref().clone())
            .ok_or_else(|| FaceError::InvalidInput(format!("no object at key {}", object_key)))
    }
}
