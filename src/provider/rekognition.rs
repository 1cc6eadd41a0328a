//! AWS Rekognition-backed `FaceProvider`.

use async_trait::async_trait;
use aws_sdk_rekognition::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, Image, QualityFilter, S3Object};
use aws_sdk_rekognition::Client as RekognitionClient;

use super::{DetectedFace, FaceMatchHit, FaceProvider, IndexedFace, SearchResult};
use crate::error::FaceError;
use crate::records::FaceBox;
use crate::staging::StagedObject;

pub struct RekognitionProvider {
    client: RekognitionClient,
}

impl RekognitionProvider {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: RekognitionClient::new(sdk_config),
        }
    }
}

fn s3_image(source: &StagedObject) -> Image {
    Image::builder()
        .s3_object(
            S3Object::builder()
                .bucket(&source.bucket)
                .name(&source.key)
                .build(),
        )
        .build()
}

fn bytes_image(bytes: Vec<u8>) -> Image {
    Image::builder().bytes(Blob::new(bytes)).build()
}

fn convert_box(bb: Option<&aws_sdk_rekognition::types::BoundingBox>) -> FaceBox {
    match bb {
        Some(bb) => FaceBox {
            left: bb.left().unwrap_or(0.0),
            top: bb.top().unwrap_or(0.0),
            width: bb.width().unwrap_or(0.0),
            height: bb.height().unwrap_or(0.0),
        },
        None => FaceBox {
            left: 0.0,
            top: 0.0,
            width: 0.0,
            height: 0.0,
        },
    }
}

/// Map a Rekognition failure onto the crate taxonomy. Caller-side faults
/// (bad image, bad parameters) are permanent; throttling, timeouts, and
/// everything unrecognized are treated as transient provider trouble.
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> FaceError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err));

    match code.as_deref() {
        Some("ResourceNotFoundException") => FaceError::CollectionMissing(message),
        Some("InvalidImageFormatException")
        | Some("ImageTooLargeException")
        | Some("InvalidParameterException") => {
            FaceError::InvalidInput(format!("{}: {}", operation, message))
        }
        Some(code) => FaceError::Provider(format!("{}: {} ({})", operation, message, code)),
        None => FaceError::Provider(format!("{}: {}", operation, message)),
    }
}

#[async_trait]
impl FaceProvider for RekognitionProvider {
    async fn create_collection(&self, collection_id: &str) -> Result<(), FaceError> {
        match self
            .client
            .create_collection()
            .collection_id(collection_id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            // Concurrent creation; the collection exists either way.
            Err(e) if e.code() == Some("ResourceAlreadyExistsException") => Ok(()),
            Err(e) => Err(classify("create_collection", e)),
        }
    }

    async fn delete_faces(
        &self,
        collection_id: &str,
        face_ids: &[String],
    ) -> Result<(), FaceError> {
        if face_ids.is_empty() {
            return Ok(());
        }
        self.client
            .delete_faces()
            .collection_id(collection_id)
            .set_face_ids(Some(face_ids.to_vec()))
            .send()
            .await
            .map_err(|e| classify("delete_faces", e))?;
        Ok(())
    }

    async fn detect_faces(&self, source: &StagedObject) -> Result<Vec<DetectedFace>, FaceError> {
        let output = self
            .client
            .detect_faces()
            .image(s3_image(source))
            .attributes(Attribute::Default)
            .send()
            .await
            .map_err(|e| classify("detect_faces", e))?;

        Ok(output
            .face_details()
            .iter()
            .map(|detail| DetectedFace {
                bounding_box: convert_box(detail.bounding_box()),
                confidence: detail.confidence().unwrap_or(0.0),
            })
            .collect())
    }

    async fn index_faces(
        &self,
        collection_id: &str,
        source: &StagedObject,
        external_image_id: &str,
        max_faces: u32,
    ) -> Result<Vec<IndexedFace>, FaceError> {
        let output = self
            .client
            .index_faces()
            .collection_id(collection_id)
            .image(s3_image(source))
            .external_image_id(external_image_id)
            .max_faces(max_faces as i32)
            .quality_filter(QualityFilter::Auto)
            .detection_attributes(Attribute::Default)
            .send()
            .await
            .map_err(|e| classify("index_faces", e))?;

        Ok(output
            .face_records()
            .iter()
            .filter_map(|record| {
                let face = record.face()?;
                let face_id = face.face_id()?.to_string();
                Some(IndexedFace {
                    face_id,
                    bounding_box: convert_box(face.bounding_box()),
                    confidence: face.confidence().unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn search_by_bytes(
        &self,
        collection_id: &str,
        bytes: Vec<u8>,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError> {
        self.search(collection_id, bytes_image(bytes), threshold, max_results)
            .await
    }

    async fn search_by_reference(
        &self,
        collection_id: &str,
        source: &StagedObject,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError> {
        self.search(collection_id, s3_image(source), threshold, max_results)
            .await
    }
}

impl RekognitionProvider {
    async fn search(
        &self,
        collection_id: &str,
        image: Image,
        threshold: f32,
        max_results: u32,
    ) -> Result<SearchResult, FaceError> {
        let output = self
            .client
            .search_faces_by_image()
            .collection_id(collection_id)
            .image(image)
            .face_match_threshold(threshold)
            .max_faces(max_results as i32)
            .send()
            .await
            .map_err(|e| classify("search_faces_by_image", e))?;

        let matches = output
            .face_matches()
            .iter()
            .filter_map(|m| {
                let face_id = m.face().and_then(|f| f.face_id())?.to_string();
                Some(FaceMatchHit {
                    face_id,
                    similarity: m.similarity().unwrap_or(0.0),
                })
            })
            .collect();

        Ok(SearchResult {
            matches,
            face_model_version: output.face_model_version().unwrap_or_default().to_string(),
        })
    }
}
