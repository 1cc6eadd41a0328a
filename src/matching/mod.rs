//! Selfie-to-gallery matching.
//!
//! A selfie may hold several faces (group shots at the booth happen), so the
//! query fans out: detect every face, crop each one, search the collection
//! per crop, then merge per-photo by best similarity before ranking.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::FaceConfig;
use crate::error::FaceError;
use crate::image_ops;
use crate::provider::{CollectionClient, FaceMatchHit};
use crate::records::{FaceMatch, PhotoFace, RecordStore};
use crate::staging::{BridgeStore, StagedGuard, Variant};

/// Collection hits requested per query face. Distinct from the indexing
/// cap: one selfie face can legitimately appear in many gallery photos.
const MAX_SEARCH_RESULTS: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoMatch {
    pub photo_id: Uuid,
    pub similarity: f32,
}

/// Terminal outcome of a match request. A faceless selfie is a normal
/// answer, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matches(Vec<PhotoMatch>),
    NoFaceDetected,
}

pub struct FaceMatchingWorkflow {
    bridge: Arc<dyn BridgeStore>,
    faces: CollectionClient,
    store: Arc<dyn RecordStore>,
    config: FaceConfig,
}

impl FaceMatchingWorkflow {
    pub fn new(
        bridge: Arc<dyn BridgeStore>,
        faces: CollectionClient,
        store: Arc<dyn RecordStore>,
        config: FaceConfig,
    ) -> Self {
        Self {
            bridge,
            faces,
            store,
            config,
        }
    }

    pub async fn match_selfie(
        &self,
        gallery_id: Uuid,
        selfie: Vec<u8>,
    ) -> Result<MatchOutcome, FaceError> {
        let normalized = image_ops::normalize(selfie, self.config.max_image_dimension)?;

        let scope = gallery_id.to_string();
        let staged = self
            .bridge
            .stage(&scope, None, Variant::Match, normalized.clone(), "image/jpeg")
            .await?;
        let guard = StagedGuard::new(Arc::clone(&self.bridge), staged);
        let detect_result = self.faces.detect_faces(guard.object()).await;
        guard.release().await;
        let detected = detect_result?;

        if detected.is_empty() {
            log::info!("match request for gallery {}: no face in selfie", gallery_id);
            return Ok(MatchOutcome::NoFaceDetected);
        }

        // Search per detected face. A single bad crop or throttled call must
        // not sink the whole request; only a full wipeout is an error.
        let mut hits: Vec<(FaceMatchHit, String)> = Vec::new();
        let mut failures = 0usize;
        let mut last_error: Option<FaceError> = None;

        for (i, face) in detected.iter().enumerate() {
            let search = async {
                let crop = image_ops::crop_region(
                    &normalized,
                    &face.bounding_box,
                    image_ops::DEFAULT_CROP_MARGIN,
                )?;
                self.faces
                    .search_by_bytes(crop, self.config.similarity_threshold, MAX_SEARCH_RESULTS)
                    .await
            };
            match search.await {
                Ok(result) => {
                    for hit in result.matches {
                        hits.push((hit, result.face_model_version.clone()));
                    }
                }
                Err(e) => {
                    log::warn!(
                        "search for face {} of {} in gallery {} failed: {}",
                        i + 1,
                        detected.len(),
                        gallery_id,
                        e
                    );
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == detected.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let ranked = self.merge_and_rank(gallery_id, hits).await?;
        Ok(MatchOutcome::Matches(ranked))
    }

    /// Collapse hits to one row per photo (best similarity wins), persist
    /// them under a fresh query ref, and rank: similarity descending, newest
    /// upload first on ties.
    async fn merge_and_rank(
        &self,
        gallery_id: Uuid,
        hits: Vec<(FaceMatchHit, String)>,
    ) -> Result<Vec<PhotoMatch>, FaceError> {
        let mut best: HashMap<Uuid, (PhotoFace, FaceMatchHit, String)> = HashMap::new();

        for (hit, model_version) in hits {
            let Some(face) = self.store.find_face(&hit.face_id).await? else {
                // Collection faces with no photo row (client selfies, stale
                // entries) are not gallery results.
                continue;
            };
            if face.gallery_id != gallery_id {
                continue;
            }
            match best.get(&face.photo_id) {
                Some((_, existing, _)) if existing.similarity >= hit.similarity => {}
                _ => {
                    best.insert(face.photo_id, (face, hit, model_version));
                }
            }
        }

        let query_ref = format!("{}:{}", gallery_id, Uuid::new_v4());
        let now = Utc::now();
        let rows: Vec<FaceMatch> = best
            .values()
            .map(|(face, hit, model_version)| FaceMatch {
                query_ref: query_ref.clone(),
                gallery_id,
                photo_id: face.photo_id,
                provider_face_id: hit.face_id.clone(),
                similarity: hit.similarity,
                face_model_version: model_version.clone(),
                created_at: now,
            })
            .collect();
        self.store.replace_matches(&query_ref, &rows).await?;

        let mut ranked: Vec<(PhotoMatch, DateTime<Utc>)> = Vec::with_capacity(best.len());
        for (photo_id, (_, hit, _)) in best {
            let uploaded_at = self
                .store
                .photo(photo_id)
                .await?
                .map(|p| p.uploaded_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            ranked.push((
                PhotoMatch {
                    photo_id,
                    similarity: hit.similarity,
                },
                uploaded_at,
            ));
        }
        ranked.sort_by(|(a, a_up), (b, b_up)| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b_up.cmp(a_up))
        });

        log::info!(
            "match request for gallery {}: {} photo(s) above threshold",
            gallery_id,
            ranked.len()
        );
        Ok(ranked.into_iter().map(|(m, _)| m).collect())
    }
}
