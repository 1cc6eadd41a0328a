//! Staging bridge: short-lived copies of image bytes in the bucket the face
//! provider can read from.
//!
//! Staged objects are hygiene, not state: they exist only for the duration of
//! one provider call and are deleted on the way out, success or failure. Keys
//! are a deterministic function of (scope, source key, variant) so repeated
//! runs overwrite instead of accumulating.

pub mod memory;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::error::FaceError;

/// Distinguishes concurrent derivations of the same source photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Enroll,
    Match,
    Face(u32),
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enroll => write!(f, "enroll"),
            Self::Match => write!(f, "match"),
            Self::Face(n) => write!(f, "face-{}", n),
        }
    }
}

/// A staged object's location in the bridge store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub bucket: String,
    pub key: String,
}

/// Deterministic bridge-store key:
/// `prefix + scope + "/" + hash12 + "-" + variant + "." + ext`.
///
/// `hash12` digests the source key, or a random id when the bytes have no
/// source object (e.g. a submitted selfie). The extension is carried over
/// from the source key when it looks like one, defaulting to `jpg`.
pub fn staging_key(
    prefix: &str,
    scope_id: &str,
    source_key: Option<&str>,
    variant: Variant,
) -> String {
    let seed = match source_key {
        Some(key) => key.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    let digest = Sha256::digest(seed.as_bytes());
    let hash12 = &hex::encode(digest)[..12];

    let ext = source_key
        .and_then(|key| key.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "jpg".to_string());

    format!("{}{}/{}-{}.{}", prefix, scope_id, hash12, variant, ext)
}

/// The bridge-store capability the workflows depend on.
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// Write `bytes` to the deterministically-keyed bridge object and return
    /// its location. Re-staging the same (scope, source, variant) overwrites.
    async fn stage(
        &self,
        scope_id: &str,
        source_key: Option<&str>,
        variant: Variant,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StagedObject, FaceError>;

    /// Best-effort delete. Absence of the object must never fail a caller;
    /// all errors are logged and swallowed.
    async fn unstage(&self, staged: &StagedObject);
}

/// Guaranteed-cleanup scope for a staged object. Call `release` after the
/// provider call; if the workflow is cancelled and the guard dropped instead,
/// cleanup is spawned onto the runtime so the object still goes away.
pub struct StagedGuard {
    bridge: Arc<dyn BridgeStore>,
    staged: StagedObject,
    released: bool,
}

impl StagedGuard {
    pub fn new(bridge: Arc<dyn BridgeStore>, staged: StagedObject) -> Self {
        Self {
            bridge,
            staged,
            released: false,
        }
    }

    pub fn object(&self) -> &StagedObject {
        &self.staged
    }

    pub async fn release(mut self) {
        self.released = true;
        self.bridge.unstage(&self.staged).await;
    }
}

impl Drop for StagedGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let bridge = Arc::clone(&self.bridge);
        let staged = self.staged.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { bridge.unstage(&staged).await });
            }
            Err(_) => log::warn!("staged object {} leaked: no runtime for cleanup", staged.key),
        }
    }
}

/// S3-backed bridge. Constructed unconfigured when credentials or bucket are
/// absent, in which case `stage` fails fast with `NotConfigured`.
pub struct S3StagingBridge {
    prefix: String,
    inner: Option<S3Inner>,
}

struct S3Inner {
    client: S3Client,
    bucket: String,
}

impl S3StagingBridge {
    pub async fn connect(config: &BridgeConfig, region: &str, timeout_secs: u64) -> Self {
        if !config.is_enabled() {
            log::warn!("bridge store disabled: credentials or bucket not configured");
            return Self {
                prefix: config.prefix.clone(),
                inner: None,
            };
        }

        let access_key = config.access_key.clone().unwrap_or_default();
        let secret_key = config.secret_key.clone().unwrap_or_default();
        let bucket = config.bucket.clone().unwrap_or_default();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(std::time::Duration::from_secs(timeout_secs))
                    .build(),
            )
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "static",
            ));

        if let Some(server) = &config.server {
            let endpoint = if server.ends_with('/') {
                server.clone()
            } else {
                format!("{}/", server)
            };
            loader = loader.endpoint_url(endpoint);
        }

        let base_config = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(config.server.is_some())
            .build();

        Self {
            prefix: config.prefix.clone(),
            inner: Some(S3Inner {
                client: S3Client::from_conf(s3_config),
                bucket,
            }),
        }
    }
}

#[async_trait]
impl BridgeStore for S3StagingBridge {
    async fn stage(
        &self,
        scope_id: &str,
        source_key: Option<&str>,
        variant: Variant,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StagedObject, FaceError> {
        let inner = self.inner.as_ref().ok_or_else(|| {
            FaceError::NotConfigured("bridge credentials or bucket unset".to_string())
        })?;

        let key = staging_key(&self.prefix, scope_id, source_key, variant);
        inner
            .client
            .put_object()
            .bucket(&inner.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| FaceError::Provider(format!("stage put_object failed: {}", e)))?;

        log::debug!("staged {} in bucket {}", key, inner.bucket);
        Ok(StagedObject {
            bucket: inner.bucket.clone(),
            key,
        })
    }

    async fn unstage(&self, staged: &StagedObject) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        if let Err(e) = inner
            .client
            .delete_object()
            .bucket(&staged.bucket)
            .key(&staged.key)
            .send()
            .await
        {
            log::warn!("unstage of {} failed (ignored): {}", staged.key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_key_is_deterministic_per_source() {
        let a = staging_key("staging/", "gallery-1", Some("orig/pic.png"), Variant::Enroll);
        let b = staging_key("staging/", "gallery-1", Some("orig/pic.png"), Variant::Enroll);
        assert_eq!(a, b);
        assert!(a.starts_with("staging/gallery-1/"));
        assert!(a.ends_with("-enroll.png"));
    }

    #[test]
    fn staging_key_separates_variants_and_scopes() {
        let enroll = staging_key("staging/", "g1", Some("k.jpg"), Variant::Enroll);
        let matching = staging_key("staging/", "g1", Some("k.jpg"), Variant::Match);
        let face = staging_key("staging/", "g1", Some("k.jpg"), Variant::Face(2));
        let other_scope = staging_key("staging/", "g2", Some("k.jpg"), Variant::Enroll);
        assert_ne!(enroll, matching);
        assert!(face.contains("-face-2."));
        assert_ne!(enroll, other_scope);
    }

    #[test]
    fn staging_key_defaults_extension_to_jpg() {
        let no_ext = staging_key("staging/", "g1", Some("raw-upload"), Variant::Enroll);
        assert!(no_ext.ends_with(".jpg"));
        let odd_ext = staging_key("staging/", "g1", Some("a.tar.gz!!"), Variant::Enroll);
        assert!(odd_ext.ends_with(".jpg"));
        let random = staging_key("staging/", "g1", None, Variant::Match);
        assert!(random.ends_with("-match.jpg"));
    }

    #[test]
    fn keys_without_source_are_randomized() {
        let a = staging_key("staging/", "g1", None, Variant::Match);
        let b = staging_key("staging/", "g1", None, Variant::Match);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn disabled_bridge_fails_fast_and_permanently() {
        let bridge =
            S3StagingBridge::connect(&BridgeConfig::default(), "us-east-1", 15).await;
        let err = bridge
            .stage("g1", Some("photos/a.jpg"), Variant::Enroll, vec![1], "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, FaceError::NotConfigured(_)));
        assert!(err.is_permanent());
    }
}
