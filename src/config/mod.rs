use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub face: FaceConfig,
}

/// Bridge store (S3-compatible) settings. The bridge is considered enabled
/// only when access key, secret, and bucket are all present; otherwise every
/// `stage` call fails fast with `NotConfigured`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Custom endpoint (MinIO and friends). `None` means the AWS default.
    pub server: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceConfig {
    pub region: String,
    pub collection: String,
    /// Minimum similarity (0-100) for a search hit to count as a match.
    pub similarity_threshold: f32,
    /// Faces enrolled per gallery photo in a single index call (1-50).
    pub max_faces_per_image: u32,
    /// Longest image side accepted by the provider; larger images are
    /// downscaled before staging.
    pub max_image_dimension: u32,
    /// Per-call bound on remote operations, in seconds.
    pub call_timeout_secs: u64,
}

impl BridgeConfig {
    pub fn is_enabled(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some() && self.bucket.is_some()
    }
}

impl FaceConfig {
    /// Force every numeric knob into its supported range. Out-of-range
    /// environment values are corrected silently rather than rejected.
    pub fn clamped(mut self) -> Self {
        self.similarity_threshold = self.similarity_threshold.clamp(0.0, 100.0);
        self.max_faces_per_image = self.max_faces_per_image.clamp(1, 50);
        self.max_image_dimension = self.max_image_dimension.max(80);
        self.call_timeout_secs = self.call_timeout_secs.max(1);
        self
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            collection: "gallery-faces".to_string(),
            similarity_threshold: 85.0,
            max_faces_per_image: 10,
            max_image_dimension: 2048,
            call_timeout_secs: 15,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server: None,
            access_key: None,
            secret_key: None,
            bucket: None,
            prefix: "staging/".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, applying defaults and
    /// clamping numeric knobs to safe ranges. Validated once at startup.
    pub fn from_env() -> Result<Self> {
        let get_str = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let get_opt = |key: &str| -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        };

        let bridge = BridgeConfig {
            server: get_opt("BRIDGE_SERVER").map(|server| {
                if !server.starts_with("http://") && !server.starts_with("https://") {
                    format!("http://{}", server)
                } else {
                    server
                }
            }),
            access_key: get_opt("BRIDGE_ACCESSKEY"),
            secret_key: get_opt("BRIDGE_SECRET"),
            bucket: get_opt("BRIDGE_BUCKET"),
            prefix: get_str("BRIDGE_PREFIX", "staging/"),
        };

        let threshold: f32 = std::env::var("FACE_MATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(85.0);
        let max_faces: u32 = std::env::var("FACE_MAX_FACES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let max_dimension: u32 = std::env::var("FACE_MAX_DIMENSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2048);
        let timeout: u64 = std::env::var("FACE_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        let face = FaceConfig {
            region: get_str("FACE_REGION", "us-east-1"),
            collection: get_str("FACE_COLLECTION", "gallery-faces"),
            similarity_threshold: threshold,
            max_faces_per_image: max_faces,
            max_image_dimension: max_dimension,
            call_timeout_secs: timeout,
        }
        .clamped();

        Ok(AppConfig { bridge, face })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let face = FaceConfig::default();
        assert_eq!(face.similarity_threshold, 85.0);
        assert_eq!(face.max_faces_per_image, 10);
        assert_eq!(face.collection, "gallery-faces");
        assert_eq!(face.region, "us-east-1");
    }

    #[test]
    fn out_of_range_knobs_are_clamped() {
        let face = FaceConfig {
            similarity_threshold: 250.0,
            max_faces_per_image: 0,
            max_image_dimension: 10,
            call_timeout_secs: 0,
            ..FaceConfig::default()
        }
        .clamped();
        assert_eq!(face.similarity_threshold, 100.0);
        assert_eq!(face.max_faces_per_image, 1);
        assert_eq!(face.max_image_dimension, 80);
        assert_eq!(face.call_timeout_secs, 1);

        let face = FaceConfig {
            similarity_threshold: -5.0,
            max_faces_per_image: 500,
            ..FaceConfig::default()
        }
        .clamped();
        assert_eq!(face.similarity_threshold, 0.0);
        assert_eq!(face.max_faces_per_image, 50);
    }

    #[test]
    fn bridge_requires_all_three_settings() {
        let mut bridge = BridgeConfig::default();
        assert!(!bridge.is_enabled());
        bridge.access_key = Some("ak".into());
        bridge.secret_key = Some("sk".into());
        assert!(!bridge.is_enabled());
        bridge.bucket = Some("bridge".into());
        assert!(bridge.is_enabled());
    }
}
