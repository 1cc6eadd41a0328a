//! Error taxonomy for the face-matching pipeline.
//!
//! Callers dispatch on two axes: which component failed, and whether a retry
//! can help. Permanent errors (bad input, missing configuration, undecodable
//! images) must not be retried; transient provider failures may be, with
//! backoff owned by the caller's job system.

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    /// Bad caller input (empty object key, oversized external image id).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The bridge store is not configured (missing credentials or bucket).
    #[error("staging bridge not configured: {0}")]
    NotConfigured(String),

    /// The image bytes could not be decoded as a supported raster format.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// A crop region was degenerate after clamping to image bounds.
    #[error("invalid crop region: {0}")]
    InvalidRegion(String),

    /// The provider reported that the face collection does not exist.
    /// Handled internally by a single create-and-retry; surfaced only when
    /// the retry fails the same way.
    #[error("face collection missing: {0}")]
    CollectionMissing(String),

    /// Transient provider failure: timeout, throttling, network.
    #[error("face provider error: {0}")]
    Provider(String),

    /// The record store rejected a read or write.
    #[error("record store error: {0}")]
    Store(String),
}

impl FaceError {
    /// Whether retrying the same call can ever succeed.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Provider(_) | Self::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_retryable() {
        assert!(!FaceError::Provider("timeout".into()).is_permanent());
        assert!(FaceError::NotConfigured("no bucket".into()).is_permanent());
        assert!(FaceError::Decode("not an image".into()).is_permanent());
    }
}
