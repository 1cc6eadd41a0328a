//! Face-matching pipeline for event photo galleries.
//!
//! Gallery photos are enrolled into a provider face collection; attendees
//! submit a selfie and get back the photos they appear in, ranked by
//! similarity. The crate owns image normalization, the short-lived staging
//! bridge the provider reads from, the provider abstraction, and the
//! indexing/matching workflows. Persistence and HTTP surface belong to the
//! hosting platform, which plugs in through the `records` traits.

pub mod config;
pub mod error;
pub mod image_ops;
pub mod indexing;
pub mod matching;
pub mod pipeline;
pub mod provider;
pub mod records;
pub mod staging;

pub use config::{AppConfig, BridgeConfig, FaceConfig};
pub use error::FaceError;
pub use indexing::{EnrollReport, EnrollmentReport};
pub use matching::{MatchOutcome, PhotoMatch};
pub use pipeline::FacePipeline;
