//! Telemetry ingestion types and normalization.

pub mod normalizer;
pub mod types;

pub use normalizer::ReadingNormalizer;
pub use types::{RawReading, Reading, ValidationError};
