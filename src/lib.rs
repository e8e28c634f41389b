//! Voltrace - Plug-in Hybrid Telemetry Trip Engine
//!
//! Turns a stream of raw vehicle telemetry readings into durable trips,
//! charging sessions, fuel events and SOC transitions. Detection runs per
//! vehicle behind the engine; closed entities are persisted to SQLite and
//! enriched with historical weather and elevation data afterwards.

pub mod config;
pub mod detect;
pub mod engine;
pub mod enrichment;
pub mod storage;
pub mod sweep;
pub mod telemetry;
pub mod trip;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{EngineError, TelemetryEngine};
pub use storage::{Database, DatabaseError};
pub use telemetry::{RawReading, Reading, ReadingNormalizer};
pub use trip::{ChargingSession, Trip};
