//! Trip lifecycle: entity types, segmentation state machine, finalizer.

pub mod finalizer;
pub mod segmenter;
pub mod types;

pub use segmenter::{ClosedEntity, TripSegmenter};
pub use types::{
    ChargingSession, EnrichmentStatus, FuelEvent, FuelEventKind, ModeSegment, PropulsionMode,
    SocTransition, SocTransitionKind, Trip,
};
