//! Per-reading signal detectors: fuel mode, SOC analysis, charging.

pub mod charging;
pub mod fuel_mode;
pub mod smoothing;
pub mod soc;

pub use charging::ChargingDetector;
pub use fuel_mode::FuelModeDetector;
pub use soc::SocAnalyzer;
