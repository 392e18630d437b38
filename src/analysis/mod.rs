//! Pure derivation from a geometric analysis to measurements, a material
//! estimate and a confidence assessment. No I/O.

pub mod derive;
pub mod estimate;
pub mod quality;

pub use derive::{derive, pitch_to_ratio};
pub use estimate::{classify_complexity, estimate_materials, EstimateInputs};
pub use quality::assess_quality;
