//! Domain types
//!
//! Plain data for the roof analysis pipeline. Types that cross the model
//! boundary mirror its JSON field names.

pub mod estimate;
pub mod generation;
pub mod geometry;
pub mod measurements;
pub mod narrative;
pub mod quality;
pub mod report;

pub use estimate::*;
pub use generation::*;
pub use geometry::*;
pub use measurements::*;
pub use narrative::*;
pub use quality::*;
pub use report::*;
