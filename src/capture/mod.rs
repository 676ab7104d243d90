//! Frame source abstractions
//!
//! This module defines the contract between physical sensors and the
//! recording engine. Drivers for the depth camera, contact imagers and the
//! tactile-field sensor implement [`FrameSource`] outside this crate.

pub mod traits;

pub use traits::{Frame, FrameSource, SensorKind};
