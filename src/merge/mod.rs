//! Post-recording grid composition
//!
//! Turns the per-sensor videos of a finished session into one labeled
//! grid video. The layout is planned up front from probed stream
//! geometry, then frames are decoded, scaled and packed in Rust with
//! labels burned in by the encoder's filter chain.

pub mod compositor;
pub mod plan;
pub mod types;

pub use compositor::StreamCompositor;
pub use plan::{build_label_filter, derive_label, grid_dims, MergePlan, SourceDescriptor};
pub use types::{MergeError, MergeOptions, MergeReport};
