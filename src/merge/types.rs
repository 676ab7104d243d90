//! Merge types and errors

use crate::video::VideoError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Merge errors.
///
/// Any failure aborts composition for the whole session; the per-sensor
/// source files are never modified and remain usable individually.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("video error: {0}")]
    Video(#[from] VideoError),

    #[error("no source videos found in {0}")]
    NoSources(PathBuf),

    #[error("not a session directory: {0}")]
    InvalidSessionDir(PathBuf),
}

/// Result of a completed merge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Path of the composite video
    pub output: PathBuf,

    /// Frames written to the composite
    pub frames_written: u64,

    /// Source labels in grid order
    pub sources: Vec<String>,

    /// Recorded policy warnings (frame-count truncation, early stream end)
    pub warnings: Vec<String>,
}

/// Tuning knobs for the compositor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    /// Canonical cell height all sources are scaled to
    pub target_cell_height: u32,

    /// Output frame rate of the composite
    pub fps: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            target_cell_height: 720,
            fps: 30,
        }
    }
}
