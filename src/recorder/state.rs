//! Recording state and summary types
//!
//! Defines the session lifecycle phases, per-sensor statistics, and the
//! summary/metadata records a finished session produces.

use crate::video::VideoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Lifecycle phase of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No recording in progress; sensors may be registered
    Idle,
    /// Recorders are being launched
    Starting,
    /// All launched recorders are capturing
    Active,
    /// Recorders are draining and finalizing output
    Stopping,
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Counters for one sensor's capture/write pipeline.
///
/// After the pipeline has stopped, `accepted == dropped + written` holds
/// exactly; while running, the difference is bounded by the queue capacity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStats {
    /// Frames pulled from the source and offered to the queue
    pub accepted: u64,

    /// Frames discarded under queue pressure or left unwritten at shutdown
    pub dropped: u64,

    /// Frames persisted to the output artifact
    pub written: u64,

    /// Whether the pipeline hit a fatal write failure
    pub failed: bool,
}

/// Final per-sensor record included in the session summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReport {
    /// Configured capture rate
    pub fps: u32,

    /// Output artifact (video file or image-sequence directory)
    pub output: PathBuf,

    #[serde(flatten)]
    pub stats: SensorStats,
}

/// Aggregated result of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Timestamp-derived session name
    pub session_name: String,

    /// Directory holding all per-sensor outputs
    pub session_dir: PathBuf,

    /// Wall-clock start time
    pub started_at: DateTime<Utc>,

    /// Wall-clock end time
    pub ended_at: DateTime<Utc>,

    /// Session duration in seconds
    pub duration_secs: f64,

    /// Per-sensor reports keyed by sensor id
    pub sensors: BTreeMap<String, SensorReport>,

    /// Sensors that failed to launch at session start
    pub failed_to_start: Vec<String>,
}

impl SessionSummary {
    /// Total frames written across all sensors
    pub fn total_written(&self) -> u64 {
        self.sensors.values().map(|r| r.stats.written).sum()
    }

    /// Total frames dropped across all sensors
    pub fn total_dropped(&self) -> u64 {
        self.sensors.values().map(|r| r.stats.dropped).sum()
    }
}

/// Recording errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation not valid in phase {0:?}")]
    InvalidPhase(SessionPhase),

    #[error("no sensors available to record")]
    NoSensors,

    #[error("sensor '{0}' is already registered")]
    DuplicateSensor(String),

    #[error("invalid frame rate for sensor '{0}'")]
    InvalidFrameRate(String),

    #[error("video error: {0}")]
    Video(#[from] VideoError),

    #[error("image encoding error: {0}")]
    Png(#[from] png::EncodingError),
}

/// Result type alias for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;
