//! Synchronized recording engine
//!
//! This module implements the multi-sensor recording architecture:
//! - SensorRecorder: one capture/write pipeline per sensor
//! - RecordingSession: session-wide start/stop coordination
//! - FrameSink: video and image-sequence output backends

pub mod sensor;
pub mod session;
pub mod sink;
pub mod state;

pub use sensor::SensorRecorder;
pub use session::{RecordingSession, METADATA_FILE};
pub use sink::{FrameSink, ImageSequenceSink, SinkKind, VideoSink};
pub use state::{
    RecordingError, RecordingResult, SensorReport, SensorStats, SessionPhase, SessionSummary,
};
