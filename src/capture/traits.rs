//! Capture trait definitions
//!
//! Sensor-agnostic frame types and the minimal capability interface the
//! recording engine consumes. Physical sensor drivers live outside this
//! crate and implement [`FrameSource`].

use serde::{Deserialize, Serialize};

/// A single captured frame in packed BGR order.
///
/// A frame is owned by exactly one pipeline stage at a time: the capture
/// loop produces it, the queue holds it, the writer loop consumes it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Packed BGR pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Capture time in seconds since the session start
    pub timestamp: f64,

    /// Monotonically increasing sequence number assigned by the source
    pub sequence: u64,
}

impl Frame {
    /// Expected buffer length for a BGR frame of the given dimensions
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// A sensor that can hand out its most recent frame without blocking.
///
/// Implementations return frames in packed BGR order; the recorder never
/// reinterprets channel order. `None` means no frame is currently
/// available, which the capture loop treats as a skipped tick, not an
/// error. Sources do no rate limiting or frame dropping of their own.
pub trait FrameSource: Send + Sync {
    /// Get the most recently captured frame, if any
    fn latest_frame(&self) -> Option<Frame>;
}

/// Kind of physical sensor behind a [`FrameSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Depth/RGB camera (e.g. an OAK device)
    DepthCamera,

    /// Contact-imaging (visuotactile) sensor
    ContactImager,

    /// UDP tactile-field sensor rendered as frames
    TactileField,
}
