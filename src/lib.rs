//! senserig - synchronized multi-sensor recording engine
//!
//! Records several heterogeneous sensors (depth cameras, contact imagers,
//! tactile fields) into one timestamped session directory, with a dedicated
//! capture/writer thread pair and a bounded drop-newest queue per sensor.
//! A proximity-driven hysteresis trigger can start and stop sessions
//! hands-free, and a compositor turns a finished session into a single
//! labeled grid video for review.

pub mod capture;
pub mod config;
pub mod merge;
pub mod recorder;
pub mod rig;
pub mod trigger;
pub mod video;

pub use capture::{Frame, FrameSource, SensorKind};
pub use config::RigConfig;
pub use merge::{MergeReport, StreamCompositor};
pub use recorder::{RecordingSession, SensorStats, SessionSummary};
pub use rig::RecordingRig;
pub use trigger::{ProximityTrigger, TriggerConfig};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize logging for binaries embedding the rig.
///
/// Respects `RUST_LOG` when set, otherwise defaults to debug-level output
/// for this crate only.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("senserig=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
