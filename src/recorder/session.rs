//! Session orchestration
//!
//! A [`RecordingSession`] coordinates N sensor pipelines as one unit: one
//! timestamp-named output directory, one shared start instant, one
//! synchronous stop that finalizes every output before returning.

use crate::capture::{FrameSource, SensorKind};
use crate::recorder::sensor::SensorRecorder;
use crate::recorder::sink::SinkKind;
use crate::recorder::state::{
    RecordingError, RecordingResult, SensorReport, SessionPhase, SessionSummary,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// A sensor registered for recording
struct SensorSpec {
    id: String,
    kind: SensorKind,
    source: Arc<dyn FrameSource>,
    fps: u32,
}

/// Coordinates the sensor recorders of one recording run.
///
/// Phases cycle `Idle -> Starting -> Active -> Stopping -> Idle`; there is no
/// failed phase, failures are carried in the stop summary. Registered sensors
/// persist across sessions and can only be changed while idle.
pub struct RecordingSession {
    output_root: PathBuf,
    phase: SessionPhase,
    specs: Vec<SensorSpec>,
    recorders: BTreeMap<String, SensorRecorder>,
    session_name: Option<String>,
    session_dir: Option<PathBuf>,
    epoch: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    failed_to_start: Vec<String>,
}

impl RecordingSession {
    /// Create a session writing under `output_root`
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            phase: SessionPhase::Idle,
            specs: Vec::new(),
            recorders: BTreeMap::new(),
            session_name: None,
            session_dir: None,
            epoch: None,
            started_at: None,
            failed_to_start: Vec::new(),
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether a recording is in progress
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Directory of the session currently recording, if any
    pub fn session_dir(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    /// Elapsed recording time in seconds (0 when not recording)
    pub fn duration_secs(&self) -> f64 {
        match (self.phase, self.epoch) {
            (SessionPhase::Active, Some(epoch)) => epoch.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Register a sensor for the next session. Only legal while idle.
    pub fn add_sensor(
        &mut self,
        id: &str,
        kind: SensorKind,
        source: Arc<dyn FrameSource>,
        fps: u32,
    ) -> RecordingResult<()> {
        if self.phase != SessionPhase::Idle {
            return Err(RecordingError::InvalidPhase(self.phase));
        }
        if self.specs.iter().any(|s| s.id == id) {
            return Err(RecordingError::DuplicateSensor(id.to_string()));
        }
        if fps == 0 {
            return Err(RecordingError::InvalidFrameRate(id.to_string()));
        }

        tracing::info!("Registered sensor '{}' ({:?}, {}fps)", id, kind, fps);
        self.specs.push(SensorSpec {
            id: id.to_string(),
            kind,
            source,
            fps,
        });
        Ok(())
    }

    /// Start recording all registered sensors.
    ///
    /// Sensors that fail to launch are reported in the eventual summary; the
    /// call itself fails only when no sensor starts at all, in which case the
    /// session drops back to idle.
    pub fn start(&mut self) -> RecordingResult<()> {
        if self.phase != SessionPhase::Idle {
            return Err(RecordingError::InvalidPhase(self.phase));
        }
        if self.specs.is_empty() {
            return Err(RecordingError::NoSensors);
        }

        let base_name = chrono::Local::now()
            .format("session_%Y%m%d_%H%M%S")
            .to_string();
        // Two sessions within one second must not share a directory
        let mut session_name = base_name.clone();
        let mut attempt = 1;
        while self.output_root.join(&session_name).exists() {
            attempt += 1;
            session_name = format!("{}_{}", base_name, attempt);
        }
        let session_dir = self.output_root.join(&session_name);
        std::fs::create_dir_all(&session_dir)?;

        tracing::info!("Starting session '{}' in {:?}", session_name, session_dir);
        self.phase = SessionPhase::Starting;

        // One epoch shared by every recorder; all capture timestamps are
        // relative to it
        let epoch = Instant::now();
        let started_at = Utc::now();
        self.failed_to_start.clear();

        for spec in &self.specs {
            let sink_kind = SinkKind::for_sensor(spec.kind);
            let output = sink_kind.output_path(&session_dir, &spec.id, &session_name);

            let launched = sink_kind.build(&output, spec.fps).and_then(|sink| {
                SensorRecorder::start(
                    &spec.id,
                    spec.source.clone(),
                    spec.fps,
                    sink,
                    output.clone(),
                    epoch,
                )
            });

            match launched {
                Ok(recorder) => {
                    self.recorders.insert(spec.id.clone(), recorder);
                }
                Err(e) => {
                    tracing::warn!("Sensor '{}' failed to start: {}", spec.id, e);
                    self.failed_to_start.push(spec.id.clone());
                }
            }
        }

        if self.recorders.is_empty() {
            tracing::error!("No sensors available, aborting session '{}'", session_name);
            self.phase = SessionPhase::Idle;
            return Err(RecordingError::NoSensors);
        }

        self.session_name = Some(session_name);
        self.session_dir = Some(session_dir);
        self.epoch = Some(epoch);
        self.started_at = Some(started_at);
        self.phase = SessionPhase::Active;

        tracing::info!("Recording {} sensor(s)", self.recorders.len());
        Ok(())
    }

    /// Stop all recorders and return the aggregated summary.
    ///
    /// Synchronous: blocks until every sensor's output is drained and
    /// finalized, so the session directory is immediately usable by the
    /// compositor. Also writes `session_metadata.json` into the session
    /// directory.
    pub fn stop(&mut self) -> RecordingResult<SessionSummary> {
        if self.phase != SessionPhase::Active {
            return Err(RecordingError::InvalidPhase(self.phase));
        }

        tracing::info!("Stopping all recorders");
        self.phase = SessionPhase::Stopping;

        let mut sensors = BTreeMap::new();
        for (id, mut recorder) in std::mem::take(&mut self.recorders) {
            let stats = recorder.stop();
            sensors.insert(
                id,
                SensorReport {
                    fps: recorder.fps(),
                    output: recorder.output().clone(),
                    stats,
                },
            );
        }

        // Unwraps are safe: all set together when entering Active
        let epoch = self.epoch.take().unwrap();
        let started_at = self.started_at.take().unwrap();
        let session_name = self.session_name.take().unwrap();
        let session_dir = self.session_dir.take().unwrap();

        let summary = SessionSummary {
            session_name,
            session_dir,
            started_at,
            ended_at: Utc::now(),
            duration_secs: epoch.elapsed().as_secs_f64(),
            sensors,
            failed_to_start: std::mem::take(&mut self.failed_to_start),
        };

        if let Err(e) = write_metadata(&summary) {
            // The recording itself is intact; losing the metadata record is
            // not worth failing the stop
            tracing::warn!("Failed to write session metadata: {}", e);
        }

        self.phase = SessionPhase::Idle;

        tracing::info!(
            "Session '{}' stopped: {:.1}s, {} frames written, {} dropped",
            summary.session_name,
            summary.duration_secs,
            summary.total_written(),
            summary.total_dropped()
        );
        Ok(summary)
    }
}

/// File name of the per-session metadata record
pub const METADATA_FILE: &str = "session_metadata.json";

fn write_metadata(summary: &SessionSummary) -> std::io::Result<()> {
    let content = serde_json::to_string_pretty(summary)?;
    std::fs::write(summary.session_dir.join(METADATA_FILE), content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::tempdir;

    struct TestSource {
        next: AtomicU64,
    }

    impl TestSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                next: AtomicU64::new(0),
            })
        }
    }

    impl FrameSource for TestSource {
        fn latest_frame(&self) -> Option<Frame> {
            Some(Frame {
                data: vec![128u8; Frame::expected_len(4, 4)],
                width: 4,
                height: 4,
                timestamp: 0.0,
                sequence: self.next.fetch_add(1, Ordering::Relaxed),
            })
        }
    }

    #[test]
    fn test_start_without_sensors_fails() {
        let dir = tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path());
        assert!(matches!(session.start(), Err(RecordingError::NoSensors)));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_duplicate_sensor_rejected() {
        let dir = tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path());
        session
            .add_sensor("tac3d", SensorKind::TactileField, TestSource::new(), 30)
            .unwrap();
        let result = session.add_sensor("tac3d", SensorKind::TactileField, TestSource::new(), 30);
        assert!(matches!(result, Err(RecordingError::DuplicateSensor(_))));
    }

    #[test]
    fn test_stop_while_idle_fails() {
        let dir = tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path());
        assert!(matches!(
            session.stop(),
            Err(RecordingError::InvalidPhase(SessionPhase::Idle))
        ));
    }

    #[test]
    fn test_session_lifecycle_and_metadata() {
        let dir = tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path());
        session
            .add_sensor("left_gel", SensorKind::TactileField, TestSource::new(), 60)
            .unwrap();
        session
            .add_sensor("right_gel", SensorKind::TactileField, TestSource::new(), 60)
            .unwrap();

        session.start().unwrap();
        assert!(session.is_active());
        assert!(session.duration_secs() >= 0.0);

        // Registration is frozen while active
        let err = session.add_sensor("late", SensorKind::TactileField, TestSource::new(), 30);
        assert!(matches!(
            err,
            Err(RecordingError::InvalidPhase(SessionPhase::Active))
        ));

        std::thread::sleep(std::time::Duration::from_millis(200));
        let summary = session.stop().unwrap();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(summary.sensors.len(), 2);
        assert!(summary.failed_to_start.is_empty());
        assert!(summary.duration_secs > 0.0);

        for (id, report) in &summary.sensors {
            let stats = report.stats;
            assert_eq!(stats.accepted, stats.written + stats.dropped, "{}", id);
            assert!(!stats.failed);

            // The readable frame count must match the written counter
            let files = std::fs::read_dir(&report.output).unwrap().count();
            assert_eq!(files as u64, stats.written, "{}", id);
        }

        // Metadata record round-trips
        let metadata_path = summary.session_dir.join(METADATA_FILE);
        let content = std::fs::read_to_string(metadata_path).unwrap();
        let parsed: SessionSummary = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.session_name, summary.session_name);
        assert_eq!(parsed.sensors.len(), 2);
    }

    #[test]
    fn test_registrations_survive_across_sessions() {
        let dir = tempdir().unwrap();
        let mut session = RecordingSession::new(dir.path());
        session
            .add_sensor("cam", SensorKind::TactileField, TestSource::new(), 60)
            .unwrap();

        session.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let first = session.stop().unwrap();

        // Same registration records a second session into a fresh directory
        session.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let second = session.stop().unwrap();

        assert_eq!(first.sensors.len(), 1);
        assert_eq!(second.sensors.len(), 1);
        assert_ne!(first.session_dir, second.session_dir);
    }
}
