//! Rig orchestration
//!
//! Ties the pieces together: a [`RecordingSession`] holding the sensor
//! registry, a [`ProximityTrigger`] turning distance samples into
//! start/stop actions, and the compositor for finished sessions. The
//! trigger itself never checks whether a recording is already running;
//! that guard lives here, so manual and automatic control can coexist.

use crate::capture::{FrameSource, SensorKind};
use crate::config::RigConfig;
use crate::merge::{MergeError, MergeOptions, MergeReport, StreamCompositor};
use crate::recorder::{RecordingResult, RecordingSession, SessionSummary};
use crate::trigger::{ProximityTrigger, TriggerStatus};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Hook = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct RigHooks {
    on_start: Option<Hook>,
    on_stop: Option<Hook>,
}

impl RigHooks {
    fn fire_start(&mut self) {
        if let Some(hook) = self.on_start.as_mut() {
            hook();
        }
    }

    fn fire_stop(&mut self) {
        if let Some(hook) = self.on_stop.as_mut() {
            hook();
        }
    }
}

/// Complete recording rig with manual and proximity-driven control
pub struct RecordingRig {
    session: Arc<Mutex<RecordingSession>>,
    trigger: ProximityTrigger,
    default_fps: u32,
    merge_options: MergeOptions,
    hooks: Arc<Mutex<RigHooks>>,
    last_summary: Arc<Mutex<Option<SessionSummary>>>,
}

impl RecordingRig {
    pub fn new(config: RigConfig) -> Self {
        let session = Arc::new(Mutex::new(RecordingSession::new(config.output_dir.clone())));
        let hooks = Arc::new(Mutex::new(RigHooks::default()));
        let last_summary = Arc::new(Mutex::new(None));

        let mut trigger = ProximityTrigger::new(config.trigger.clone());
        {
            let session = session.clone();
            let hooks = hooks.clone();
            trigger.on_recording_start(move || {
                let mut session = session.lock();
                if session.is_active() {
                    return;
                }
                match session.start() {
                    Ok(()) => hooks.lock().fire_start(),
                    Err(e) => tracing::error!("Triggered start failed: {}", e),
                }
            });
        }
        {
            let session = session.clone();
            let hooks = hooks.clone();
            let last_summary = last_summary.clone();
            trigger.on_recording_stop(move || {
                let mut session = session.lock();
                if !session.is_active() {
                    return;
                }
                match session.stop() {
                    Ok(summary) => {
                        *last_summary.lock() = Some(summary);
                        hooks.lock().fire_stop();
                    }
                    Err(e) => tracing::error!("Triggered stop failed: {}", e),
                }
            });
        }

        Self {
            session,
            trigger,
            default_fps: config.frame_rate,
            merge_options: config.merge,
            hooks,
            last_summary,
        }
    }

    /// Hook fired after any recording starts, manual or triggered
    pub fn on_recording_start(&self, hook: impl FnMut() + Send + 'static) {
        self.hooks.lock().on_start = Some(Box::new(hook));
    }

    /// Hook fired after any recording stops, manual or triggered
    pub fn on_recording_stop(&self, hook: impl FnMut() + Send + 'static) {
        self.hooks.lock().on_stop = Some(Box::new(hook));
    }

    /// Register a sensor at the configured default capture rate
    pub fn add_sensor(
        &self,
        id: &str,
        kind: SensorKind,
        source: Arc<dyn FrameSource>,
    ) -> RecordingResult<()> {
        self.add_sensor_at(id, kind, source, self.default_fps)
    }

    /// Register a sensor with an explicit capture rate
    pub fn add_sensor_at(
        &self,
        id: &str,
        kind: SensorKind,
        source: Arc<dyn FrameSource>,
        fps: u32,
    ) -> RecordingResult<()> {
        self.session.lock().add_sensor(id, kind, source, fps)
    }

    /// Start a recording manually
    pub fn start_recording(&self) -> RecordingResult<()> {
        self.session.lock().start()?;
        self.hooks.lock().fire_start();
        Ok(())
    }

    /// Stop the current recording manually.
    ///
    /// Also resets the trigger, so a hand that is still close does not
    /// immediately restart a recording the operator just ended.
    pub fn stop_recording(&mut self) -> RecordingResult<SessionSummary> {
        let summary = self.session.lock().stop()?;
        *self.last_summary.lock() = Some(summary.clone());
        self.hooks.lock().fire_stop();
        // Session is already inactive, so the trigger's stop path is a no-op
        // beyond moving the machine into cooldown.
        self.trigger.force_stop();
        Ok(summary)
    }

    /// Feed one proximity sample to the trigger
    pub fn update_distance(&mut self, distance_mm: Option<f64>) {
        self.trigger.update(distance_mm);
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().is_active()
    }

    pub fn trigger_status(&self) -> TriggerStatus {
        self.trigger.status()
    }

    /// Summary of the most recently completed session
    pub fn last_summary(&self) -> Option<SessionSummary> {
        self.last_summary.lock().clone()
    }

    /// Directory of the most recently completed session
    pub fn last_session_dir(&self) -> Option<PathBuf> {
        self.last_summary.lock().as_ref().map(|s| s.session_dir.clone())
    }

    /// Compose the per-sensor videos of a finished session into a grid
    pub fn merge_session(&self, session_dir: &Path) -> Result<MergeReport, MergeError> {
        StreamCompositor::with_options(session_dir, self.merge_options).merge()
    }
}
