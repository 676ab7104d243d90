//! Proximity-driven recording trigger
//!
//! A four-state hysteresis machine turning a noisy distance signal into
//! clean start/stop actions. Two distinct thresholds (arm closer than
//! disarm) prevent rapid toggling when the true distance hovers near a
//! single cutoff, and a cooldown separates consecutive recording cycles.
//!
//! The machine is purely reactive: `update` is called once per available
//! distance sample from a single external loop, never concurrently.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Phase of the trigger state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPhase {
    /// Waiting for a sustained close distance
    Idle,
    /// Single-tick transition state; fires the start callback
    Armed,
    /// Recording until the distance exceeds the disarm threshold
    Recording,
    /// Waiting out the cooldown before re-arming
    Cooldown,
}

/// Trigger thresholds and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerConfig {
    /// Distance below which the machine arms, in millimeters
    pub arm_threshold_mm: f64,

    /// Distance above which recording stops; farther than the arm
    /// threshold to provide hysteresis
    pub disarm_threshold_mm: f64,

    /// Consecutive close samples required before starting
    pub stable_samples: u32,

    /// Pause after a recording stops before the machine can re-arm
    pub cooldown_secs: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            arm_threshold_mm: 50.0,
            disarm_threshold_mm: 150.0,
            stable_samples: 5,
            cooldown_secs: 2.0,
        }
    }
}

impl TriggerConfig {
    fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs)
    }
}

/// Snapshot of trigger state for a display layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatus {
    pub phase: TriggerPhase,
    pub last_distance_mm: Option<f64>,
    pub stable_samples: u32,
    pub recording_duration_secs: f64,
    pub cooldown_remaining_secs: f64,
}

type Callback = Box<dyn FnMut() + Send>;

/// Hysteresis state machine driving session start/stop from distance
/// samples.
///
/// Callbacks fire exactly once per transition. The trigger does not check
/// whether a manual recording is already in progress; the caller guards
/// that before wiring the callbacks.
pub struct ProximityTrigger {
    config: TriggerConfig,
    phase: TriggerPhase,
    stable_count: u32,
    last_distance: Option<f64>,
    phase_entered: Instant,
    recording_started: Option<Instant>,
    on_start: Option<Callback>,
    on_stop: Option<Callback>,
}

impl ProximityTrigger {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            phase: TriggerPhase::Idle,
            stable_count: 0,
            last_distance: None,
            phase_entered: Instant::now(),
            recording_started: None,
            on_start: None,
            on_stop: None,
        }
    }

    /// Set the callback fired when recording should start
    pub fn on_recording_start(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_start = Some(Box::new(callback));
    }

    /// Set the callback fired when recording should stop
    pub fn on_recording_stop(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_stop = Some(Box::new(callback));
    }

    /// Current phase
    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    /// Feed one distance sample (millimeters), or `None` when the detection
    /// pipeline produced nothing.
    ///
    /// A missing sample resets the stable counter but never stops an active
    /// recording by itself; only an explicit far reading does.
    pub fn update(&mut self, distance_mm: Option<f64>) {
        self.last_distance = distance_mm;

        match self.phase {
            TriggerPhase::Idle => match distance_mm {
                Some(d) if d < self.config.arm_threshold_mm => {
                    self.stable_count += 1;
                    if self.stable_count >= self.config.stable_samples {
                        tracing::info!(
                            "Armed: {:.1}mm < {:.1}mm for {} samples",
                            d,
                            self.config.arm_threshold_mm,
                            self.stable_count
                        );
                        self.trigger_start();
                    }
                }
                _ => {
                    self.stable_count = 0;
                }
            },

            // Armed is a single-tick state; update never observes it
            TriggerPhase::Armed => {}

            TriggerPhase::Recording => {
                if let Some(d) = distance_mm {
                    if d > self.config.disarm_threshold_mm {
                        tracing::info!(
                            "Distance {:.1}mm > {:.1}mm, stopping",
                            d,
                            self.config.disarm_threshold_mm
                        );
                        self.trigger_stop();
                    }
                }
            }

            TriggerPhase::Cooldown => {
                if self.phase_entered.elapsed() >= self.config.cooldown() {
                    tracing::info!("Cooldown complete");
                    self.enter(TriggerPhase::Idle);
                }
            }
        }
    }

    /// Stop an active recording immediately (cleanup path)
    pub fn force_stop(&mut self) {
        if self.phase == TriggerPhase::Recording {
            tracing::warn!("Force stopping recording");
            self.trigger_stop();
        }
    }

    /// State snapshot for display
    pub fn status(&self) -> TriggerStatus {
        TriggerStatus {
            phase: self.phase,
            last_distance_mm: self.last_distance,
            stable_samples: self.stable_count,
            recording_duration_secs: self
                .recording_started
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            cooldown_remaining_secs: if self.phase == TriggerPhase::Cooldown {
                (self.config.cooldown().as_secs_f64() - self.phase_entered.elapsed().as_secs_f64())
                    .max(0.0)
            } else {
                0.0
            },
        }
    }

    fn enter(&mut self, phase: TriggerPhase) {
        self.phase = phase;
        self.phase_entered = Instant::now();
        self.stable_count = 0;
    }

    fn trigger_start(&mut self) {
        self.enter(TriggerPhase::Armed);
        if let Some(callback) = self.on_start.as_mut() {
            callback();
        }
        self.enter(TriggerPhase::Recording);
        self.recording_started = Some(Instant::now());
    }

    fn trigger_stop(&mut self) {
        if let Some(started) = self.recording_started.take() {
            tracing::info!("Recording ran {:.1}s", started.elapsed().as_secs_f64());
        }
        if let Some(callback) = self.on_stop.as_mut() {
            callback();
        }
        self.enter(TriggerPhase::Cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_trigger(config: TriggerConfig) -> (ProximityTrigger, Arc<AtomicU32>, Arc<AtomicU32>) {
        let starts = Arc::new(AtomicU32::new(0));
        let stops = Arc::new(AtomicU32::new(0));
        let mut trigger = ProximityTrigger::new(config);
        {
            let starts = starts.clone();
            trigger.on_recording_start(move || {
                starts.fetch_add(1, Ordering::Relaxed);
            });
        }
        {
            let stops = stops.clone();
            trigger.on_recording_stop(move || {
                stops.fetch_add(1, Ordering::Relaxed);
            });
        }
        (trigger, starts, stops)
    }

    #[test]
    fn test_single_cycle_with_hysteresis() {
        let config = TriggerConfig {
            arm_threshold_mm: 50.0,
            disarm_threshold_mm: 90.0,
            stable_samples: 3,
            cooldown_secs: 60.0,
        };
        let (mut trigger, starts, stops) = counting_trigger(config);

        let samples = [100.0, 100.0, 100.0, 40.0, 40.0, 40.0, 40.0, 95.0, 95.0];
        let mut phases = Vec::new();
        for d in samples {
            trigger.update(Some(d));
            phases.push(trigger.phase());
        }

        // Start fires at the third consecutive 40, stop at the first 95
        assert_eq!(starts.load(Ordering::Relaxed), 1);
        assert_eq!(stops.load(Ordering::Relaxed), 1);
        assert_eq!(phases[4], TriggerPhase::Idle);
        assert_eq!(phases[5], TriggerPhase::Recording);
        assert_eq!(phases[7], TriggerPhase::Cooldown);
        assert_eq!(phases[8], TriggerPhase::Cooldown);
    }

    #[test]
    fn test_missing_sample_resets_counter_but_not_recording() {
        let config = TriggerConfig {
            arm_threshold_mm: 50.0,
            disarm_threshold_mm: 90.0,
            stable_samples: 3,
            cooldown_secs: 60.0,
        };
        let (mut trigger, starts, stops) = counting_trigger(config);

        // Interrupted close streak never arms
        trigger.update(Some(40.0));
        trigger.update(Some(40.0));
        trigger.update(None);
        trigger.update(Some(40.0));
        trigger.update(Some(40.0));
        assert_eq!(starts.load(Ordering::Relaxed), 0);
        assert_eq!(trigger.phase(), TriggerPhase::Idle);

        // Complete the streak, then lose the signal: recording continues
        trigger.update(Some(40.0));
        assert_eq!(trigger.phase(), TriggerPhase::Recording);
        trigger.update(None);
        trigger.update(None);
        assert_eq!(trigger.phase(), TriggerPhase::Recording);
        assert_eq!(stops.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_distance_between_thresholds_keeps_recording() {
        let config = TriggerConfig {
            arm_threshold_mm: 50.0,
            disarm_threshold_mm: 90.0,
            stable_samples: 1,
            cooldown_secs: 60.0,
        };
        let (mut trigger, starts, stops) = counting_trigger(config);

        trigger.update(Some(30.0));
        assert_eq!(trigger.phase(), TriggerPhase::Recording);

        // In the hysteresis band: no toggling
        for _ in 0..20 {
            trigger.update(Some(70.0));
        }
        assert_eq!(trigger.phase(), TriggerPhase::Recording);
        assert_eq!(starts.load(Ordering::Relaxed), 1);
        assert_eq!(stops.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_cooldown_then_rearm() {
        let config = TriggerConfig {
            arm_threshold_mm: 50.0,
            disarm_threshold_mm: 90.0,
            stable_samples: 1,
            cooldown_secs: 0.0,
        };
        let (mut trigger, starts, stops) = counting_trigger(config);

        trigger.update(Some(30.0));
        trigger.update(Some(120.0));
        assert_eq!(trigger.phase(), TriggerPhase::Cooldown);

        // Zero cooldown expires on the next update; close samples in
        // cooldown are ignored
        trigger.update(Some(30.0));
        assert_eq!(trigger.phase(), TriggerPhase::Idle);

        trigger.update(Some(30.0));
        assert_eq!(trigger.phase(), TriggerPhase::Recording);
        assert_eq!(starts.load(Ordering::Relaxed), 2);
        assert_eq!(stops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_force_stop() {
        let config = TriggerConfig {
            stable_samples: 1,
            ..TriggerConfig::default()
        };
        let (mut trigger, _, stops) = counting_trigger(config);

        trigger.update(Some(30.0));
        assert_eq!(trigger.phase(), TriggerPhase::Recording);

        trigger.force_stop();
        assert_eq!(trigger.phase(), TriggerPhase::Cooldown);
        assert_eq!(stops.load(Ordering::Relaxed), 1);

        // Idempotent outside of Recording
        trigger.force_stop();
        assert_eq!(stops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_status_snapshot() {
        let (mut trigger, _, _) = counting_trigger(TriggerConfig::default());
        trigger.update(Some(42.0));

        let status = trigger.status();
        assert_eq!(status.phase, TriggerPhase::Idle);
        assert_eq!(status.last_distance_mm, Some(42.0));
        assert_eq!(status.stable_samples, 1);
        assert_eq!(status.cooldown_remaining_secs, 0.0);
    }
}
