//! Per-sensor capture/write pipeline
//!
//! One [`SensorRecorder`] owns a capture thread and a writer thread bridged
//! by a bounded single-producer/single-consumer queue. The capture thread
//! pulls frames from the source at a fixed rate and never blocks on I/O;
//! encoding happens only on the writer thread. Queue overflow discards the
//! newest arrival, so frames that do get written preserve capture order.

use crate::capture::FrameSource;
use crate::recorder::sink::FrameSink;
use crate::recorder::state::{RecordingError, RecordingResult, SensorStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Queue capacity in seconds of frames at the target rate
const QUEUE_SECONDS: u32 = 10;

/// Writer dequeue timeout, bounds how long a stop signal waits
const RECV_TIMEOUT: Duration = Duration::from_millis(250);

/// Maximum time the writer may spend draining queued frames at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture/write pipeline for a single sensor.
///
/// Created by a session at start, destroyed at stop. `stop()` is synchronous:
/// when it returns, the output artifact is finalized and readable.
pub struct SensorRecorder {
    id: String,
    fps: u32,
    output: PathBuf,
    stop_flag: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    accepted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
    // Kept so frames queued between writer exit and capture exit can still
    // be accounted for at stop
    queue: Receiver<crate::capture::Frame>,
    capture_thread: Option<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
}

impl SensorRecorder {
    /// Launch the capture and writer threads for one sensor.
    ///
    /// `epoch` is the shared session start instant; all frame timestamps are
    /// relative to it. Returns as soon as both threads are running.
    pub fn start(
        id: &str,
        source: Arc<dyn FrameSource>,
        fps: u32,
        sink: Box<dyn FrameSink>,
        output: PathBuf,
        epoch: Instant,
    ) -> RecordingResult<Self> {
        if fps == 0 {
            return Err(RecordingError::InvalidFrameRate(id.to_string()));
        }
        let capacity = (fps * QUEUE_SECONDS) as usize;
        Self::start_with_capacity(id, source, fps, sink, output, epoch, capacity)
    }

    fn start_with_capacity(
        id: &str,
        source: Arc<dyn FrameSource>,
        fps: u32,
        sink: Box<dyn FrameSink>,
        output: PathBuf,
        epoch: Instant,
        capacity: usize,
    ) -> RecordingResult<Self> {
        let (tx, rx) = bounded(capacity);

        let stop_flag = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let accepted = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let written = Arc::new(AtomicU64::new(0));

        let capture_thread = {
            let id = id.to_string();
            let stop_flag = stop_flag.clone();
            let failed = failed.clone();
            let accepted = accepted.clone();
            let dropped = dropped.clone();
            std::thread::spawn(move || {
                capture_loop(&id, source, fps, epoch, tx, stop_flag, failed, accepted, dropped);
            })
        };

        let writer_thread = {
            let id = id.to_string();
            let rx = rx.clone();
            let stop_flag = stop_flag.clone();
            let failed = failed.clone();
            let dropped = dropped.clone();
            let written = written.clone();
            std::thread::spawn(move || {
                writer_loop(&id, sink, rx, stop_flag, failed, dropped, written);
            })
        };

        tracing::info!("Started recorder for '{}' ({}fps, queue {})", id, fps, capacity);

        Ok(Self {
            id: id.to_string(),
            fps,
            output,
            stop_flag,
            failed,
            accepted,
            dropped,
            written,
            queue: rx,
            capture_thread: Some(capture_thread),
            writer_thread: Some(writer_thread),
        })
    }

    /// Sensor identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configured capture rate
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Output artifact path
    pub fn output(&self) -> &PathBuf {
        &self.output
    }

    /// Whether the pipeline hit a fatal write failure
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Current counter snapshot
    pub fn stats(&self) -> SensorStats {
        SensorStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop both loops and finalize the output.
    ///
    /// Blocks until the writer has drained (bounded by the drain timeout)
    /// and the sink is closed; frames still queued when the timeout elapses
    /// are counted as dropped.
    pub fn stop(&mut self) -> SensorStats {
        self.stop_flag.store(true, Ordering::Relaxed);

        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }

        // Frames the capture thread queued after the writer exited
        while self.queue.try_recv().is_ok() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        let stats = self.stats();
        tracing::info!(
            "Recorder '{}' stopped: {} accepted, {} written, {} dropped{}",
            self.id,
            stats.accepted,
            stats.written,
            stats.dropped,
            if stats.failed { " (failed)" } else { "" }
        );
        stats
    }
}

impl Drop for SensorRecorder {
    fn drop(&mut self) {
        if self.capture_thread.is_some() || self.writer_thread.is_some() {
            self.stop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn capture_loop(
    id: &str,
    source: Arc<dyn FrameSource>,
    fps: u32,
    epoch: Instant,
    tx: Sender<crate::capture::Frame>,
    stop_flag: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    accepted: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
) {
    tracing::debug!("Capture loop started for '{}'", id);

    let period = Duration::from_secs_f64(1.0 / fps as f64);
    let mut next_tick = Instant::now() + period;
    let mut last_sequence: Option<u64> = None;

    while !stop_flag.load(Ordering::Relaxed) && !failed.load(Ordering::Relaxed) {
        // Empty ticks and repeated frames are skipped, not errors: a stalled
        // sensor degrades to dropped ticks.
        if let Some(mut frame) = source.latest_frame() {
            if last_sequence != Some(frame.sequence) {
                last_sequence = Some(frame.sequence);
                frame.timestamp = epoch.elapsed().as_secs_f64();
                accepted.fetch_add(1, Ordering::Relaxed);

                match tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // Drop the newest arrival; queued frames keep FIFO order
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // Fell behind; resume pacing from now rather than bursting
            next_tick = now;
        }
    }

    tracing::debug!("Capture loop ended for '{}'", id);
}

fn writer_loop(
    id: &str,
    mut sink: Box<dyn FrameSink>,
    rx: Receiver<crate::capture::Frame>,
    stop_flag: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
) {
    tracing::debug!("Writer loop started for '{}'", id);

    let mut drain_deadline: Option<Instant> = None;

    loop {
        if stop_flag.load(Ordering::Relaxed) && drain_deadline.is_none() {
            drain_deadline = Some(Instant::now() + DRAIN_TIMEOUT);
        }
        if let Some(deadline) = drain_deadline {
            if Instant::now() >= deadline {
                tracing::warn!("Writer for '{}' hit drain timeout with frames queued", id);
                break;
            }
        }

        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(frame) => match sink.write(&frame) {
                Ok(()) => {
                    written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Fatal for this pipeline only; other sensors are unaffected
                    tracing::error!("Writer for '{}' failed: {}", id, e);
                    failed.store(true, Ordering::Relaxed);
                    dropped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if stop_flag.load(Ordering::Relaxed) && rx.is_empty() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Anything still queued will never be written
    while rx.try_recv().is_ok() {
        dropped.fetch_add(1, Ordering::Relaxed);
    }

    if let Err(e) = sink.finish() {
        tracing::error!("Failed to finalize output for '{}': {}", id, e);
        failed.store(true, Ordering::Relaxed);
    }

    tracing::debug!("Writer loop ended for '{}'", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;
    use crate::recorder::state::RecordingError;
    use crate::video::VideoError;
    use parking_lot::Mutex;

    /// Source producing a fresh frame with a new sequence on every pull
    struct CountingSource {
        next: AtomicU64,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }
    }

    impl FrameSource for CountingSource {
        fn latest_frame(&self) -> Option<Frame> {
            let seq = self.next.fetch_add(1, Ordering::Relaxed);
            Some(Frame {
                data: vec![0u8; Frame::expected_len(2, 2)],
                width: 2,
                height: 2,
                timestamp: 0.0,
                sequence: seq,
            })
        }
    }

    /// Source that keeps returning the same frame until replaced
    struct StaticSource;

    impl FrameSource for StaticSource {
        fn latest_frame(&self) -> Option<Frame> {
            Some(Frame {
                data: vec![0u8; Frame::expected_len(2, 2)],
                width: 2,
                height: 2,
                timestamp: 0.0,
                sequence: 7,
            })
        }
    }

    /// Sink recording written sequence numbers, with optional slowdown and
    /// injected failure
    struct MemorySink {
        sequences: Arc<Mutex<Vec<u64>>>,
        finished: Arc<AtomicBool>,
        delay: Duration,
        fail_after: Option<u64>,
        writes: u64,
    }

    impl MemorySink {
        fn new() -> (Self, Arc<Mutex<Vec<u64>>>, Arc<AtomicBool>) {
            let sequences = Arc::new(Mutex::new(Vec::new()));
            let finished = Arc::new(AtomicBool::new(false));
            (
                Self {
                    sequences: sequences.clone(),
                    finished: finished.clone(),
                    delay: Duration::ZERO,
                    fail_after: None,
                    writes: 0,
                },
                sequences,
                finished,
            )
        }
    }

    impl FrameSink for MemorySink {
        fn write(&mut self, frame: &Frame) -> RecordingResult<()> {
            if let Some(limit) = self.fail_after {
                if self.writes >= limit {
                    return Err(RecordingError::Video(VideoError::Encoding(
                        "disk full".to_string(),
                    )));
                }
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.writes += 1;
            self.sequences.lock().push(frame.sequence);
            Ok(())
        }

        fn finish(&mut self) -> RecordingResult<()> {
            self.finished.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn start_recorder(
        sink: MemorySink,
        fps: u32,
        capacity: usize,
    ) -> SensorRecorder {
        SensorRecorder::start_with_capacity(
            "test",
            Arc::new(CountingSource::new()),
            fps,
            Box::new(sink),
            PathBuf::from("/dev/null"),
            Instant::now(),
            capacity,
        )
        .unwrap()
    }

    #[test]
    fn test_counters_balance_after_stop() {
        let (sink, sequences, finished) = MemorySink::new();
        let mut recorder = start_recorder(sink, 200, 1000);

        std::thread::sleep(Duration::from_millis(150));
        let stats = recorder.stop();

        assert_eq!(stats.accepted, stats.written + stats.dropped);
        assert!(stats.written > 0);
        assert!(!stats.failed);
        assert_eq!(stats.written as usize, sequences.lock().len());
        assert!(finished.load(Ordering::Relaxed));
    }

    #[test]
    fn test_overflow_drops_newest_and_preserves_order() {
        let (mut sink, sequences, _) = MemorySink::new();
        sink.delay = Duration::from_millis(20);
        // Queue of 10 with a 500fps producer and a ~50fps writer overflows fast
        let mut recorder = start_recorder(sink, 500, 10);

        std::thread::sleep(Duration::from_millis(300));
        let stats = recorder.stop();

        assert!(stats.dropped > 0, "expected queue pressure drops");
        assert_eq!(stats.accepted, stats.written + stats.dropped);

        let written = sequences.lock();
        assert!(written.windows(2).all(|w| w[0] < w[1]),
            "written frames must keep capture order");
    }

    #[test]
    fn test_write_failure_is_isolated_and_counted() {
        let (mut sink, sequences, finished) = MemorySink::new();
        sink.fail_after = Some(3);
        let mut recorder = start_recorder(sink, 200, 1000);

        std::thread::sleep(Duration::from_millis(200));
        assert!(recorder.is_failed());

        let stats = recorder.stop();
        assert!(stats.failed);
        assert_eq!(stats.written, 3);
        assert_eq!(stats.accepted, stats.written + stats.dropped);
        assert_eq!(sequences.lock().len(), 3);
        // Output is still finalized on failure
        assert!(finished.load(Ordering::Relaxed));
    }

    #[test]
    fn test_repeated_source_frame_accepted_once() {
        let (sink, sequences, _) = MemorySink::new();
        let mut recorder = SensorRecorder::start_with_capacity(
            "static",
            Arc::new(StaticSource),
            200,
            Box::new(sink),
            PathBuf::from("/dev/null"),
            Instant::now(),
            1000,
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        let stats = recorder.stop();

        assert_eq!(stats.accepted, 1);
        assert_eq!(sequences.lock().as_slice(), &[7]);
    }

    #[test]
    fn test_zero_fps_rejected() {
        let (sink, _, _) = MemorySink::new();
        let result = SensorRecorder::start(
            "bad",
            Arc::new(StaticSource),
            0,
            Box::new(sink),
            PathBuf::from("/dev/null"),
            Instant::now(),
        );
        assert!(matches!(result, Err(RecordingError::InvalidFrameRate(_))));
    }
}
