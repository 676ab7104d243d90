//! Frame persistence sinks
//!
//! A [`FrameSink`] is the writer-loop side of a sensor pipeline. Camera-like
//! sensors encode into an mp4 via ffmpeg; the tactile-field sensor writes a
//! directory of numbered PNG frames. Sinks open lazily on the first frame,
//! once the actual resolution is known.

use crate::capture::{Frame, SensorKind};
use crate::recorder::state::RecordingResult;
use crate::video::VideoEncoder;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Output artifact kind for a sensor pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Sequential H.264 video file
    Video,
    /// Directory of numbered PNG files
    ImageSequence,
}

impl SinkKind {
    /// Default sink for a sensor kind. Tactile-field data is kept as
    /// individual frames for offline analysis; everything else becomes video.
    pub fn for_sensor(kind: SensorKind) -> Self {
        match kind {
            SensorKind::TactileField => SinkKind::ImageSequence,
            SensorKind::DepthCamera | SensorKind::ContactImager => SinkKind::Video,
        }
    }

    /// Output path for a sensor within a session directory
    pub fn output_path(&self, session_dir: &Path, sensor_id: &str, session_name: &str) -> PathBuf {
        match self {
            SinkKind::Video => session_dir.join(format!("{}_{}.mp4", sensor_id, session_name)),
            SinkKind::ImageSequence => session_dir.join(format!("{}_{}", sensor_id, session_name)),
        }
    }

    /// Build the sink for a prepared output path
    pub fn build(&self, output: &Path, fps: u32) -> RecordingResult<Box<dyn FrameSink>> {
        match self {
            SinkKind::Video => Ok(Box::new(VideoSink::new(output.to_path_buf(), fps))),
            SinkKind::ImageSequence => Ok(Box::new(ImageSequenceSink::new(output.to_path_buf())?)),
        }
    }
}

/// Destination for the frames of one sensor pipeline.
///
/// `write` is the only slow operation in the pipeline and runs exclusively
/// on the writer thread. A write error is fatal for this sink only.
pub trait FrameSink: Send {
    /// Persist one frame
    fn write(&mut self, frame: &Frame) -> RecordingResult<()>;

    /// Flush and finalize the output artifact
    fn finish(&mut self) -> RecordingResult<()>;
}

/// Sink encoding frames into an mp4 through ffmpeg
pub struct VideoSink {
    output: PathBuf,
    fps: u32,
    encoder: Option<VideoEncoder>,
}

impl VideoSink {
    pub fn new(output: PathBuf, fps: u32) -> Self {
        Self {
            output,
            fps,
            encoder: None,
        }
    }
}

impl FrameSink for VideoSink {
    fn write(&mut self, frame: &Frame) -> RecordingResult<()> {
        if self.encoder.is_none() {
            let encoder =
                VideoEncoder::new(&self.output, frame.width, frame.height, self.fps, None)?;
            tracing::info!(
                "Video sink initialized: {:?} ({}x{} @ {}fps)",
                self.output,
                frame.width,
                frame.height,
                self.fps
            );
            self.encoder = Some(encoder);
        }

        if let Some(encoder) = self.encoder.as_mut() {
            encoder.write_frame(&frame.data)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> RecordingResult<()> {
        if let Some(encoder) = self.encoder.take() {
            encoder.finish()?;
        }
        Ok(())
    }
}

/// Sink writing each frame as a numbered PNG inside a per-sensor directory
pub struct ImageSequenceSink {
    dir: PathBuf,
    next_index: u64,
}

impl ImageSequenceSink {
    pub fn new(dir: PathBuf) -> RecordingResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, next_index: 0 })
    }
}

impl FrameSink for ImageSequenceSink {
    fn write(&mut self, frame: &Frame) -> RecordingResult<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.next_index));
        let file = BufWriter::new(File::create(&path)?);

        let mut encoder = png::Encoder::new(file, frame.width, frame.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;

        // PNG wants RGB; frames arrive BGR
        let mut rgb = Vec::with_capacity(frame.data.len());
        for px in frame.data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        writer.write_image_data(&rgb)?;

        self.next_index += 1;
        Ok(())
    }

    fn finish(&mut self) -> RecordingResult<()> {
        Ok(())
    }
}
