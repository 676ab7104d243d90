//! FFmpeg encoder and decoder wrappers
//!
//! Both directions use rawvideo over pipes in packed BGR order, the
//! canonical layout produced by the frame sources and consumed by the
//! compositor.

use crate::video::VideoError;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Metadata of a video file as reported by ffprobe
#[derive(Debug, Clone, Copy)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub fps: f64,
}

/// Probe a video file for dimensions, frame count and frame rate
pub fn probe(video_path: &Path) -> Result<VideoProbe, VideoError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=width,height,nb_read_packets,r_frame_rate",
            "-of",
            "csv=p=0",
            video_path.to_str().unwrap_or(""),
        ])
        .output()
        .map_err(|e| VideoError::Ffmpeg(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::Ffmpeg(format!("ffprobe failed: {}", stderr)));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the csv line emitted by the probe invocation
fn parse_probe_output(stdout: &str) -> Result<VideoProbe, VideoError> {
    let parts: Vec<&str> = stdout.trim().split(',').collect();

    if parts.len() < 4 {
        return Err(VideoError::Ffmpeg(format!(
            "Unexpected ffprobe output: {}",
            stdout
        )));
    }

    let width: u32 = parts[0]
        .parse()
        .map_err(|_| VideoError::Ffmpeg("Invalid width".to_string()))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| VideoError::Ffmpeg("Invalid height".to_string()))?;

    // Frame rate comes as a rational, e.g. "30/1" or "30000/1001"
    let fps_parts: Vec<&str> = parts[2].split('/').collect();
    let fps = if fps_parts.len() == 2 {
        let num: f64 = fps_parts[0].parse().unwrap_or(30.0);
        let den: f64 = fps_parts[1].parse().unwrap_or(1.0);
        num / den
    } else {
        parts[2].parse().unwrap_or(30.0)
    };

    // ffprobe reports "N/A" for streams it cannot count; a silent zero here
    // would make a merge plan with zero frames
    let frame_count: u64 = parts[3].parse().map_err(|_| {
        VideoError::Ffmpeg(format!("ffprobe reported no frame count: {}", parts[3]))
    })?;

    Ok(VideoProbe {
        width,
        height,
        frame_count,
        fps,
    })
}

/// Video decoder reading raw BGR frames from an ffmpeg subprocess
pub struct VideoDecoder {
    process: Child,
    stdout: BufReader<ChildStdout>,
    probe: VideoProbe,
    frame_size: usize,
    frames_read: u64,
}

impl VideoDecoder {
    /// Open a video file for decoding
    pub fn open(video_path: &Path) -> Result<Self, VideoError> {
        let probe = probe(video_path)?;

        tracing::debug!(
            "Opening video decoder for {:?}: {}x{}, {} frames @ {}fps",
            video_path,
            probe.width,
            probe.height,
            probe.frame_count,
            probe.fps
        );

        // -s pins the output to the probed dimensions so frames arrive
        // without padding
        let mut process = Command::new("ffmpeg")
            .args([
                "-loglevel",
                "error",
                "-i",
                video_path.to_str().unwrap_or(""),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "-s",
                &format!("{}x{}", probe.width, probe.height),
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            // Nobody reads decoder stderr; piping it would stall ffmpeg once
            // the pipe buffer fills
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VideoError::Ffmpeg(format!("Failed to start FFmpeg decoder: {}", e)))?;

        let frame_size = (probe.width * probe.height * 3) as usize;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| VideoError::Ffmpeg("Failed to capture FFmpeg stdout".to_string()))?;

        Ok(Self {
            process,
            stdout: BufReader::with_capacity(frame_size * 2, stdout),
            probe,
            frame_size,
            frames_read: 0,
        })
    }

    /// Get video dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.probe.width, self.probe.height)
    }

    /// Get total frame count reported by the probe
    pub fn frame_count(&self) -> u64 {
        self.probe.frame_count
    }

    /// Get video frame rate
    pub fn fps(&self) -> f64 {
        self.probe.fps
    }

    /// Read the next frame as packed BGR data; `None` at end of stream
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, VideoError> {
        let mut buffer = vec![0u8; self.frame_size];

        match self.stdout.read_exact(&mut buffer) {
            Ok(()) => {
                self.frames_read += 1;
                Ok(Some(buffer))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(VideoError::Decoding(format!("Failed to read frame: {}", e))),
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// Build the ffmpeg argument list for encoding raw BGR input to H.264 mp4
fn build_encoder_args(
    output_path: &Path,
    width: u32,
    height: u32,
    fps: u32,
    filter: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        // Progress chatter would fill the unread stderr pipe and stall the
        // encoder mid-session
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgr24".to_string(),
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
    ];

    if let Some(filter) = filter {
        args.extend(["-vf".to_string(), filter.to_string()]);
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]);

    args.push(output_path.to_string_lossy().to_string());
    args
}

/// Video encoder feeding raw BGR frames to an ffmpeg subprocess
pub struct VideoEncoder {
    process: Child,
    stdin: ChildStdin,
    frame_count: u64,
}

impl VideoEncoder {
    /// Start an encoder writing H.264 mp4 to `output_path`.
    ///
    /// `filter` is an optional ffmpeg `-vf` chain applied before encoding
    /// (the compositor uses it for label overlays).
    pub fn new(
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        filter: Option<&str>,
    ) -> Result<Self, VideoError> {
        let args = build_encoder_args(output_path, width, height, fps, filter);

        tracing::info!("Starting FFmpeg encoder: {:?}", args);

        let mut process = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VideoError::Ffmpeg(format!("Failed to start FFmpeg encoder: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| VideoError::Ffmpeg("Failed to capture FFmpeg stdin".to_string()))?;

        Ok(Self {
            process,
            stdin,
            frame_count: 0,
        })
    }

    /// Write one packed BGR frame to the encoder
    pub fn write_frame(&mut self, bgr_data: &[u8]) -> Result<(), VideoError> {
        self.stdin
            .write_all(bgr_data)
            .map_err(|e| VideoError::Encoding(format!("Failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    /// Get number of frames written
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Finish encoding and wait for ffmpeg to exit
    pub fn finish(self) -> Result<(), VideoError> {
        // Closing stdin signals EOF to ffmpeg
        drop(self.stdin);

        let output = self
            .process
            .wait_with_output()
            .map_err(|e| VideoError::Ffmpeg(format!("Failed to wait for FFmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Ffmpeg(format!(
                "FFmpeg exited with error: {}",
                stderr
            )));
        }

        tracing::info!("FFmpeg encoder finished: {} frames written", self.frame_count);
        Ok(())
    }
}
