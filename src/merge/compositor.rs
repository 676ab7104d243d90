//! Grid composition of finished sessions
//!
//! Reads the per-sensor videos of one session directory and produces a
//! single labeled grid video for quick human review. Sources run
//! frame-synchronously up to the shortest stream; excess frames of longer
//! sources are discarded with a recorded warning.

use crate::merge::plan::{build_label_filter, derive_label, CellRect, MergePlan, SourceDescriptor};
use crate::merge::types::{MergeError, MergeOptions, MergeReport};
use crate::video::{ffmpeg, VideoDecoder, VideoEncoder};
use std::path::PathBuf;

/// Suffix marking composite outputs, excluded from input selection
const MERGED_MARKER: &str = "merged";

/// Post-recording compositor for one session directory
pub struct StreamCompositor {
    session_dir: PathBuf,
    options: MergeOptions,
}

impl StreamCompositor {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_dir: session_dir.into(),
            options: MergeOptions::default(),
        }
    }

    pub fn with_options(session_dir: impl Into<PathBuf>, options: MergeOptions) -> Self {
        Self {
            session_dir: session_dir.into(),
            options,
        }
    }

    /// Compose all per-sensor videos of the session into
    /// `<sessionName>_merged.mp4`.
    ///
    /// Fails as a whole if any input cannot be opened; the source files are
    /// never modified and stay usable individually. Re-running never folds a
    /// previous composite back in.
    pub fn merge(&self) -> Result<MergeReport, MergeError> {
        let session_name = self
            .session_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MergeError::InvalidSessionDir(self.session_dir.clone()))?
            .to_string();

        let inputs = self.collect_inputs()?;
        if inputs.is_empty() {
            return Err(MergeError::NoSources(self.session_dir.clone()));
        }

        let mut sources = Vec::with_capacity(inputs.len());
        for path in &inputs {
            let probe = ffmpeg::probe(path)?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            sources.push(SourceDescriptor {
                path: path.clone(),
                label: derive_label(stem, &session_name),
                width: probe.width,
                height: probe.height,
                frame_count: probe.frame_count,
                fps: probe.fps,
            });
        }

        let plan = MergePlan::build(sources, self.options.target_cell_height);
        let mut warnings = plan.truncation_warnings.clone();
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        tracing::info!(
            "Merging {} video(s) into {}x{} grid ({}x{} cells), {} frames",
            plan.sources.len(),
            plan.cols,
            plan.rows,
            plan.cell_width,
            plan.cell_height,
            plan.min_frames
        );

        let mut decoders = Vec::with_capacity(plan.sources.len());
        for source in &plan.sources {
            decoders.push(VideoDecoder::open(&source.path)?);
        }

        let output = self
            .session_dir
            .join(format!("{}_{}.mp4", session_name, MERGED_MARKER));
        let filter = build_label_filter(&plan);
        let mut encoder = VideoEncoder::new(
            &output,
            plan.canvas_width(),
            plan.canvas_height(),
            self.options.fps,
            Some(&filter),
        )?;

        let canvas_width = plan.canvas_width();
        let mut canvas =
            vec![0u8; canvas_width as usize * plan.canvas_height() as usize * 3];

        'frames: for _ in 0..plan.min_frames {
            for (index, decoder) in decoders.iter_mut().enumerate() {
                let source = &plan.sources[index];
                match decoder.read_frame()? {
                    Some(frame) => scale_into(
                        &frame,
                        source.width,
                        source.height,
                        &mut canvas,
                        canvas_width,
                        plan.cell_rect(index),
                    ),
                    None => {
                        // Probed counts can over-report; stop at the real end
                        let warning = format!(
                            "'{}' ended early at frame {}",
                            source.label,
                            encoder.frame_count()
                        );
                        tracing::warn!("{}", warning);
                        warnings.push(warning);
                        break 'frames;
                    }
                }
            }
            encoder.write_frame(&canvas)?;
        }

        let frames_written = encoder.frame_count();
        encoder.finish()?;

        tracing::info!("Merge complete: {} frames -> {:?}", frames_written, output);

        Ok(MergeReport {
            output,
            frames_written,
            sources: plan.sources.iter().map(|s| s.label.clone()).collect(),
            warnings,
        })
    }

    /// Per-sensor videos of the session, excluding previous composites
    fn collect_inputs(&self) -> Result<Vec<PathBuf>, MergeError> {
        if !self.session_dir.is_dir() {
            return Err(MergeError::InvalidSessionDir(self.session_dir.clone()));
        }

        let mut inputs: Vec<PathBuf> = std::fs::read_dir(&self.session_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some("mp4")
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| !n.to_lowercase().contains(MERGED_MARKER))
                        .unwrap_or(false)
            })
            .collect();
        inputs.sort();
        Ok(inputs)
    }
}

/// Nearest-neighbor scale of a BGR frame into a canvas cell
fn scale_into(
    src: &[u8],
    src_width: u32,
    src_height: u32,
    canvas: &mut [u8],
    canvas_width: u32,
    cell: CellRect,
) {
    for row in 0..cell.height {
        let sy = (row as u64 * src_height as u64 / cell.height as u64) as u32;
        let src_row = (sy * src_width) as usize * 3;
        let dst_row = ((cell.y + row) * canvas_width + cell.x) as usize * 3;
        for col in 0..cell.width {
            let sx = (col as u64 * src_width as u64 / cell.width as u64) as usize;
            let s = src_row + sx * 3;
            let d = dst_row + col as usize * 3;
            canvas[d..d + 3].copy_from_slice(&src[s..s + 3]);
        }
    }
}
