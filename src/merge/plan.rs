//! Merge planning
//!
//! Pure geometry and labeling decisions, computed once per merge from the
//! probed source metadata and immutable thereafter. Keeping this separate
//! from the frame loop makes the layout policy testable without ffmpeg.

use std::path::PathBuf;

/// One source video entering the composite
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub path: PathBuf,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub fps: f64,
}

/// Placement of one cell on the composite canvas
#[derive(Debug, Clone, Copy)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Immutable layout for one merge invocation
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub sources: Vec<SourceDescriptor>,
    pub cols: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    /// Shortest source; composition stops here
    pub min_frames: u64,
    /// One warning per source longer than `min_frames`
    pub truncation_warnings: Vec<String>,
}

impl MergePlan {
    /// Compute the layout for the given sources
    pub fn build(sources: Vec<SourceDescriptor>, target_cell_height: u32) -> Self {
        let (cols, rows) = grid_dims(sources.len());
        let (cell_width, cell_height) = cell_size(&sources, target_cell_height);

        let min_frames = sources.iter().map(|s| s.frame_count).min().unwrap_or(0);
        let truncation_warnings = sources
            .iter()
            .filter(|s| s.frame_count > min_frames)
            .map(|s| {
                format!(
                    "'{}' truncated from {} to {} frames",
                    s.label, s.frame_count, min_frames
                )
            })
            .collect();

        Self {
            sources,
            cols,
            rows,
            cell_width,
            cell_height,
            min_frames,
            truncation_warnings,
        }
    }

    pub fn canvas_width(&self) -> u32 {
        self.cell_width * self.cols
    }

    pub fn canvas_height(&self) -> u32 {
        self.cell_height * self.rows
    }

    /// Canvas placement of the cell at grid position `index`
    pub fn cell_rect(&self, index: usize) -> CellRect {
        let row = index as u32 / self.cols;
        let col = index as u32 % self.cols;
        CellRect {
            x: col * self.cell_width,
            y: row * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        }
    }
}

/// Near-square grid for `n` cells: `cols = ceil(sqrt(n))`,
/// `rows = ceil(n / cols)`.
pub fn grid_dims(n: usize) -> (u32, u32) {
    if n == 0 {
        return (0, 0);
    }
    let cols = (n as f64).sqrt().ceil() as u32;
    let rows = (n as u32).div_ceil(cols);
    (cols, rows)
}

/// Uniform cell size for all sources.
///
/// Inheriting one source's resolution badly distorts cells when sources
/// differ wildly, so every cell gets the canonical height and a width from
/// the average aspect ratio, snapped to 16:9 when the average is close.
/// Dimensions are rounded down to even for the yuv420p encoder.
fn cell_size(sources: &[SourceDescriptor], target_height: u32) -> (u32, u32) {
    let avg_aspect = sources
        .iter()
        .map(|s| s.width as f64 / s.height as f64)
        .sum::<f64>()
        / sources.len().max(1) as f64;

    let width = if (1.5..=2.0).contains(&avg_aspect) {
        target_height * 16 / 9
    } else {
        (target_height as f64 * avg_aspect).round() as u32
    };

    (width & !1, target_height & !1)
}

/// Recover the sensor id from a per-sensor output filename.
///
/// `<sensorId>_<sessionName>` strips down to the full (possibly multi-part)
/// sensor id; when the session name is absent, fall back to the token before
/// the first separator.
pub fn derive_label(file_stem: &str, session_name: &str) -> String {
    if file_stem.contains(session_name) {
        let stripped = file_stem
            .replace(&format!("_{}", session_name), "")
            .replace(session_name, "");
        let stripped = stripped.trim_matches('_');
        if !stripped.is_empty() {
            return stripped.to_string();
        }
    }
    file_stem.split('_').next().unwrap_or(file_stem).to_string()
}

/// Escape a label for use inside a drawtext filter expression
fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '\'' | ':' | ',' | '%' | '[' | ']' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build the `-vf` drawtext chain overlaying each source's label centered
/// near the top of its cell.
pub fn build_label_filter(plan: &MergePlan) -> String {
    let mut filters = Vec::with_capacity(plan.sources.len());
    for (index, source) in plan.sources.iter().enumerate() {
        let rect = plan.cell_rect(index);
        filters.push(format!(
            "drawtext=text='{}':x={}+({}-text_w)/2:y={}:fontsize=36:fontcolor=white:box=1:boxcolor=black@0.5:boxborderw=8",
            escape_drawtext(&source.label),
            rect.x,
            rect.width,
            rect.y + 16,
        ));
    }
    filters.join(",")
}
