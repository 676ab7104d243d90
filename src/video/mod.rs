//! FFmpeg-backed video I/O
//!
//! Raw BGR frames travel over pipes to and from ffmpeg subprocesses; this
//! crate never links a codec library directly.

pub mod ffmpeg;

pub use ffmpeg::{VideoDecoder, VideoEncoder, VideoProbe};

use thiserror::Error;

/// Video I/O errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}
