//! Error type shared by every module in the crate.
//!
//! All operations are pure and deterministic, so nothing here is retryable:
//! an `Err` means the caller handed in something that breaks a contract
//! (a reversed range, images of different sizes) or an I/O step failed.

use std::fmt;
use thiserror::Error;

/// Which document of a comparison an offset refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocSide {
    /// Document A, the original.
    Original,
    /// Document B, the modified text.
    Modified,
}

impl fmt::Display for DocSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Original => "original",
            Self::Modified => "modified",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid range: from {from} is past to {to}")]
    InvalidRange { from: usize, to: usize },

    #[error("Chunk {index} has an invalid range on the {side} side: from {from} is past to {to}")]
    InvalidChunk {
        index: usize,
        side: DocSide,
        from: usize,
        to: usize,
    },

    #[error("Image dimensions differ: base is {base_width}x{base_height}, overlay is {overlay_width}x{overlay_height}")]
    DimensionMismatch {
        base_width: u32,
        base_height: u32,
        overlay_width: u32,
        overlay_height: u32,
    },

    #[error("Pixel buffer for a {width}x{height} image must be {expected} bytes, got {actual}")]
    BufferLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown diff algorithm: {0} (expected \"perceptual\" or \"raw-channel\")")]
    UnknownAlgorithm(String),

    #[error("Line ending must not be empty")]
    EmptyLineEnding,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to parse chunk JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for mlua::Error {
    fn from(err: Error) -> Self {
        mlua::Error::external(err)
    }
}
