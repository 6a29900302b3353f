//! Error taxonomy shared by the bitmap codec and the capture session.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by image and capture operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported bitmap file content.
    #[error("invalid bitmap: {0}")]
    Format(String),

    /// Operation is not valid for the image's bit depth.
    #[error("{operation} does not support {bits_per_pixel}-bit images")]
    UnsupportedFormat {
        /// Operation that was attempted.
        operation: &'static str,
        /// Bit depth of the image.
        bits_per_pixel: u16,
    },

    /// Pixel coordinate outside the image extent.
    #[error("pixel ({x}, {y}) is outside the {width}x{height} image")]
    Bounds {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },

    /// Invalid construction arguments.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },

    /// File could not be opened, created, read or written.
    #[error("{context}: {source}")]
    Io {
        /// What was being done, including the path when there is one.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Capability, ioctl or mapping failure on the capture device.
    #[error("device error: {0}")]
    Device(String),

    /// No frame became ready within the wait bound.
    #[error("no frame ready within {0:?}")]
    Timeout(Duration),

    /// A captured frame does not show the expected test pattern.
    #[error("frame validation failed: {0}")]
    Validation(String),
}

impl Error {
    pub(crate) fn io<C: Into<String>>(context: C, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn device<E: std::fmt::Display>(operation: &str, err: E) -> Self {
        Self::Device(format!("{operation}: {err}"))
    }
}

/// Result type for image and capture operations.
pub type Result<T> = std::result::Result<T, Error>;
