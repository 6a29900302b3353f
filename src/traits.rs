//! Core traits and types for the capture device abstraction.
//!
//! A [`CameraDevice`] negotiates the format and hands out a [`BufferQueue`],
//! the kernel-owned buffer pool driven by the capture session.

use std::time::Duration;

use crate::error::Result;

/// Pixel format representation (e.g., YUYV, MJPG).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in &self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    ///
    /// Stride and size saturate at `u32::MAX`; use
    /// [`frame_size`](Self::frame_size) to reject such dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width.saturating_mul(2); // YUYV is 2 bytes per pixel
        let size = stride.saturating_mul(height);
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Bytes in one YUYV frame of `width`x`height`, or `None` if that does
    /// not fit in `u32`.
    pub const fn frame_size(width: u32, height: u32) -> Option<u32> {
        match width.checked_mul(2) {
            Some(stride) => stride.checked_mul(height),
            None => None,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a dequeued frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Device-assigned buffer index.
    pub index: usize,
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// Buffer pool type returned by `request_buffers`.
    type Queue: BufferQueue;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Ask the driver for `count` buffers and map every buffer it grants.
    ///
    /// The driver may grant fewer buffers than requested. None of the
    /// returned buffers is queued yet.
    fn request_buffers(&mut self, count: u32) -> Result<Self::Queue>;
}

/// Queue/dequeue protocol over a fixed set of mapped buffers.
///
/// Buffers are addressed by the index the device assigned them. Between
/// [`queue`](Self::queue) and [`dequeue`](Self::dequeue) a buffer belongs
/// to the device and its memory must not be read.
pub trait BufferQueue {
    /// Number of mapped buffers.
    fn buffer_count(&self) -> usize;

    /// Hand buffer `index` to the device.
    fn queue(&mut self, index: usize) -> Result<()>;

    /// Block until a filled buffer can be dequeued.
    ///
    /// Returns `Ok(false)` when `timeout` elapses first.
    fn wait_ready(&mut self, timeout: Duration) -> Result<bool>;

    /// Take the oldest filled buffer back from the device.
    fn dequeue(&mut self) -> Result<FrameMetadata>;

    /// Mapped bytes of buffer `index`.
    fn buffer(&self, index: usize) -> Option<&[u8]>;

    /// Turn streaming on.
    fn stream_on(&mut self) -> Result<()>;

    /// Turn streaming off, returning every buffer to the application.
    fn stream_off(&mut self) -> Result<()>;

    /// Unmap every buffer. Safe to call more than once.
    fn release(&mut self);
}
