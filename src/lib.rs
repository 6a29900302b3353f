//! BMP-Cam-Capture: V4L2 frame capture into bottom-up BMP raster images.
//!
//! The library streams YUYV frames from a V4L2 capture device through a
//! small ring of memory-mapped buffers, converts them to RGB and hands them
//! out as [`RasterImage`]s that can be saved as Windows bitmap files.
//!
//! Device access sits behind the [`CameraDevice`] and [`BufferQueue`] traits,
//! enabling both production use with real hardware and testing with mock
//! devices.

pub mod bitmap;
pub mod convert;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod sink;
pub mod traits;
pub mod validation;

mod sys;

#[cfg(test)]
pub mod mock;

pub use bitmap::RasterImage;
pub use device::V4l2Device;
pub use error::{Error, Result};
pub use pipeline::LoopOptions;
pub use session::{CaptureConfig, CaptureSession, Frame, SessionState};
pub use sink::{BmpSequenceSink, CloseHandle, FrameSink};
pub use traits::{BufferQueue, CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata};
