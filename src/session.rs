//! Capture session: device lifecycle and frame acquisition.
//!
//! A session walks `Closed → Opened → Configured → Streaming → Stopped →
//! Closed`. Teardown is best effort and always runs to completion, even
//! when the device rejects a step.

use std::path::PathBuf;
use std::time::Duration;

use rgb::RGB8;
use tracing::{debug, info, warn};

use crate::bitmap::RasterImage;
use crate::convert::yuyv_to_rgb24;
use crate::device::V4l2Device;
use crate::error::{Error, Result};
use crate::pool::BufferPool;
use crate::traits::{CameraDevice, Format, FourCC, FrameMetadata};

/// Number of kernel buffers requested per session.
pub const BUFFER_COUNT: u32 = 4;

/// Upper bound on how long [`CaptureSession::next_frame`] waits.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device handle.
    Closed,
    /// Device handle acquired.
    Opened,
    /// Format negotiated, buffers mapped and queued.
    Configured,
    /// Device is filling buffers.
    Streaming,
    /// Streaming off and buffers unmapped; only closing remains.
    Stopped,
}

/// Which device to open and at what resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device node path.
    pub device: PathBuf,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            width: 640,
            height: 480,
        }
    }
}

/// A captured frame with the metadata of the buffer it came from.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Upright 24-bit image.
    pub image: RasterImage,
    /// Buffer metadata.
    pub metadata: FrameMetadata,
}

/// Owns a capture device and its buffer pool.
pub struct CaptureSession<D: CameraDevice> {
    device: Option<D>,
    pool: Option<BufferPool<D::Queue>>,
    format: Option<Format>,
    state: SessionState,
}

impl CaptureSession<V4l2Device> {
    /// Open a V4L2 device node.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let device = V4l2Device::open(path.into())?;
        Ok(Self::with_device(device))
    }

    /// Open, configure and start streaming in one step.
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        let mut session = Self::open(config.device.clone())?;
        session.configure(config.width, config.height)?;
        session.start()?;
        Ok(session)
    }
}

impl<D: CameraDevice> CaptureSession<D> {
    /// Wrap an already opened device.
    pub const fn with_device(device: D) -> Self {
        Self {
            device: Some(device),
            pool: None,
            format: None,
            state: SessionState::Opened,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated format, once configured.
    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Number of mapped buffers (zero before configure and after stop).
    pub fn buffer_count(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::len)
    }

    /// Number of buffers currently owned by the device.
    pub fn queued_buffers(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::queued_count)
    }

    /// The underlying device, while open.
    pub const fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Negotiate YUYV at `width`x`height`, map the buffer pool and queue
    /// every buffer.
    pub fn configure(&mut self, width: u32, height: u32) -> Result<Format> {
        self.expect_state(SessionState::Opened, "configure")?;
        check_dimensions(width, height)?;
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| Error::Device("device is closed".to_owned()))?;

        let caps = device.capabilities();
        if !caps.can_capture {
            return Err(Error::Device(format!(
                "{} does not support video capture",
                caps.card
            )));
        }
        if !caps.can_stream {
            return Err(Error::Device(format!(
                "{} does not support streaming I/O",
                caps.card
            )));
        }

        let requested = Format::new(width, height, FourCC::YUYV);
        let actual = device.set_format(&requested)?;
        if actual.fourcc != FourCC::YUYV {
            return Err(Error::Device(format!(
                "device did not accept YUYV, negotiated {}",
                actual.fourcc
            )));
        }
        if (actual.width, actual.height) != (width, height) {
            return Err(Error::Device(format!(
                "device negotiated {}x{} instead of {width}x{height}",
                actual.width, actual.height
            )));
        }
        info!(
            width = actual.width,
            height = actual.height,
            fourcc = %actual.fourcc,
            "format negotiated"
        );

        let mut pool = BufferPool::new(device.request_buffers(BUFFER_COUNT)?);
        if pool.is_empty() {
            return Err(Error::Device("driver granted no buffers".to_owned()));
        }
        pool.queue_all()?;
        debug!(buffers = pool.len(), "buffer pool ready");

        self.pool = Some(pool);
        self.format = Some(actual.clone());
        self.state = SessionState::Configured;
        Ok(actual)
    }

    /// Turn streaming on.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(SessionState::Configured, "start")?;
        let pool = self
            .pool
            .as_mut()
            .ok_or_else(|| Error::Device("no buffers mapped".to_owned()))?;

        pool.stream_on()?;
        self.state = SessionState::Streaming;
        info!("streaming started");
        Ok(())
    }

    /// Turn streaming off and unmap every buffer.
    ///
    /// Never fails; device errors are logged and teardown continues. Calling
    /// it again, or on a closed session, does nothing.
    pub fn stop(&mut self) {
        let Some(mut pool) = self.pool.take() else {
            return;
        };

        if self.state == SessionState::Streaming {
            match pool.stream_off() {
                Ok(()) => info!("streaming stopped"),
                Err(err) => warn!("failed to stop streaming: {err}"),
            }
        }
        pool.release();
        self.format = None;

        if self.state != SessionState::Closed {
            self.state = SessionState::Stopped;
        }
    }

    /// Stop, then release the device handle.
    pub fn close(&mut self) {
        self.stop();
        if self.device.take().is_some() {
            debug!("device closed");
        }
        self.state = SessionState::Closed;
    }

    /// Wait for the next frame and return it as an upright image.
    pub fn next_frame(&mut self) -> Result<RasterImage> {
        self.capture().map(|frame| frame.image)
    }

    /// Like [`next_frame`](Self::next_frame), also returning buffer metadata.
    ///
    /// The dequeued buffer is handed back to the device as soon as its bytes
    /// are converted, before the image is assembled.
    pub fn capture(&mut self) -> Result<Frame> {
        self.expect_state(SessionState::Streaming, "capture")?;
        let (Some(pool), Some(format)) = (self.pool.as_mut(), self.format.as_ref()) else {
            return Err(Error::Device("no buffers mapped".to_owned()));
        };

        match pool.wait_ready(FRAME_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => return Err(Error::Timeout(FRAME_TIMEOUT)),
            Err(err) => {
                warn!("waiting for frame failed: {err}");
                return Err(Error::Timeout(FRAME_TIMEOUT));
            }
        }

        let metadata = pool.dequeue()?;
        let rgb = yuyv_to_rgb24(pool.data(metadata.index)?, format.width, format.height);
        pool.queue(metadata.index)?;

        let image = assemble(&rgb, format.width, format.height)?;
        Ok(Frame { image, metadata })
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::Device(format!(
                "cannot {operation} while {:?}",
                self.state
            )))
        }
    }
}

impl<D: CameraDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

fn invalid_dimensions(width: u32, height: u32) -> Error {
    Error::InvalidDimensions {
        width: i32::try_from(width).unwrap_or(i32::MAX),
        height: i32::try_from(height).unwrap_or(i32::MAX),
    }
}

/// Frames must be non-empty, addressable as images, and fit a `u32` buffer.
fn check_dimensions(width: u32, height: u32) -> Result<()> {
    let addressable = width > 0
        && height > 0
        && i32::try_from(width).is_ok()
        && i32::try_from(height).is_ok();
    if addressable && Format::frame_size(width, height).is_some() {
        Ok(())
    } else {
        Err(invalid_dimensions(width, height))
    }
}

/// Build a 24-bit image from sensor-ordered RGB24, rotating it by 180
/// degrees: sensor pixel `(x, y)` lands at `(width-1-x, height-1-y)`.
fn assemble(rgb: &[u8], width: u32, height: u32) -> Result<RasterImage> {
    let invalid = || invalid_dimensions(width, height);
    let mut image = RasterImage::new(
        i32::try_from(width).map_err(|_| invalid())?,
        i32::try_from(height).map_err(|_| invalid())?,
        false,
    )?;

    let mut pixels = rgb.chunks_exact(3);
    for y in 0..height {
        for x in 0..width {
            if let Some(&[r, g, b]) = pixels.next() {
                image.set_pixel(width - 1 - x, height - 1 - y, RGB8::new(r, g, b))?;
            }
        }
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, Readiness, TestPattern};
    use crate::traits::DeviceCapabilities;

    fn streaming(device: MockDevice, width: u32, height: u32) -> CaptureSession<MockDevice> {
        let mut session = CaptureSession::with_device(device);
        session.configure(width, height).expect("configure failed");
        session.start().expect("start failed");
        session
    }

    #[test]
    fn test_lifecycle() {
        let mut session = CaptureSession::with_device(MockDevice::new());
        assert_eq!(session.state(), SessionState::Opened);

        let format = session.configure(64, 48).expect("configure failed");
        assert_eq!((format.width, format.height), (64, 48));
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.buffer_count(), BUFFER_COUNT as usize);
        assert_eq!(session.queued_buffers(), BUFFER_COUNT as usize);

        session.start().expect("start failed");
        assert_eq!(session.state(), SessionState::Streaming);

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.buffer_count(), 0);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.device().is_none());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = streaming(MockDevice::new(), 16, 8);
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);

        session.close();
        session.stop();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_capture_requeues_buffer() {
        let mut session = streaming(MockDevice::new(), 16, 8);

        for expected in 0..6 {
            let frame = session.capture().expect("capture failed");
            assert_eq!(frame.metadata.sequence, expected);
            assert_eq!(session.queued_buffers(), BUFFER_COUNT as usize);
        }
    }

    #[test]
    fn test_frame_geometry() {
        let mut session = streaming(MockDevice::new(), 16, 8);
        let image = session.next_frame().expect("next_frame failed");

        assert_eq!(image.width(), 16);
        assert_eq!(image.height(), 8);
        assert_eq!(image.bits_per_pixel(), 24);
        assert!(!image.has_alpha());
    }

    #[test]
    fn test_frame_is_flipped() {
        // Color bars: white on the sensor's left, black on its right.
        let mut session = streaming(
            MockDevice::new().with_pattern(TestPattern::ColorBars),
            16,
            2,
        );
        let image = session.next_frame().expect("next_frame failed");

        let white = RGB8::new(255, 255, 255);
        let black = RGB8::new(0, 0, 0);
        for y in 0..2 {
            assert_eq!(image.get_pixel(15, y).expect("get failed"), white);
            assert_eq!(image.get_pixel(0, y).expect("get failed"), black);
        }
    }

    #[test]
    fn test_solid_frame_converted() {
        let mut session = streaming(
            MockDevice::new().with_pattern(TestPattern::Solid(16, 128, 128)),
            4,
            4,
        );
        let image = session.next_frame().expect("next_frame failed");
        assert!(image.data().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn test_rejects_foreign_pixel_format() {
        let mut session =
            CaptureSession::with_device(MockDevice::new().with_negotiated_fourcc(FourCC::MJPG));
        let result = session.configure(64, 48);
        assert!(matches!(result, Err(Error::Device(_))));
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(session.buffer_count(), 0);
    }

    #[test]
    fn test_rejects_renegotiated_size() {
        let mut session =
            CaptureSession::with_device(MockDevice::new().with_negotiated_size(320, 240));
        let result = session.configure(1280, 720);
        assert!(matches!(result, Err(Error::Device(_))));
    }

    #[test]
    fn test_rejects_missing_capabilities() {
        let no_stream = DeviceCapabilities {
            can_capture: true,
            can_stream: false,
            ..DeviceCapabilities::default()
        };
        let mut session =
            CaptureSession::with_device(MockDevice::new().with_capabilities(no_stream));
        assert!(matches!(session.configure(64, 48), Err(Error::Device(_))));

        let no_capture = DeviceCapabilities {
            can_capture: false,
            can_stream: true,
            ..DeviceCapabilities::default()
        };
        let mut session =
            CaptureSession::with_device(MockDevice::new().with_capabilities(no_capture));
        assert!(matches!(session.configure(64, 48), Err(Error::Device(_))));
    }

    #[test]
    fn test_rejects_oversized_dimensions() {
        let mut session = CaptureSession::with_device(MockDevice::new());
        for (width, height) in [(65536, 65536), (u32::MAX, 1), (0, 480), (640, 0)] {
            assert!(
                matches!(
                    session.configure(width, height),
                    Err(Error::InvalidDimensions { .. })
                ),
                "{width}x{height} should be rejected"
            );
            assert_eq!(session.state(), SessionState::Opened);
            assert_eq!(session.buffer_count(), 0);
        }
        session.configure(8, 8).expect("configure failed");
    }

    #[test]
    fn test_format_saturates() {
        let format = Format::new(65536, 65536, FourCC::YUYV);
        assert_eq!(format.size, u32::MAX);
        assert_eq!(Format::frame_size(65536, 65536), None);
        assert_eq!(Format::frame_size(640, 480), Some(640 * 480 * 2));
    }

    #[test]
    fn test_rejects_zero_buffers() {
        let mut session =
            CaptureSession::with_device(MockDevice::new().with_granted_buffers(0));
        assert!(matches!(session.configure(64, 48), Err(Error::Device(_))));
    }

    #[test]
    fn test_queue_failure_during_configure() {
        let mut session =
            CaptureSession::with_device(MockDevice::new().with_failing_queue(2));
        assert!(matches!(session.configure(8, 8), Err(Error::Device(_))));
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(session.buffer_count(), 0);
    }

    #[test]
    fn test_dequeue_failure() {
        let mut session = streaming(MockDevice::new().with_failing_dequeue(), 8, 8);
        assert!(matches!(session.capture(), Err(Error::Device(_))));
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn test_requeue_failure() {
        // Every buffer queues once during configure, then the device fails.
        let device = MockDevice::new().with_failing_queue(BUFFER_COUNT as usize);
        let mut session = streaming(device, 8, 8);
        assert!(matches!(session.capture(), Err(Error::Device(_))));
        assert_eq!(session.queued_buffers(), BUFFER_COUNT as usize - 1);
    }

    #[test]
    fn test_fewer_buffers_granted() {
        let session = streaming(MockDevice::new().with_granted_buffers(2), 8, 8);
        assert_eq!(session.buffer_count(), 2);
    }

    #[test]
    fn test_timeout() {
        let mut session = streaming(MockDevice::new().with_readiness(Readiness::Never), 8, 8);
        assert!(matches!(session.next_frame(), Err(Error::Timeout(_))));
        // The session stays usable for another attempt.
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn test_wait_failure_is_timeout() {
        let mut session = streaming(MockDevice::new().with_readiness(Readiness::Broken), 8, 8);
        assert!(matches!(session.next_frame(), Err(Error::Timeout(_))));
    }

    #[test]
    fn test_wrong_state_rejected() {
        let mut session = CaptureSession::with_device(MockDevice::new());
        assert!(matches!(session.next_frame(), Err(Error::Device(_))));
        assert!(matches!(session.start(), Err(Error::Device(_))));

        session.configure(8, 8).expect("configure failed");
        assert!(matches!(session.next_frame(), Err(Error::Device(_))));
        assert!(matches!(session.configure(8, 8), Err(Error::Device(_))));

        session.close();
        assert!(matches!(session.next_frame(), Err(Error::Device(_))));
    }

    #[test]
    fn test_assemble_rotates() {
        // 2x2 sensor image, pixels numbered in raster order.
        let rgb = [1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4];
        let image = assemble(&rgb, 2, 2).expect("assemble failed");

        assert_eq!(image.get_pixel(1, 1).expect("get failed"), RGB8::new(1, 1, 1));
        assert_eq!(image.get_pixel(0, 1).expect("get failed"), RGB8::new(2, 2, 2));
        assert_eq!(image.get_pixel(1, 0).expect("get failed"), RGB8::new(3, 3, 3));
        assert_eq!(image.get_pixel(0, 0).expect("get failed"), RGB8::new(4, 4, 4));
    }
}
