//! Mock device implementation for testing without hardware.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::{BufferQueue, CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata};

/// How the mock answers readiness waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A frame is ready whenever a buffer is queued.
    Ready,
    /// The wait always times out.
    Never,
    /// The wait call itself fails.
    Broken,
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    negotiated_fourcc: Option<FourCC>,
    negotiated_size: Option<(u32, u32)>,
    granted_buffers: Option<u32>,
    pattern: TestPattern,
    readiness: Readiness,
    queue_budget: Option<usize>,
    failing_dequeue: bool,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            negotiated_fourcc: None,
            negotiated_size: None,
            granted_buffers: None,
            pattern: TestPattern::ColorBars,
            readiness: Readiness::Ready,
            queue_budget: None,
            failing_dequeue: false,
        }
    }

    /// Set the capabilities for this mock device.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Answer every format request with this pixel format.
    #[must_use]
    pub fn with_negotiated_fourcc(mut self, fourcc: FourCC) -> Self {
        self.negotiated_fourcc = Some(fourcc);
        self
    }

    /// Answer every format request with these dimensions.
    #[must_use]
    pub fn with_negotiated_size(mut self, width: u32, height: u32) -> Self {
        self.negotiated_size = Some((width, height));
        self
    }

    /// Grant this many buffers regardless of the request.
    #[must_use]
    pub fn with_granted_buffers(mut self, count: u32) -> Self {
        self.granted_buffers = Some(count);
        self
    }

    /// Set the test pattern for frame generation.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set how readiness waits behave.
    #[must_use]
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    /// Let the first `successes` queue calls through, fail every later one.
    #[must_use]
    pub fn with_failing_queue(mut self, successes: usize) -> Self {
        self.queue_budget = Some(successes);
        self
    }

    /// Fail every dequeue.
    #[must_use]
    pub fn with_failing_dequeue(mut self) -> Self {
        self.failing_dequeue = true;
        self
    }
}

impl CameraDevice for MockDevice {
    type Queue = MockQueue;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let (width, height) = self
            .negotiated_size
            .unwrap_or((format.width, format.height));
        let fourcc = self.negotiated_fourcc.unwrap_or(format.fourcc);
        self.format = Format::new(width, height, fourcc);
        Ok(self.format.clone())
    }

    fn request_buffers(&mut self, count: u32) -> Result<Self::Queue> {
        let granted = self.granted_buffers.unwrap_or(count);
        if granted == 0 {
            return Err(Error::Device("driver granted no buffers".to_owned()));
        }

        let size = self.format.size as usize;
        Ok(MockQueue {
            format: self.format.clone(),
            pattern: self.pattern,
            readiness: self.readiness,
            queue_budget: self.queue_budget,
            failing_dequeue: self.failing_dequeue,
            buffers: vec![vec![0; size]; granted as usize],
            queued: VecDeque::new(),
            streaming: false,
            sequence: 0,
        })
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Mock buffer pool. Fills a buffer with the test pattern when it is
/// dequeued, in queueing order.
pub struct MockQueue {
    format: Format,
    pattern: TestPattern,
    readiness: Readiness,
    queue_budget: Option<usize>,
    failing_dequeue: bool,
    buffers: Vec<Vec<u8>>,
    queued: VecDeque<usize>,
    streaming: bool,
    sequence: u32,
}

impl MockQueue {
    /// Whether streaming is on.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }
}

impl BufferQueue for MockQueue {
    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn queue(&mut self, index: usize) -> Result<()> {
        if index >= self.buffers.len() || self.queued.contains(&index) {
            return Err(Error::Device(format!("VIDIOC_QBUF: invalid buffer {index}")));
        }
        match &mut self.queue_budget {
            Some(0) => return Err(Error::Device("VIDIOC_QBUF: device error".to_owned())),
            Some(budget) => *budget -= 1,
            None => {}
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn wait_ready(&mut self, _timeout: Duration) -> Result<bool> {
        match self.readiness {
            Readiness::Ready => Ok(self.streaming && !self.queued.is_empty()),
            Readiness::Never => Ok(false),
            Readiness::Broken => Err(Error::Device("poll: interrupted".to_owned())),
        }
    }

    fn dequeue(&mut self) -> Result<FrameMetadata> {
        if !self.streaming {
            return Err(Error::Device("VIDIOC_DQBUF: not streaming".to_owned()));
        }
        if self.failing_dequeue {
            return Err(Error::Device("VIDIOC_DQBUF: device error".to_owned()));
        }
        let index = self
            .queued
            .pop_front()
            .ok_or_else(|| Error::Device("VIDIOC_DQBUF: no buffer queued".to_owned()))?;

        if let Some(buffer) = self.buffers.get_mut(index) {
            fill_test_frame(buffer, &self.format, self.pattern);
        }

        let sequence = self.sequence;
        self.sequence += 1;

        Ok(FrameMetadata {
            index,
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
            bytes_used: self.format.size,
        })
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    fn stream_on(&mut self) -> Result<()> {
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> Result<()> {
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.buffers.clear();
    }
}

/// Generate test frame data based on pattern.
fn fill_test_frame(data: &mut [u8], format: &Format, pattern: TestPattern) {
    match pattern {
        TestPattern::ColorBars => {
            generate_color_bars(data, format.width, format.height);
        }
        TestPattern::Gradient => {
            generate_gradient(data, format.width, format.height);
        }
        TestPattern::Solid(y, u, v) => {
            generate_solid(data, y, u, v);
        }
    }
}

/// YUYV values of the 8 color bars:
/// White, Yellow, Cyan, Green, Magenta, Red, Blue, Black.
pub const COLOR_BARS_YUV: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32, height: u32) {
    let bar_width = (width / 8).max(1);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let bar_idx = (x / bar_width).min(7) as usize;
            let (y_val, u_val, v_val) = COLOR_BARS_YUV[bar_idx];

            let offset = ((y * width + x) * 2) as usize;
            if let Some(group) = data.get_mut(offset..offset + 4) {
                group.copy_from_slice(&[y_val, u_val, y_val, v_val]);
            }
        }
    }
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32, height: u32) {
    for y in 0..height {
        for x in (0..width).step_by(2) {
            #[allow(clippy::cast_possible_truncation)]
            let y_val = ((x * 255) / width) as u8;
            let offset = ((y * width + x) * 2) as usize;

            if let Some(group) = data.get_mut(offset..offset + 4) {
                group.copy_from_slice(&[y_val, 128, y_val, 128]);
            }
        }
    }
}

/// Generate solid color YUYV frame.
fn generate_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for group in data.chunks_exact_mut(4) {
        group.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        assert_eq!(device.format.width, 640);
        assert_eq!(device.format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device.set_format(&new_format).expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);
    }

    #[test]
    fn test_mock_negotiation_override() {
        let mut device = MockDevice::new()
            .with_negotiated_fourcc(FourCC::MJPG)
            .with_negotiated_size(320, 240);
        let actual = device
            .set_format(&Format::new(640, 480, FourCC::YUYV))
            .expect("set_format should succeed");
        assert_eq!(actual.fourcc, FourCC::MJPG);
        assert_eq!((actual.width, actual.height), (320, 240));
    }

    #[test]
    fn test_mock_queue_protocol() {
        let mut queue = MockDevice::new()
            .request_buffers(2)
            .expect("request_buffers should succeed");
        assert_eq!(queue.buffer_count(), 2);

        queue.queue(0).expect("queue should succeed");
        assert!(queue.queue(0).is_err(), "double queue must fail");
        assert!(!queue.wait_ready(Duration::ZERO).expect("wait should succeed"));

        queue.stream_on().expect("stream_on should succeed");
        assert!(queue.is_streaming());
        assert!(queue.wait_ready(Duration::ZERO).expect("wait should succeed"));

        let meta = queue.dequeue().expect("dequeue should succeed");
        assert_eq!(meta.index, 0);
        assert_eq!(meta.sequence, 0);
        assert!(queue.dequeue().is_err(), "nothing left to dequeue");
    }

    #[test]
    fn test_mock_queue_failures() {
        let mut queue = MockDevice::new()
            .with_failing_queue(1)
            .with_failing_dequeue()
            .request_buffers(2)
            .expect("request_buffers should succeed");
        queue.queue(0).expect("first queue should succeed");
        assert!(queue.queue(1).is_err(), "budget exhausted");

        queue.stream_on().expect("stream_on should succeed");
        assert!(queue.dequeue().is_err(), "dequeue should fail");
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let mut data = vec![0u8; format.size as usize];
        fill_test_frame(&mut data, &format, TestPattern::ColorBars);

        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
        // Last bar should be black (Y=16)
        assert_eq!(data[data.len() - 4], 16);
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let mut data = vec![0u8; format.size as usize];
        fill_test_frame(&mut data, &format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = (479 * 640 * 2) as usize;
        let last_pixel_y = data[last_row_start + 638 * 2];
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let mut data = vec![0u8; format.size as usize];
        fill_test_frame(&mut data, &format, TestPattern::Solid(128, 64, 192));

        // All Y values should be 128
        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);

        // U should be 64, V should be 192
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }
}
