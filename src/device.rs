//! V4L2 device implementation using the v4l crate.

use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::device::Handle;
use v4l::format::FieldOrder;
use v4l::video::Capture;
use v4l::Device;

use crate::error::{Error, Result};
use crate::sys::{self, MappedBuffer};
use crate::traits::{BufferQueue, CameraDevice, DeviceCapabilities, Format, FourCC, FrameMetadata};

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4l2Device {
    device: Device,
    path: PathBuf,
    capabilities: DeviceCapabilities,
}

impl V4l2Device {
    /// Open a V4L2 device node (e.g., `/dev/video0`).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::with_path(path)
            .map_err(|err| Error::device(&format!("open {}", path.display()), err))?;

        let caps = device
            .query_caps()
            .map_err(|err| Error::device("VIDIOC_QUERYCAP", err))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        info!(
            path = %path.display(),
            card = %capabilities.card,
            driver = %capabilities.driver,
            "device opened"
        );

        Ok(Self {
            device,
            path: path.to_owned(),
            capabilities,
        })
    }

    /// Device node path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for V4l2Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Device")
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn from_v4l(fmt: &v4l::Format) -> Format {
    Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    }
}

impl CameraDevice for V4l2Device {
    type Queue = V4l2Buffers;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| Error::device("VIDIOC_G_FMT", err))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();
        fmt.field_order = FieldOrder::Progressive;

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| Error::device("VIDIOC_S_FMT", err))?;

        Ok(from_v4l(&fmt))
    }

    fn request_buffers(&mut self, count: u32) -> Result<Self::Queue> {
        let handle = self.device.handle();
        let fd = handle.fd();

        let granted =
            sys::request_buffers(fd, count).map_err(|err| Error::device("VIDIOC_REQBUFS", err))?;
        if granted == 0 {
            return Err(Error::Device(format!(
                "driver granted no buffers (requested {count})"
            )));
        }

        // Built up in place so a failed mapping still frees the kernel buffers.
        let mut pool = V4l2Buffers {
            handle,
            buffers: Vec::with_capacity(granted as usize),
            released: false,
        };
        for index in 0..granted {
            let buffer = sys::map_buffer(fd, index)
                .map_err(|err| Error::device(&format!("map buffer {index}"), err))?;
            debug!(index, len = buffer.as_slice().len(), "buffer mapped");
            pool.buffers.push(buffer);
        }

        Ok(pool)
    }
}

/// Memory-mapped V4L2 capture buffers.
///
/// Holds its own reference to the device handle so the file descriptor
/// outlives every mapping.
pub struct V4l2Buffers {
    handle: Arc<Handle>,
    buffers: Vec<MappedBuffer>,
    released: bool,
}

impl V4l2Buffers {
    fn fd(&self) -> c_int {
        self.handle.fd()
    }
}

impl std::fmt::Debug for V4l2Buffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Buffers")
            .field("fd", &self.fd())
            .field("buffers", &self.buffers.len())
            .finish()
    }
}

impl BufferQueue for V4l2Buffers {
    fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn queue(&mut self, index: usize) -> Result<()> {
        let index = u32::try_from(index).map_err(|err| Error::device("VIDIOC_QBUF", err))?;
        sys::queue_buffer(self.fd(), index).map_err(|err| Error::device("VIDIOC_QBUF", err))
    }

    fn wait_ready(&mut self, timeout: Duration) -> Result<bool> {
        let millis = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
        self.handle
            .poll(libc::POLLIN, millis)
            .map(|ready| ready > 0)
            .map_err(|err| Error::device("poll", err))
    }

    fn dequeue(&mut self) -> Result<FrameMetadata> {
        let buf = sys::dequeue_buffer(self.fd()).map_err(|err| Error::device("VIDIOC_DQBUF", err))?;
        Ok(FrameMetadata {
            index: buf.index as usize,
            sequence: buf.sequence,
            timestamp: buf.timestamp,
            bytes_used: buf.bytes_used,
        })
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(MappedBuffer::as_slice)
    }

    fn stream_on(&mut self) -> Result<()> {
        sys::stream_on(self.fd()).map_err(|err| Error::device("VIDIOC_STREAMON", err))
    }

    fn stream_off(&mut self) -> Result<()> {
        sys::stream_off(self.fd()).map_err(|err| Error::device("VIDIOC_STREAMOFF", err))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Dropping a mapping unmaps it.
        self.buffers.clear();
        if let Err(err) = sys::request_buffers(self.fd(), 0) {
            warn!("failed to free device buffers: {err}");
        }
    }
}

impl Drop for V4l2Buffers {
    fn drop(&mut self) {
        self.release();
    }
}
