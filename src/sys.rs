//! Raw V4L2 streaming I/O: buffer ioctls and memory mapping.
//!
//! This is the only module allowed to use `unsafe`. Every call passes
//! zero-initialised kernel structs by pointer and checks the return value.
#![allow(unsafe_code)]

use std::io;
use std::os::raw::{c_int, c_void};
use std::ptr::{self, NonNull};
use std::time::Duration;

use tracing::warn;
use v4l::buffer::Type;
use v4l::v4l2;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::Memory;

/// Buffer returned by `VIDIOC_DQBUF`.
#[derive(Debug, Clone, Copy)]
pub struct Dequeued {
    /// Device-assigned buffer index.
    pub index: u32,
    /// Bytes written by the device.
    pub bytes_used: u32,
    /// Driver frame counter.
    pub sequence: u32,
    /// Capture time.
    pub timestamp: Duration,
}

/// A device buffer mapped into this process. Unmapped on drop.
#[derive(Debug)]
pub struct MappedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedBuffer {
    /// View the mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` came from a successful `mmap` of `len` bytes that
        // stays mapped until `self` is dropped.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        // SAFETY: the region was mapped by `map_buffer` and is unmapped once.
        let ret = unsafe { libc::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) };
        if ret == -1 {
            warn!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}

fn buffer_desc() -> v4l2_buffer {
    v4l2_buffer {
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: all-zero is a valid value for this plain C struct.
        ..unsafe { std::mem::zeroed() }
    }
}

/// `VIDIOC_REQBUFS`: ask for `count` mmap buffers, returning how many the
/// driver granted. A count of zero frees all buffers.
pub fn request_buffers(fd: c_int, count: u32) -> io::Result<u32> {
    let mut req = v4l2_requestbuffers {
        count,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: all-zero is a valid value for this plain C struct.
        ..unsafe { std::mem::zeroed() }
    };
    // SAFETY: `req` is a valid, exclusively borrowed v4l2_requestbuffers.
    unsafe {
        v4l2::ioctl(
            fd,
            v4l2::vidioc::VIDIOC_REQBUFS,
            ptr::addr_of_mut!(req).cast::<c_void>(),
        )?;
    }
    Ok(req.count)
}

/// `VIDIOC_QUERYBUF` followed by `mmap` of the reported length and offset.
pub fn map_buffer(fd: c_int, index: u32) -> io::Result<MappedBuffer> {
    let mut buf = v4l2_buffer {
        index,
        ..buffer_desc()
    };
    // SAFETY: `buf` is a valid, exclusively borrowed v4l2_buffer.
    unsafe {
        v4l2::ioctl(
            fd,
            v4l2::vidioc::VIDIOC_QUERYBUF,
            ptr::addr_of_mut!(buf).cast::<c_void>(),
        )?;
    }

    let len = buf.length as usize;
    // SAFETY: the driver filled `m.offset` for a memory-mapped buffer.
    let offset = unsafe { buf.m.offset };
    let offset = libc::off_t::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "buffer offset overflow"))?;

    // SAFETY: mapping a driver-provided region; the result is checked below.
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            offset,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    NonNull::new(addr.cast::<u8>())
        .map(|ptr| MappedBuffer { ptr, len })
        .ok_or_else(|| io::Error::other("mmap returned null"))
}

/// `VIDIOC_QBUF`.
pub fn queue_buffer(fd: c_int, index: u32) -> io::Result<()> {
    let mut buf = v4l2_buffer {
        index,
        ..buffer_desc()
    };
    // SAFETY: `buf` is a valid, exclusively borrowed v4l2_buffer.
    unsafe {
        v4l2::ioctl(
            fd,
            v4l2::vidioc::VIDIOC_QBUF,
            ptr::addr_of_mut!(buf).cast::<c_void>(),
        )
    }
}

/// `VIDIOC_DQBUF`. Blocks if no buffer is ready, so wait first.
pub fn dequeue_buffer(fd: c_int) -> io::Result<Dequeued> {
    let mut buf = buffer_desc();
    // SAFETY: `buf` is a valid, exclusively borrowed v4l2_buffer.
    unsafe {
        v4l2::ioctl(
            fd,
            v4l2::vidioc::VIDIOC_DQBUF,
            ptr::addr_of_mut!(buf).cast::<c_void>(),
        )?;
    }

    let timestamp: v4l::Timestamp = buf.timestamp.into();
    // V4L2 timestamps are never negative in practice
    let secs = u64::try_from(timestamp.sec).unwrap_or(0);
    let nanos = u32::try_from(timestamp.usec)
        .unwrap_or(0)
        .saturating_mul(1000);

    Ok(Dequeued {
        index: buf.index,
        bytes_used: buf.bytesused,
        sequence: buf.sequence,
        timestamp: Duration::new(secs, nanos),
    })
}

/// `VIDIOC_STREAMON`.
pub fn stream_on(fd: c_int) -> io::Result<()> {
    let mut typ = Type::VideoCapture as u32;
    // SAFETY: `typ` outlives the call.
    unsafe {
        v4l2::ioctl(
            fd,
            v4l2::vidioc::VIDIOC_STREAMON,
            ptr::addr_of_mut!(typ).cast::<c_void>(),
        )
    }
}

/// `VIDIOC_STREAMOFF`.
pub fn stream_off(fd: c_int) -> io::Result<()> {
    let mut typ = Type::VideoCapture as u32;
    // SAFETY: `typ` outlives the call.
    unsafe {
        v4l2::ioctl(
            fd,
            v4l2::vidioc::VIDIOC_STREAMOFF,
            ptr::addr_of_mut!(typ).cast::<c_void>(),
        )
    }
}
