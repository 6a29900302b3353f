//! Frame sinks: where the capture loop sends finished images.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::bitmap::RasterImage;
use crate::error::{Error, Result};

/// Consumer of captured frames, driven by [`crate::pipeline::run`].
///
/// One loop iteration calls `poll_events`, `clear`, `show` and `display` in
/// that order, for as long as `is_open` holds.
pub trait FrameSink {
    /// Whether the sink still wants frames.
    fn is_open(&self) -> bool;

    /// Process pending events, which may close the sink.
    fn poll_events(&mut self) -> Result<()>;

    /// Prepare for the next frame.
    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    /// Present one frame.
    fn show(&mut self, image: &RasterImage) -> Result<()>;

    /// Finish presenting the current frame.
    fn display(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop accepting frames.
    fn close(&mut self);
}

/// Cloneable close signal shared between a sink and whoever may ask it to
/// stop (a signal handler, another thread).
#[derive(Debug, Clone, Default)]
pub struct CloseHandle(Arc<AtomicBool>);

impl CloseHandle {
    /// Create an open handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request close. Safe to call from any thread, any number of times.
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether close was requested.
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Writes every shown frame to `<dir>/frame_NNNNNN.bmp`.
#[derive(Debug)]
pub struct BmpSequenceSink {
    dir: PathBuf,
    limit: Option<u64>,
    written: u64,
    closed: CloseHandle,
}

impl BmpSequenceSink {
    /// Create the output directory if needed. With a `limit` the sink closes
    /// itself after that many frames.
    pub fn create<P: Into<PathBuf>>(dir: P, limit: Option<u64>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|err| Error::io(format!("create {}", dir.display()), err))?;
        info!(dir = %dir.display(), ?limit, "writing frames");

        Ok(Self {
            dir,
            limit,
            written: 0,
            closed: CloseHandle::new(),
        })
    }

    /// Handle that closes this sink when triggered.
    pub fn close_handle(&self) -> CloseHandle {
        self.closed.clone()
    }

    /// Frames written so far.
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the `n`th frame (zero based).
    pub fn frame_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("frame_{n:06}.bmp"))
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.written >= limit)
    }
}

impl FrameSink for BmpSequenceSink {
    fn is_open(&self) -> bool {
        !self.closed.is_closed() && !self.limit_reached()
    }

    fn poll_events(&mut self) -> Result<()> {
        if self.limit_reached() {
            self.close();
        }
        Ok(())
    }

    fn show(&mut self, image: &RasterImage) -> Result<()> {
        let path = self.frame_path(self.written);
        image.save(&path)?;
        debug!(path = %path.display(), "frame written");
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed.is_closed() {
            self.closed.close();
            info!(frames = self.written, "sink closed");
        }
    }
}
