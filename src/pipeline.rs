//! Paced capture loop wiring a [`CaptureSession`] to a [`FrameSink`].

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::Result;
use crate::session::CaptureSession;
use crate::sink::FrameSink;
use crate::traits::CameraDevice;

/// Default pause between frames.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Capture loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    /// Pause after each shown frame.
    pub interval: Duration,
    /// Reduce frames to gray before showing them.
    pub grayscale: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            interval: FRAME_INTERVAL,
            grayscale: false,
        }
    }
}

/// Capture frames into `sink` until it closes. Returns the number of frames
/// shown.
///
/// Any error ends the loop; the session is left as it was so the caller
/// decides whether to retry or tear down. A capture that fails because the
/// sink was closed meanwhile (an interrupted wait) ends the loop normally.
pub fn run<D, S>(session: &mut CaptureSession<D>, sink: &mut S, options: &LoopOptions) -> Result<u64>
where
    D: CameraDevice,
    S: FrameSink,
{
    let mut shown = 0u64;

    while sink.is_open() {
        sink.poll_events()?;
        if !sink.is_open() {
            break;
        }
        sink.clear()?;

        let mut image = match session.next_frame() {
            Ok(image) => image,
            Err(err) if !sink.is_open() => {
                debug!("capture interrupted by close: {err}");
                break;
            }
            Err(err) => return Err(err),
        };
        if options.grayscale {
            image.to_grayscale()?;
        }

        sink.show(&image)?;
        sink.display()?;
        shown += 1;
        debug!(shown, "frame shown");

        if !options.interval.is_zero() {
            thread::sleep(options.interval);
        }
    }

    info!(frames = shown, "capture loop finished");
    Ok(shown)
}
