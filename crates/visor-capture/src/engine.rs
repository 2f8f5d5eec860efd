//! Capture thread, pacing and frame shaping.
//!
//! Architecture:
//! - `start` validates the configuration, then spawns one capture thread
//! - The thread grabs, crops, scales and swizzles each image to BGRA
//! - A target with nothing to show (disconnected, closed, minimized) skips
//!   frames without ending the stream
//! - Frames go out through a bounded queue with `try_send`; a full queue
//!   drops the newest frame
//! - Control messages (update, stop) share the pacing wait, so stop never
//!   waits out a frame interval

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use parking_lot::Mutex;
use visor_targets::CaptureTarget;

use crate::{CaptureConfiguration, CaptureError, Frame, FrameGrabber, XcapGrabber};

enum EngineCommand {
    Update(CaptureConfiguration),
    Stop,
}

struct RunningCapture {
    control_tx: Sender<EngineCommand>,
    thread: Option<JoinHandle<()>>,
}

/// Starts, reconfigures and stops capture streams.
pub struct CaptureEngine<G: FrameGrabber = XcapGrabber> {
    grabber: G,
    running: Option<RunningCapture>,
}

/// Frames from one started capture.
///
/// Yields frames until the stream is stopped. A stream that fails yields
/// exactly one `Err` after any frames already queued, then ends.
pub struct FrameStream {
    frames: Receiver<Frame>,
    failure: Arc<Mutex<Option<CaptureError>>>,
    finished: bool,
}

impl Iterator for FrameStream {
    type Item = Result<Frame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.frames.recv() {
            Ok(frame) => Some(Ok(frame)),
            Err(_) => {
                self.finished = true;
                self.failure.lock().take().map(Err)
            },
        }
    }
}

impl CaptureEngine<XcapGrabber> {
    pub fn new() -> Self {
        Self::with_grabber(XcapGrabber::new())
    }
}

impl Default for CaptureEngine<XcapGrabber> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: FrameGrabber> CaptureEngine<G> {
    pub fn with_grabber(grabber: G) -> Self {
        Self {
            grabber,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .and_then(|r| r.thread.as_ref())
            .is_some_and(|t| !t.is_finished())
    }

    /// Begin capturing. Any previous stream is stopped first.
    pub fn start(&mut self, config: CaptureConfiguration) -> Result<FrameStream, CaptureError> {
        config.validate()?;
        self.check_exclusion(&config)?;
        self.stop();

        let (frame_tx, frame_rx) = flume::bounded(config.queue_depth);
        let (control_tx, control_rx) = flume::unbounded();
        let failure = Arc::new(Mutex::new(None));

        let grabber = self.grabber.clone();
        let thread_failure = Arc::clone(&failure);

        tracing::info!(
            "[CAPTURE] Starting {:?} capture at {} fps",
            config.target_type,
            config.frame_rate
        );

        let thread = std::thread::Builder::new()
            .name("visor-capture-engine".to_string())
            .spawn(move || {
                if let Err(e) = capture_loop(grabber, config, &frame_tx, control_rx) {
                    tracing::error!("[CAPTURE] {}", e);
                    *thread_failure.lock() = Some(e);
                }
                // Disconnect only once the failure is visible to the stream.
                drop(frame_tx);
            })
            .map_err(|e| CaptureError::Spawn(e.to_string()))?;

        self.running = Some(RunningCapture {
            control_tx,
            thread: Some(thread),
        });

        Ok(FrameStream {
            frames: frame_rx,
            failure,
            finished: false,
        })
    }

    /// Replace the configuration of the running stream at its next frame.
    ///
    /// The queue depth is fixed for the lifetime of a stream.
    pub fn update(&mut self, config: CaptureConfiguration) -> Result<(), CaptureError> {
        config.validate()?;
        self.check_exclusion(&config)?;

        let Some(running) = self.running.as_ref() else {
            tracing::debug!("[CAPTURE] Update ignored, not running");
            return Ok(());
        };

        running
            .control_tx
            .send(EngineCommand::Update(config))
            .map_err(|_| CaptureError::Stream("capture thread has exited".to_string()))
    }

    /// Excluding applications from a display capture needs a grabber that
    /// leaves out windows which opted out of capture.
    fn check_exclusion(&self, config: &CaptureConfiguration) -> Result<(), CaptureError> {
        let excludes = config.excludes_self && !config.excluded_applications.is_empty();
        let on_display = matches!(config.target, Some(CaptureTarget::Display(_)));

        if excludes && on_display && !self.grabber.honors_capture_opt_out() {
            return Err(CaptureError::Configuration(
                "self-exclusion from display capture is not supported on this platform; \
                 disable it to capture displays"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Stop the running stream and wait for its thread. Safe to call
    /// repeatedly or before any start.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        let _ = running.control_tx.send(EngineCommand::Stop);
        if let Some(thread) = running.thread.take() {
            if thread.join().is_err() {
                tracing::error!("[CAPTURE] Capture thread panicked");
            }
        }
        tracing::info!("[CAPTURE] Stopped");
    }
}

impl<G: FrameGrabber> Drop for CaptureEngine<G> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop<G: FrameGrabber>(
    mut grabber: G,
    mut config: CaptureConfiguration,
    frame_tx: &Sender<Frame>,
    control_rx: Receiver<EngineCommand>,
) -> Result<(), CaptureError> {
    let mut sequence = 0u64;
    let mut deadline = Instant::now();

    loop {
        // Pace, while staying responsive to control messages.
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match control_rx.recv_timeout(deadline - now) {
                Ok(EngineCommand::Update(next)) => config = next,
                Ok(EngineCommand::Stop) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        loop {
            match control_rx.try_recv() {
                Ok(EngineCommand::Update(next)) => config = next,
                Ok(EngineCommand::Stop) | Err(TryRecvError::Disconnected) => return Ok(()),
                Err(TryRecvError::Empty) => break,
            }
        }

        deadline = Instant::now() + config.frame_interval();

        let target = config.validate()?.clone();
        let grabbed = grabber.grab(&target).map_err(|e| match e {
            CaptureError::Stream(_) => e,
            other => CaptureError::Stream(other.to_string()),
        })?;
        let Some(image) = grabbed else {
            tracing::trace!("[CAPTURE] {} has no content, skipping", target.display_name());
            continue;
        };

        sequence += 1;
        let frame = shape_frame(image, &target, &config, sequence);

        match frame_tx.try_send(frame) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                tracing::trace!("[CAPTURE] Queue full, dropped frame {}", sequence);
            },
            Err(TrySendError::Disconnected(_)) => return Ok(()),
        }
    }
}

/// Crop, scale and swizzle a raw RGBA image into a BGRA frame.
pub(crate) fn shape_frame(
    image: RgbaImage,
    target: &CaptureTarget,
    config: &CaptureConfiguration,
    sequence: u64,
) -> Frame {
    let image = match target {
        CaptureTarget::Display(display) => {
            // The platform image density may differ from the display scale.
            let logical_height = display.size.height().max(1.0);
            let ratio = f64::from(image.height()) / logical_height;
            let crop_px = (f64::from(config.crop_top) * ratio).round() as u32;
            let crop_px = crop_px.min(image.height().saturating_sub(1));
            imageops::crop_imm(&image, 0, crop_px, image.width(), image.height() - crop_px)
                .to_image()
        },
        CaptureTarget::Window(_) => image,
    };

    // Window frames keep the grabbed size, which may be newer than the
    // catalog snapshot.
    let (width, height) = match target {
        CaptureTarget::Display(_) => config.effective_size().unwrap_or(image.dimensions()),
        CaptureTarget::Window(_) => image.dimensions(),
    };

    let image = if image.dimensions() != (width, height) {
        imageops::resize(&image, width, height, FilterType::Triangle)
    } else {
        image
    };

    let mut data = image.into_raw();
    for pixel in data.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }

    Frame::from_bgra(sequence, width, height, data)
}
