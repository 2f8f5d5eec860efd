//! Frame pump: moves frames from the capture stream into the render slot.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use visor_capture::{CaptureError, FrameStream};

use crate::error::{VisorError, VisorResult};
use crate::rendering::FrameSlot;
use crate::session::Waker;

/// Something the pump observed, reported back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    FirstFrame { width: u32, height: u32 },
    ContentSizeChanged { width: u32, height: u32 },
    StreamFailed(CaptureError),
    StreamEnded,
}

/// An event tagged with the session generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: u64,
    pub kind: SessionEventKind,
}

pub(crate) struct FramePump {
    thread: Option<JoinHandle<()>>,
}

impl FramePump {
    pub(crate) fn spawn(
        generation: u64,
        stream: FrameStream,
        slot: Arc<FrameSlot>,
        events: Sender<SessionEvent>,
        waker: Option<Waker>,
    ) -> VisorResult<Self> {
        let thread = std::thread::Builder::new()
            .name("visor-frame-pump".to_string())
            .spawn(move || {
                pump_loop(generation, stream, &slot, &events, waker.as_ref());
            })
            .map_err(|e| VisorError::CaptureStream(format!("Failed to spawn frame pump: {}", e)))?;

        Ok(Self {
            thread: Some(thread),
        })
    }

    /// Wait for the pump to drain its stream. The stream must already be
    /// stopping.
    pub(crate) fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[SESSION] Frame pump panicked");
            }
        }
    }
}

fn pump_loop(
    generation: u64,
    stream: FrameStream,
    slot: &FrameSlot,
    events: &Sender<SessionEvent>,
    waker: Option<&Waker>,
) {
    let send = |kind: SessionEventKind| {
        let _ = events.send(SessionEvent { generation, kind });
        if let Some(wake) = waker {
            wake();
        }
    };

    let mut last_size: Option<(u32, u32)> = None;

    for item in stream {
        match item {
            Ok(frame) => {
                let (width, height) = frame.size();
                match last_size {
                    None => send(SessionEventKind::FirstFrame { width, height }),
                    Some(size) if size != (width, height) => {
                        send(SessionEventKind::ContentSizeChanged { width, height })
                    },
                    Some(_) => {},
                }
                last_size = Some((width, height));

                slot.publish(frame);
                if let Some(wake) = waker {
                    wake();
                }
            },
            Err(e) => {
                send(SessionEventKind::StreamFailed(e));
                return;
            },
        }
    }

    send(SessionEventKind::StreamEnded);
}
