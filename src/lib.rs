//! Visor: a live GPU shader overlay for screen and window capture.
//!
//! Frames captured by `visor-capture` are uploaded to the GPU, run through
//! a hot-swappable compute shader and presented in a transparent,
//! click-through overlay window.

pub mod app;
pub mod config;
pub mod error;
pub mod rendering;
pub mod session;

pub use error::{VisorError, VisorResult};

/// Run the overlay until its window closes.
pub fn run() {
    if let Err(e) = app::run() {
        log::error!("[APP] Fatal: {}", e);
        eprintln!("visor: {}", e);
        std::process::exit(1);
    }
}
