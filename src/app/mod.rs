//! Application lifecycle and platform integration.
//!
//! - `window`: overlay window attributes, placement and capture exclusion
//! - `events`: user events sent into the winit loop
//! - `watch`: config and shader file change detection

pub mod events;
pub mod watch;
pub mod window;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use visor_capture::{CaptureEngine, XcapGrabber};
use visor_targets::{CaptureTarget, Catalog, XcapSource};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId as WinitWindowId};

use crate::config::{ConfigChange, VisorConfig};
use crate::error::{VisorError, VisorResult};
use crate::rendering::{
    GpuContext, OverlayRenderer, RenderSurface, DEFAULT_SHADER, DEFAULT_SHADER_LABEL,
};
use crate::session::{SessionController, SessionEventKind};

pub use events::AppEvent;
use watch::FileWatcher;

/// How often the config and shader files are checked for changes.
const WATCH_INTERVAL: Duration = Duration::from_millis(500);

type OverlaySession = SessionController<XcapSource, XcapGrabber, OverlayRenderer>;

pub struct OverlayApp {
    config: VisorConfig,
    proxy: EventLoopProxy<AppEvent>,
    window: Option<Arc<Window>>,
    session: Option<OverlaySession>,
    /// Target the overlay geometry was last derived from.
    placed_for: Option<(CaptureTarget, u32)>,
    config_watch: Option<FileWatcher>,
    shader_watch: Option<FileWatcher>,
    next_watch_poll: Instant,
}

impl OverlayApp {
    pub fn new(config: VisorConfig, config_path: Option<PathBuf>, proxy: EventLoopProxy<AppEvent>) -> Self {
        let shader_watch = config.shader_path.as_ref().map(FileWatcher::new);
        Self {
            config,
            proxy,
            window: None,
            session: None,
            placed_for: None,
            config_watch: config_path.map(FileWatcher::new),
            shader_watch,
            next_watch_poll: Instant::now() + WATCH_INTERVAL,
        }
    }

    fn build_session(&self, window: Arc<Window>) -> VisorResult<OverlaySession> {
        let size = window.inner_size();
        let (gpu, surface) = GpuContext::for_window(Arc::clone(&window))?;
        let surface = RenderSurface::new(&gpu, surface, size.width, size.height)?;
        let renderer = OverlayRenderer::new(gpu, Some(surface));

        let mut session = SessionController::new(
            Catalog::new(XcapSource),
            CaptureEngine::new(),
            renderer,
            &self.config,
        );

        // EventLoopProxy is only guaranteed Send.
        let proxy = Mutex::new(self.proxy.clone());
        session.set_waker(Arc::new(move || {
            let _ = proxy.lock().send_event(AppEvent::SessionWake);
        }));

        Ok(session)
    }

    /// Compile the configured shader, falling back to the bundled one when
    /// nothing is active yet.
    fn load_shader(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(path) = self.config.shader_path.as_ref() {
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let result = std::fs::read_to_string(path)
                .map_err(VisorError::from)
                .and_then(|source| session.set_shader_source(&label, &source));

            match result {
                Ok(()) => {
                    log::info!("[APP] Shader {} active", label);
                    return;
                },
                Err(e) => log::error!("[APP] Shader {} rejected: {}", label, e),
            }
        }

        if session.host().active_shader().is_some() {
            return;
        }
        if let Err(e) = session.set_shader_source(DEFAULT_SHADER_LABEL, DEFAULT_SHADER) {
            log::error!("[APP] Bundled shader failed to compile: {}", e);
        }
    }

    /// Move the overlay over the selected target when it changed.
    fn place_overlay(&mut self) {
        let (Some(window), Some(session)) = (self.window.as_ref(), self.session.as_ref()) else {
            return;
        };
        let Some(target) = session.selected_target() else {
            return;
        };

        let placement = (target.clone(), session.crop_offset());
        if self.placed_for.as_ref() == Some(&placement) {
            return;
        }

        if let Some(geometry) = window::overlay_geometry(target, session.crop_offset()) {
            window::apply_geometry(window, &geometry);
        }
        self.placed_for = Some(placement);
    }

    fn start_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = session.start();
        self.after_start(result);
    }

    /// Report how a start went and bring the window in line with the
    /// session's settings.
    fn after_start(&mut self, result: VisorResult<()>) {
        match result {
            Ok(()) => {},
            Err(VisorError::Permission) => {
                log::error!("[APP] Screen recording permission is required to capture");
            },
            Err(e) => log::error!("[APP] Failed to start capture: {}", e),
        }

        if let (Some(window), Some(session)) = (self.window.as_ref(), self.session.as_ref()) {
            window::set_capture_exclusion(window, session.excludes_self());
            window.request_redraw();
        }
        self.place_overlay();
    }

    fn poll_watchers(&mut self) {
        let config_changed = self.config_watch.as_mut().is_some_and(|w| w.poll());
        if config_changed {
            self.reload_config();
        }

        let shader_changed = self.shader_watch.as_mut().is_some_and(|w| w.poll());
        if shader_changed {
            log::info!("[APP] Shader file changed, recompiling");
            self.load_shader();
        }
    }

    fn reload_config(&mut self) {
        let Some(path) = self.config_watch.as_ref().map(|w| w.path().to_path_buf()) else {
            return;
        };

        let newer = match VisorConfig::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("[APP] Ignoring invalid config {}: {}", path.display(), e);
                return;
            },
        };

        let changes = self.config.diff(&newer);
        self.config = newer;
        for change in &changes {
            log::info!("[APP] Config change: {:?}", change);
            if let ConfigChange::ShaderPath(path) = change {
                self.shader_watch = path.as_ref().map(FileWatcher::new);
                self.load_shader();
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = session.reconfigure(&changes);
        self.after_start(result);
    }
}

impl ApplicationHandler<AppEvent> for OverlayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(window::overlay_attributes()) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("[APP] Failed to create overlay window: {}", e);
                event_loop.exit();
                return;
            },
        };
        window::make_click_through(&window);

        let session = match self.build_session(Arc::clone(&window)) {
            Ok(session) => session,
            Err(e) => {
                log::error!("[APP] GPU initialisation failed: {}", e);
                event_loop.exit();
                return;
            },
        };

        self.window = Some(window);
        self.session = Some(session);
        self.load_shader();
        self.start_session();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::SessionWake => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };

                for kind in session.poll_events() {
                    match kind {
                        SessionEventKind::FirstFrame { .. } => self.place_overlay(),
                        SessionEventKind::StreamFailed(_) | SessionEventKind::StreamEnded => {
                            log::warn!("[APP] Capture stopped; saving the config restarts it");
                        },
                        SessionEventKind::ContentSizeChanged { .. } => {},
                    }
                }

                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            },
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WinitWindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(session) = self.session.as_mut() {
                    session.stop();
                }
                event_loop.exit();
            },

            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(session) = self.session.as_mut() {
                        session.host_mut().resize(size.width, size.height);
                    }
                }
            },

            WindowEvent::RedrawRequested => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };

                if let Err(e) = session.host_mut().render() {
                    log::warn!("[APP] Render failed: {}", e);
                }

                if session.state().is_active() {
                    if let Some(window) = self.window.as_ref() {
                        window.request_redraw();
                    }
                }
            },

            _ => {},
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();

        if let Some(session) = self.session.as_mut() {
            session.tick(now);
        }
        if now >= self.next_watch_poll {
            self.poll_watchers();
            self.next_watch_poll = now + WATCH_INTERVAL;
        }
        self.place_overlay();

        let wake_at = self
            .session
            .as_ref()
            .and_then(|s| s.next_deadline())
            .map_or(self.next_watch_poll, |due| due.min(self.next_watch_poll));
        event_loop.set_control_flow(ControlFlow::WaitUntil(wake_at));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        log::info!("[APP] Exiting");
    }
}

/// Initialise logging, load the config and run the overlay until it closes.
pub fn run() -> VisorResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = VisorConfig::default_path();
    let config = match config_path.as_deref() {
        Some(path) => VisorConfig::load_from(path).unwrap_or_else(|e| {
            log::warn!("[APP] Config {} unreadable, using defaults: {}", path.display(), e);
            VisorConfig::default()
        }),
        None => VisorConfig::default(),
    };
    log::info!("[APP] Starting with {:?}", config);

    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .map_err(|e| VisorError::Window(e.to_string()))?;
    let mut app = OverlayApp::new(config, config_path, event_loop.create_proxy());

    event_loop
        .run_app(&mut app)
        .map_err(|e| VisorError::Window(e.to_string()))
}
