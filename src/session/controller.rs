//! Session controller.
//!
//! Owns the catalog, the capture engine and the render host, and turns
//! user intent (start, stop, selection and shader changes) into capture
//! configurations. All methods run on one control thread; the frame pump
//! reports back through a channel drained by [`SessionController::poll_events`].

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use visor_capture::{CaptureConfiguration, CaptureEngine, CaptureError, FrameGrabber};
use visor_targets::{
    CaptureTarget, Catalog, ContentSource, DisplayId, ShareableContent, TargetId, TargetKind,
    WindowId,
};

use crate::config::{ConfigChange, VisorConfig};
use crate::error::{VisorError, VisorResult};
use crate::session::pump::{FramePump, SessionEvent, SessionEventKind};
use crate::session::{RenderHost, SessionState, Waker};

/// Selection and capture settings, kept so a rejected change can be undone.
#[derive(Clone)]
struct Settings {
    target_type: TargetKind,
    display: Option<CaptureTarget>,
    window: Option<CaptureTarget>,
    pending_display: Option<TargetId>,
    pending_window: Option<TargetId>,
    crop_offset: u32,
    excludes_self: bool,
    frame_rate: u32,
    queue_depth: usize,
}

pub struct SessionController<S, G, H>
where
    S: ContentSource,
    G: FrameGrabber,
    H: RenderHost,
{
    catalog: Catalog<S>,
    engine: CaptureEngine<G>,
    host: H,
    state: SessionState,

    content: ShareableContent,
    target_type: TargetKind,
    display: Option<CaptureTarget>,
    window: Option<CaptureTarget>,
    /// Explicitly requested targets not yet seen in the catalog.
    pending_display: Option<TargetId>,
    pending_window: Option<TargetId>,

    crop_offset: u32,
    excludes_self: bool,
    frame_rate: u32,
    queue_depth: usize,

    refresh_interval: Duration,
    next_refresh: Option<Instant>,

    /// Configuration the running engine was last given.
    applied: Option<CaptureConfiguration>,
    pump: Option<FramePump>,
    generation: u64,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    waker: Option<Waker>,

    content_size: Option<(u32, u32)>,
    last_failure: Option<CaptureError>,
}

impl<S, G, H> SessionController<S, G, H>
where
    S: ContentSource,
    G: FrameGrabber,
    H: RenderHost,
{
    pub fn new(catalog: Catalog<S>, engine: CaptureEngine<G>, host: H, config: &VisorConfig) -> Self {
        let (events_tx, events_rx) = unbounded();

        Self {
            catalog,
            engine,
            host,
            state: SessionState::Idle,
            content: ShareableContent::default(),
            target_type: config.capture_type,
            display: None,
            window: None,
            pending_display: config
                .display_id
                .map(|id| TargetId::Display(DisplayId::new(id))),
            pending_window: config
                .window_id
                .map(|id| TargetId::Window(WindowId::new(id))),
            crop_offset: config.crop_offset,
            excludes_self: config.exclude_self,
            frame_rate: config.frame_rate,
            queue_depth: config.queue_depth,
            refresh_interval: config.refresh_interval(),
            next_refresh: None,
            applied: None,
            pump: None,
            generation: 0,
            events_tx,
            events_rx,
            waker: None,
            content_size: None,
            last_failure: None,
        }
    }

    /// Called from the frame pump whenever there is something to process.
    pub fn set_waker(&mut self, waker: Waker) {
        self.waker = Some(waker);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn content(&self) -> &ShareableContent {
        &self.content
    }

    /// Pixel size of the most recent frame of the running session.
    pub fn content_size(&self) -> Option<(u32, u32)> {
        self.content_size
    }

    pub fn target_type(&self) -> TargetKind {
        self.target_type
    }

    pub fn excludes_self(&self) -> bool {
        self.excludes_self
    }

    pub fn crop_offset(&self) -> u32 {
        self.crop_offset
    }

    /// The selection for the current target type.
    pub fn selected_target(&self) -> Option<&CaptureTarget> {
        self.selection(self.target_type)
    }

    pub fn selection(&self, kind: TargetKind) -> Option<&CaptureTarget> {
        match kind {
            TargetKind::Display => self.display.as_ref(),
            TargetKind::Window => self.window.as_ref(),
        }
    }

    /// Error that ended the last session, if it failed.
    pub fn last_failure(&self) -> Option<&CaptureError> {
        self.last_failure.as_ref()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Configuration derived from the current selection and settings.
    pub fn capture_configuration(&self) -> CaptureConfiguration {
        CaptureConfiguration {
            target_type: self.target_type,
            target: self.selected_target().cloned(),
            crop_top: self.crop_offset,
            excludes_self: self.excludes_self,
            excluded_applications: if self.excludes_self {
                vec![self.catalog.own_application()]
            } else {
                Vec::new()
            },
            frame_rate: self.frame_rate,
            queue_depth: self.queue_depth,
            ..Default::default()
        }
    }

    /// Start capturing the selected target. No-op while a session is open.
    ///
    /// The first start also begins the periodic catalog refresh.
    pub fn start(&mut self) -> VisorResult<()> {
        if self.state.is_active() {
            return Ok(());
        }

        if self.next_refresh.is_none() {
            self.refresh_catalog();
        }

        let config = self.capture_configuration();
        if let Err(e) = config.validate() {
            // A failed enumeration explains a missing target better.
            if let Some(catalog_error) = self.catalog.last_error() {
                return Err(catalog_error.clone().into());
            }
            return Err(e.into());
        }

        self.state = SessionState::Starting;
        self.generation += 1;
        self.content_size = None;
        self.last_failure = None;

        let stream = match self.engine.start(config.clone()) {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e.into());
            },
        };

        match FramePump::spawn(
            self.generation,
            stream,
            self.host.frame_slot(),
            self.events_tx.clone(),
            self.waker.clone(),
        ) {
            Ok(pump) => self.pump = Some(pump),
            Err(e) => {
                self.engine.stop();
                self.state = SessionState::Idle;
                return Err(e);
            },
        }

        if let Some(target) = config.target.as_ref() {
            log::info!("[SESSION] Capturing {}", target.display_name());
        }
        self.applied = Some(config);

        Ok(())
    }

    /// Stop capturing and release frame resources. No-op while idle.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        log::info!("[SESSION] Stopping");
        self.teardown();
    }

    pub fn set_target(&mut self, target: CaptureTarget) -> VisorResult<()> {
        log::debug!("[SESSION] Selected {}", target.display_name());
        self.change_settings(|s| match target.kind() {
            TargetKind::Display => {
                s.pending_display = None;
                s.display = Some(target);
            },
            TargetKind::Window => {
                s.pending_window = None;
                s.window = Some(target);
            },
        })
    }

    /// Select a target by platform id. An id missing from the catalog is
    /// remembered and selected once it appears.
    pub fn select_target_id(&mut self, id: TargetId) -> VisorResult<()> {
        if let Some(target) = self.content.find(&id) {
            return self.set_target(target);
        }

        log::info!("[SESSION] {:?} not in catalog yet, selecting when it appears", id);
        match id {
            TargetId::Display(_) => self.pending_display = Some(id),
            TargetId::Window(_) => self.pending_window = Some(id),
        }
        Ok(())
    }

    /// Drop the selection for `kind` and fall back to the first catalog entry.
    pub fn clear_selection(&mut self, kind: TargetKind) -> VisorResult<()> {
        self.change_settings(|s| {
            match kind {
                TargetKind::Display => {
                    s.pending_display = None;
                    s.display = None;
                },
                TargetKind::Window => {
                    s.pending_window = None;
                    s.window = None;
                },
            }
            s.reconcile_selection();
        })
    }

    pub fn set_target_type(&mut self, kind: TargetKind) -> VisorResult<()> {
        self.change_settings(|s| s.target_type = kind)
    }

    pub fn set_crop_offset(&mut self, crop_offset: u32) -> VisorResult<()> {
        self.change_settings(|s| s.crop_offset = crop_offset)
    }

    pub fn set_exclusion(&mut self, excludes_self: bool) -> VisorResult<()> {
        self.change_settings(|s| s.excludes_self = excludes_self)
    }

    /// Change the frame rate now and the queue depth from the next start.
    pub fn set_pacing(&mut self, frame_rate: u32, queue_depth: usize) -> VisorResult<()> {
        self.change_settings(|s| {
            s.frame_rate = frame_rate.clamp(1, 120);
            s.queue_depth = queue_depth.clamp(1, 8);
        })
    }

    /// Apply changes from a reloaded config file, then start again if the
    /// session is idle. Rejected changes are logged and skipped; the
    /// returned error is the start's.
    ///
    /// Shader paths are left to the caller, which owns file access.
    pub fn reconfigure(&mut self, changes: &[ConfigChange]) -> VisorResult<()> {
        for change in changes {
            if let Err(e) = self.apply_config_change(change) {
                log::warn!("[SESSION] Config change {:?} not applied: {}", change, e);
            }
        }

        if self.state.is_active() {
            return Ok(());
        }
        log::info!("[SESSION] Config changed while idle, starting");
        self.start()
    }

    fn apply_config_change(&mut self, change: &ConfigChange) -> VisorResult<()> {
        match change {
            ConfigChange::CaptureType(kind) => self.set_target_type(*kind),
            ConfigChange::DisplayId(Some(id)) => {
                self.select_target_id(TargetId::Display(DisplayId::new(*id)))
            },
            ConfigChange::DisplayId(None) => self.clear_selection(TargetKind::Display),
            ConfigChange::WindowId(Some(id)) => {
                self.select_target_id(TargetId::Window(WindowId::new(*id)))
            },
            ConfigChange::WindowId(None) => self.clear_selection(TargetKind::Window),
            ConfigChange::CropOffset(crop) => self.set_crop_offset(*crop),
            ConfigChange::ExcludeSelf(exclude) => self.set_exclusion(*exclude),
            ConfigChange::Pacing {
                frame_rate,
                queue_depth,
            } => self.set_pacing(*frame_rate, *queue_depth),
            ConfigChange::RefreshInterval(interval) => {
                self.set_refresh_interval(*interval);
                Ok(())
            },
            ConfigChange::ShaderPath(_) => Ok(()),
        }
    }

    pub fn set_refresh_interval(&mut self, interval: Duration) {
        self.refresh_interval = interval;
        if self.next_refresh.is_some() {
            self.next_refresh = Some(Instant::now() + interval);
        }
    }

    /// Compile a new shader program. Capture is never interrupted; on
    /// error the active program is kept.
    pub fn set_shader_source(&mut self, label: &str, source: &str) -> VisorResult<()> {
        self.host.compile(label, source)
    }

    /// Re-enumerate targets now and reschedule the next refresh.
    pub fn refresh_catalog(&mut self) {
        self.refresh_at(Instant::now());
    }

    /// Run the refresh schedule.
    pub fn tick(&mut self, now: Instant) {
        if self.next_refresh.is_some_and(|due| now >= due) {
            self.refresh_at(now);
        }
    }

    /// When [`tick`](Self::tick) next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_refresh
    }

    /// Apply events reported by the frame pump. Returns the events that
    /// belonged to the current session.
    pub fn poll_events(&mut self) -> Vec<SessionEventKind> {
        let mut handled = Vec::new();

        while let Ok(event) = self.events_rx.try_recv() {
            if event.generation != self.generation || !self.state.is_active() {
                continue;
            }

            match &event.kind {
                SessionEventKind::FirstFrame { width, height } => {
                    if self.state == SessionState::Starting {
                        self.state = SessionState::Running;
                        log::info!("[SESSION] Running at {}x{}", width, height);
                    }
                    self.content_size = Some((*width, *height));
                },
                SessionEventKind::ContentSizeChanged { width, height } => {
                    log::debug!("[SESSION] Content size now {}x{}", width, height);
                    self.content_size = Some((*width, *height));
                },
                SessionEventKind::StreamFailed(e) => {
                    log::error!("[SESSION] Capture failed: {}", e);
                    self.last_failure = Some(e.clone());
                    self.teardown();
                },
                SessionEventKind::StreamEnded => {
                    log::warn!("[SESSION] Capture stream ended");
                    self.teardown();
                },
            }

            handled.push(event.kind);
        }

        handled
    }

    fn refresh_at(&mut self, now: Instant) {
        self.content = self.catalog.refresh();
        self.reconcile_selection();
        self.next_refresh = Some(now + self.refresh_interval);

        if let Err(e) = self.apply_if_active() {
            log::warn!("[SESSION] Update after catalog refresh failed: {}", e);
        }
    }

    /// Resolve pending ids, refresh stale snapshots and fill empty
    /// selections with the first catalog entry.
    fn reconcile_selection(&mut self) {
        if let Some(target) = self.pending_display.as_ref().and_then(|id| self.content.find(id)) {
            self.display = Some(target);
            self.pending_display = None;
        }
        if let Some(target) = self.pending_window.as_ref().and_then(|id| self.content.find(id)) {
            self.window = Some(target);
            self.pending_window = None;
        }

        for selection in [&mut self.display, &mut self.window] {
            if let Some(current) = selection.as_mut() {
                // A vanished target stays selected.
                if let Some(fresh) = self.content.find(&current.id()) {
                    if fresh != *current {
                        *current = fresh;
                    }
                }
            }
        }

        if self.display.is_none() {
            self.display = self
                .content
                .displays
                .first()
                .cloned()
                .map(CaptureTarget::Display);
        }
        if self.window.is_none() {
            self.window = self
                .content
                .windows
                .first()
                .cloned()
                .map(CaptureTarget::Window);
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            target_type: self.target_type,
            display: self.display.clone(),
            window: self.window.clone(),
            pending_display: self.pending_display.clone(),
            pending_window: self.pending_window.clone(),
            crop_offset: self.crop_offset,
            excludes_self: self.excludes_self,
            frame_rate: self.frame_rate,
            queue_depth: self.queue_depth,
        }
    }

    fn restore(&mut self, settings: Settings) {
        self.target_type = settings.target_type;
        self.display = settings.display;
        self.window = settings.window;
        self.pending_display = settings.pending_display;
        self.pending_window = settings.pending_window;
        self.crop_offset = settings.crop_offset;
        self.excludes_self = settings.excludes_self;
        self.frame_rate = settings.frame_rate;
        self.queue_depth = settings.queue_depth;
    }

    /// Apply `change` and push it to a running engine. If the engine
    /// rejects the result, the previous settings come back.
    fn change_settings(&mut self, change: impl FnOnce(&mut Self)) -> VisorResult<()> {
        let previous = self.settings();
        change(self);

        if let Err(e) = self.apply_if_active() {
            log::warn!("[SESSION] Change rejected, keeping previous settings: {}", e);
            self.restore(previous);
            return Err(e);
        }
        Ok(())
    }

    fn apply_if_active(&mut self) -> VisorResult<()> {
        if !self.state.is_active() {
            return Ok(());
        }

        let config = self.capture_configuration();
        if self.applied.as_ref() == Some(&config) {
            return Ok(());
        }

        self.engine.update(config.clone())?;
        self.applied = Some(config);
        Ok(())
    }

    fn teardown(&mut self) {
        self.state = SessionState::Stopping;

        self.engine.stop();
        if let Some(pump) = self.pump.take() {
            pump.join();
        }

        self.host.frame_slot().clear();
        self.host.release_frame_resources();

        self.applied = None;
        self.content_size = None;
        self.state = SessionState::Idle;
        log::info!("[SESSION] Idle");
    }
}

impl<S, G, H> Drop for SessionController<S, G, H>
where
    S: ContentSource,
    G: FrameGrabber,
    H: RenderHost,
{
    fn drop(&mut self) {
        self.stop();
    }
}
