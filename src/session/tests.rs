//! Unit tests for the session module.
//!
//! Tests are organized by component:
//! - Lifecycle (start, stop, failures, resource release)
//! - Selection and catalog refresh
//! - Live reconfiguration and shader swaps
//! - Refresh schedule
//! - Config reloads

mod support {
    use std::ops::RangeInclusive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;
    use visor_capture::{CaptureEngine, CaptureError, FrameGrabber, RgbaImage};
    use visor_targets::bounds::{LogicalPosition, LogicalSize};
    use visor_targets::{
        Application, ApplicationId, CaptureTarget, Catalog, CatalogError, ContentSource,
        DisplayId, DisplayTarget, ShareableContent, WindowId, WindowTarget,
    };

    use crate::config::VisorConfig;
    use crate::error::{VisorError, VisorResult};
    use crate::rendering::FrameSlot;
    use crate::session::{RenderHost, SessionController};

    pub const OWN_APP: u32 = 4242;

    #[derive(Clone, Default)]
    pub struct FakeSource {
        pub content: Arc<Mutex<Option<Result<ShareableContent, CatalogError>>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub fn with(content: ShareableContent) -> Self {
            let source = Self::default();
            source.set(Ok(content));
            source
        }

        pub fn set(&self, content: Result<ShareableContent, CatalogError>) {
            *self.content.lock() = Some(content);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ContentSource for FakeSource {
        fn shareable_content(&self) -> Result<ShareableContent, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.content
                .lock()
                .clone()
                .unwrap_or_else(|| Ok(ShareableContent::default()))
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeGrabber {
        pub calls: Arc<AtomicUsize>,
        pub fail_on_call: Option<usize>,
        /// Calls on which the target has nothing to show.
        pub absent: Option<RangeInclusive<usize>>,
        /// Platform without a per-window capture opt-out.
        pub no_opt_out: bool,
    }

    impl FrameGrabber for FakeGrabber {
        fn grab(&mut self, target: &CaptureTarget) -> Result<Option<RgbaImage>, CaptureError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(CaptureError::Stream("target vanished".to_string()));
            }
            if self.absent.as_ref().is_some_and(|range| range.contains(&call)) {
                return Ok(None);
            }
            let size = match target {
                CaptureTarget::Display(d) => d.size,
                CaptureTarget::Window(w) => w.size,
            };
            Ok(Some(RgbaImage::new(size.width() as u32, size.height() as u32)))
        }

        fn honors_capture_opt_out(&self) -> bool {
            !self.no_opt_out
        }
    }

    /// In-memory render host counting the resources a GPU host would hold.
    #[derive(Default)]
    pub struct FakeHost {
        pub slot: Arc<FrameSlot>,
        pub active_shader: Option<String>,
        pub live: usize,
    }

    impl FakeHost {
        /// Stand-in for a redraw: consume the newest frame into "textures".
        pub fn render(&mut self) -> Option<(u32, u32)> {
            let frame = self.slot.take_latest()?;
            self.live = 2;
            Some(frame.size())
        }
    }

    impl RenderHost for FakeHost {
        fn compile(&mut self, label: &str, source: &str) -> VisorResult<()> {
            if source.contains("@compute") {
                self.active_shader = Some(label.to_string());
                Ok(())
            } else {
                Err(VisorError::Compile {
                    label: label.to_string(),
                    message: "missing compute entry point".to_string(),
                })
            }
        }

        fn frame_slot(&self) -> Arc<FrameSlot> {
            Arc::clone(&self.slot)
        }

        fn release_frame_resources(&mut self) {
            self.slot.clear();
            self.live = 0;
        }

        fn live_resource_count(&self) -> usize {
            self.live
        }
    }

    pub type TestSession = SessionController<FakeSource, FakeGrabber, FakeHost>;

    pub fn display(id: u64, width: f64, height: f64) -> DisplayTarget {
        DisplayTarget {
            id: DisplayId::new(id),
            name: format!("Display {}", id),
            origin: LogicalPosition::new(0.0, 0.0),
            size: LogicalSize::new(width, height),
            scale_factor: 1.0,
        }
    }

    pub fn window(id: u64, app: &str, pid: u32, width: f64, height: f64) -> WindowTarget {
        WindowTarget {
            id: WindowId::new(id),
            title: Some(format!("Window {}", id)),
            owning_application: Some(Application {
                id: ApplicationId::new(pid),
                name: app.to_string(),
            }),
            size: LogicalSize::new(width, height),
        }
    }

    pub fn content() -> ShareableContent {
        ShareableContent {
            displays: vec![display(1, 100.0, 80.0), display(2, 200.0, 160.0)],
            windows: vec![
                window(10, "Notes", 7, 64.0, 48.0),
                window(11, "Browser", 8, 96.0, 64.0),
                window(12, "Visor", OWN_APP, 32.0, 32.0),
            ],
            applications: vec![],
        }
    }

    pub fn fast_config() -> VisorConfig {
        VisorConfig {
            frame_rate: 120,
            ..Default::default()
        }
    }

    pub fn session_with(
        source: FakeSource,
        grabber: FakeGrabber,
        config: &VisorConfig,
    ) -> TestSession {
        SessionController::new(
            Catalog::with_own_application(source, ApplicationId::new(OWN_APP)),
            CaptureEngine::with_grabber(grabber),
            FakeHost::default(),
            config,
        )
    }

    pub fn session() -> (TestSession, FakeSource) {
        let source = FakeSource::with(content());
        let session = session_with(source.clone(), FakeGrabber::default(), &fast_config());
        (session, source)
    }

    /// Poll session events until `done` holds or two seconds pass.
    pub fn wait_for(session: &mut TestSession, mut done: impl FnMut(&mut TestSession) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            session.poll_events();
            if done(session) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    use super::support::*;
    use crate::error::VisorError;
    use crate::session::{RenderHost, SessionEventKind, SessionState};
    use visor_capture::CaptureError;
    use visor_targets::{CatalogError, ShareableContent};

    #[test]
    fn start_reaches_running_on_first_frame() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Starting);

        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        // 100x80 display minus the 40 point menu bar band.
        assert_eq!(session.content_size(), Some((100, 40)));
        session.stop();
    }

    #[test]
    fn stop_leaves_no_live_resources() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.host_mut().render().is_some()));
        assert_eq!(session.host().live_resource_count(), 2);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.host().live_resource_count(), 0);
        assert!(!session.host().slot.has_pending());
    }

    #[test]
    fn stop_before_first_frame_is_clean() {
        let (mut session, _) = session();
        session.start().unwrap();
        session.stop();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.host().live_resource_count(), 0);
        // Events from the stopped session are ignored.
        assert!(session.poll_events().is_empty());
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let (mut session, _) = session();
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn start_is_a_no_op_while_active() {
        let (mut session, source) = session();
        session.start().unwrap();
        let refreshes = source.calls();

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(source.calls(), refreshes);
        session.stop();
    }

    #[test]
    fn start_without_any_target_rejects_without_grabbing() {
        let source = FakeSource::with(ShareableContent::default());
        let grabber = FakeGrabber::default();
        let calls = grabber.calls.clone();
        let mut session = session_with(source, grabber, &fast_config());

        let result = session.start();
        assert!(matches!(result, Err(VisorError::Configuration(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn start_reports_missing_permission() {
        let source = FakeSource::default();
        source.set(Err(CatalogError::PermissionDenied));
        let mut session = session_with(source, FakeGrabber::default(), &fast_config());

        assert!(matches!(session.start(), Err(VisorError::Permission)));
        assert!(session.content().is_empty());
    }

    #[test]
    fn stream_failure_forces_idle_and_releases() {
        let grabber = FakeGrabber {
            fail_on_call: Some(3),
            ..Default::default()
        };
        let mut session = session_with(FakeSource::with(content()), grabber, &fast_config());
        session.start().unwrap();

        assert!(wait_for(&mut session, |s| s.state() == SessionState::Idle));
        assert!(matches!(
            session.last_failure(),
            Some(CaptureError::Stream(_))
        ));
        assert_eq!(session.host().live_resource_count(), 0);
    }

    #[test]
    fn failure_is_reported_once_as_an_event() {
        let grabber = FakeGrabber {
            fail_on_call: Some(1),
            ..Default::default()
        };
        let mut session = session_with(FakeSource::with(content()), grabber, &fast_config());
        session.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut failures = 0;
        while session.state() != SessionState::Idle && Instant::now() < deadline {
            failures += session
                .poll_events()
                .iter()
                .filter(|e| matches!(e, SessionEventKind::StreamFailed(_)))
                .count();
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(failures, 1);
        assert!(session.poll_events().is_empty());
        assert!(session.last_failure().is_some());
    }

    #[test]
    fn start_reports_enumeration_failure() {
        let source = FakeSource::default();
        source.set(Err(CatalogError::Enumeration("window server busy".to_string())));
        let mut session = session_with(source, FakeGrabber::default(), &fast_config());

        let result = session.start();
        assert!(matches!(result, Err(VisorError::CatalogEnumeration(ref msg)) if msg == "window server busy"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn disappearing_target_keeps_session_running() {
        let grabber = FakeGrabber {
            absent: Some(2..=8),
            ..Default::default()
        };
        let calls = grabber.calls.clone();
        let mut session = session_with(FakeSource::with(content()), grabber, &fast_config());
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        session.host_mut().render();

        assert!(wait_for(&mut session, |s| {
            assert_eq!(s.state(), SessionState::Running);
            calls.load(Ordering::SeqCst) > 10
        }));
        assert!(session.last_failure().is_none());

        // Frames flow again once the target is back.
        assert!(wait_for(&mut session, |s| s.host_mut().render().is_some()));
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[test]
    fn display_exclusion_without_opt_out_is_rejected() {
        let grabber = FakeGrabber {
            no_opt_out: true,
            ..Default::default()
        };
        let calls = grabber.calls.clone();
        let mut session = session_with(FakeSource::with(content()), grabber, &fast_config());
        assert!(session.excludes_self());

        assert!(matches!(session.start(), Err(VisorError::Configuration(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        session.set_exclusion(false).unwrap();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        session.stop();
    }

    #[test]
    fn window_exclusion_without_opt_out_starts() {
        let grabber = FakeGrabber {
            no_opt_out: true,
            ..Default::default()
        };
        let mut session = session_with(FakeSource::with(content()), grabber, &fast_config());
        session.set_target_type(visor_targets::TargetKind::Window).unwrap();

        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        session.stop();
    }

    #[test]
    fn session_restarts_after_stop() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        session.stop();

        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        session.stop();
    }
}

#[cfg(test)]
mod selection_tests {
    use super::support::*;
    use crate::config::VisorConfig;
    use visor_targets::bounds::LogicalSize;
    use visor_targets::{CaptureTarget, DisplayId, TargetId, TargetKind, WindowId};

    fn selected_id(session: &TestSession, kind: TargetKind) -> Option<TargetId> {
        session.selection(kind).map(|t| t.id())
    }

    #[test]
    fn refresh_auto_selects_first_of_each_kind() {
        let (mut session, _) = session();
        session.refresh_catalog();

        assert_eq!(
            selected_id(&session, TargetKind::Display),
            Some(TargetId::Display(DisplayId::new(1)))
        );
        // Windows are sorted by application name and our own are dropped.
        assert_eq!(
            selected_id(&session, TargetKind::Window),
            Some(TargetId::Window(WindowId::new(11)))
        );
        assert_eq!(session.content().windows.len(), 2);
    }

    #[test]
    fn explicit_selection_survives_disappearance() {
        let (mut session, source) = session();
        session.refresh_catalog();
        session
            .set_target(CaptureTarget::Display(display(2, 200.0, 160.0)))
            .unwrap();

        let mut next = content();
        next.displays.retain(|d| d.id.raw() != 2);
        source.set(Ok(next));
        session.refresh_catalog();

        assert_eq!(
            selected_id(&session, TargetKind::Display),
            Some(TargetId::Display(DisplayId::new(2)))
        );
    }

    #[test]
    fn refresh_updates_geometry_of_selected_target() {
        let (mut session, source) = session();
        session.refresh_catalog();

        let mut next = content();
        next.windows[1].size = LogicalSize::new(300.0, 200.0);
        source.set(Ok(next));
        session.refresh_catalog();

        match session.selection(TargetKind::Window) {
            Some(CaptureTarget::Window(w)) => {
                assert_eq!(w.id, WindowId::new(11));
                assert_eq!(w.size, LogicalSize::new(300.0, 200.0));
            },
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn configured_id_is_selected_when_it_appears() {
        let config = VisorConfig {
            display_id: Some(3),
            ..fast_config()
        };
        let source = FakeSource::with(content());
        let mut session = session_with(source.clone(), FakeGrabber::default(), &config);

        session.refresh_catalog();
        assert_eq!(
            selected_id(&session, TargetKind::Display),
            Some(TargetId::Display(DisplayId::new(1)))
        );

        let mut next = content();
        next.displays.push(display(3, 50.0, 50.0));
        source.set(Ok(next));
        session.refresh_catalog();

        assert_eq!(
            selected_id(&session, TargetKind::Display),
            Some(TargetId::Display(DisplayId::new(3)))
        );
    }

    #[test]
    fn clear_selection_falls_back_to_first() {
        let (mut session, _) = session();
        session.refresh_catalog();
        session
            .select_target_id(TargetId::Display(DisplayId::new(2)))
            .unwrap();
        session.clear_selection(TargetKind::Display).unwrap();

        assert_eq!(
            selected_id(&session, TargetKind::Display),
            Some(TargetId::Display(DisplayId::new(1)))
        );
    }

    #[test]
    fn exclusion_lists_own_application() {
        let (mut session, _) = session();
        assert_eq!(
            session.capture_configuration().excluded_applications.len(),
            1
        );
        session.set_exclusion(false).unwrap();
        assert!(session
            .capture_configuration()
            .excluded_applications
            .is_empty());
    }
}

#[cfg(test)]
mod reconfiguration_tests {
    use super::support::*;
    use crate::error::VisorError;
    use crate::session::SessionState;
    use visor_targets::{CaptureTarget, TargetKind};

    #[test]
    fn crop_change_keeps_state_and_changes_frame_height() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        assert_eq!(session.content_size(), Some((100, 40)));

        session.set_crop_offset(20).unwrap();
        assert_eq!(session.state(), SessionState::Running);

        assert!(wait_for(&mut session, |s| s.content_size() == Some((100, 60))));
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[test]
    fn switching_target_type_updates_live_stream() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));

        session.set_target_type(TargetKind::Window).unwrap();
        assert!(wait_for(&mut session, |s| s.content_size() == Some((96, 64))));
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[test]
    fn rejected_crop_keeps_previous_settings() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));

        // Display 1 is 80 points tall.
        let result = session.set_crop_offset(100);
        assert!(matches!(result, Err(VisorError::Configuration(_))));
        assert_eq!(session.crop_offset(), 40);
        assert_eq!(session.state(), SessionState::Running);

        // Unrelated changes still apply.
        session.set_exclusion(false).unwrap();
        session.set_pacing(60, 2).unwrap();
        assert_eq!(session.capture_configuration().crop_top, 40);
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[test]
    fn rejected_target_keeps_previous_selection() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));

        // Too short for the 40 point crop band.
        let short = CaptureTarget::Display(display(3, 300.0, 30.0));
        assert!(session.set_target(short).is_err());
        assert_eq!(
            session.selected_target().map(|t| t.id()),
            Some(visor_targets::TargetId::Display(visor_targets::DisplayId::new(1)))
        );

        session.set_crop_offset(20).unwrap();
        assert!(wait_for(&mut session, |s| s.content_size() == Some((100, 60))));
        session.stop();
    }

    #[test]
    fn mutators_while_idle_only_store() {
        let (mut session, _) = session();
        session.set_crop_offset(10).unwrap();
        session.set_target_type(TargetKind::Window).unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.capture_configuration().crop_top, 10);
        assert_eq!(session.target_type(), TargetKind::Window);
    }

    #[test]
    fn failed_shader_swap_keeps_previous_program_and_capture() {
        let (mut session, _) = session();
        session
            .set_shader_source("p1", "@compute @workgroup_size(16, 16) fn main() {}")
            .unwrap();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));

        let result = session.set_shader_source("p2", "not a shader");
        assert!(matches!(result, Err(VisorError::Compile { .. })));
        assert_eq!(session.host().active_shader.as_deref(), Some("p1"));
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }
}

#[cfg(test)]
mod schedule_tests {
    use std::time::{Duration, Instant};

    use super::support::*;

    #[test]
    fn no_schedule_before_first_start() {
        let (session, _) = session();
        assert!(session.next_deadline().is_none());
    }

    #[test]
    fn first_start_begins_refresh_schedule() {
        let (mut session, source) = session();
        session.start().unwrap();
        let due = session.next_deadline().unwrap();
        let calls = source.calls();

        session.tick(due - Duration::from_millis(1));
        assert_eq!(source.calls(), calls);

        session.tick(due);
        assert_eq!(source.calls(), calls + 1);
        assert!(session.next_deadline().unwrap() >= due + Duration::from_secs(3));

        session.stop();
    }

    #[test]
    fn schedule_outlives_the_session() {
        let (mut session, source) = session();
        session.start().unwrap();
        session.stop();

        let calls = source.calls();
        session.tick(Instant::now() + Duration::from_secs(10));
        assert_eq!(source.calls(), calls + 1);
    }
}

#[cfg(test)]
mod reload_tests {
    use super::support::*;
    use crate::config::ConfigChange;
    use crate::session::SessionState;
    use visor_targets::TargetKind;

    #[test]
    fn reload_restarts_after_failure() {
        let grabber = FakeGrabber {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let mut session = session_with(FakeSource::with(content()), grabber, &fast_config());
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Idle));
        assert!(session.last_failure().is_some());

        session.reconfigure(&[ConfigChange::CropOffset(20)]).unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));
        assert_eq!(session.content_size(), Some((100, 60)));
        assert!(session.last_failure().is_none());
        session.stop();
    }

    #[test]
    fn reload_applies_changes_to_running_session() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));

        session
            .reconfigure(&[
                ConfigChange::CaptureType(TargetKind::Window),
                ConfigChange::WindowId(Some(10)),
            ])
            .unwrap();
        assert!(wait_for(&mut session, |s| s.content_size() == Some((64, 48))));
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[test]
    fn reload_skips_rejected_change_and_keeps_the_rest() {
        let (mut session, _) = session();
        session.start().unwrap();
        assert!(wait_for(&mut session, |s| s.state() == SessionState::Running));

        session
            .reconfigure(&[
                ConfigChange::CropOffset(500),
                ConfigChange::ExcludeSelf(false),
            ])
            .unwrap();
        assert_eq!(session.crop_offset(), 40);
        assert!(!session.excludes_self());
        assert_eq!(session.state(), SessionState::Running);
        session.stop();
    }

    #[test]
    fn reload_with_invalid_selection_stays_idle() {
        let (mut session, _) = session();
        let result = session.reconfigure(&[ConfigChange::CropOffset(500)]);

        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
