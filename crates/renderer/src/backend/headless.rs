//! Offscreen display backend.
//!
//! `HeadlessDisplay` plays the part of the windowing toolkit: it hands out one
//! surface per window, pretends a monitor exists, and requests close after a
//! configurable number of event polls. Everything it observes is recorded in
//! a shared [`HeadlessProbe`] so callers can check how the context moved
//! between threads.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use reporter::{ErrorProbe, Fault};
use tracing::{debug, info, warn};

use super::naga::{GraphicsCounters, NagaGraphics};
use super::{
    ApiVersion, BackendError, DisplayBackend, GraphicsBackend, RenderSurface, VideoMode, WindowId,
};

const NOT_INITIALIZED: i32 = 0x0001_0001;
const API_UNAVAILABLE: i32 = 0x0001_0006;
const PLATFORM_ERROR: i32 = 0x0001_0008;
const NO_CURRENT_CONTEXT: i32 = 0x0001_0002;

/// Behaviour knobs, including failure injection for each setup stage.
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub video_mode: VideoMode,
    /// Request close after this many event polls.
    pub close_after: Option<u64>,
    /// Sleep per poll, standing in for vsync.
    pub frame_interval: Duration,
    pub fail_init: bool,
    pub fail_monitor: bool,
    pub fail_window: bool,
    pub fail_graphics: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            video_mode: VideoMode {
                width: 1920,
                height: 1080,
                refresh_rate: 60,
            },
            close_after: None,
            frame_interval: Duration::ZERO,
            fail_init: false,
            fail_monitor: false,
            fail_window: false,
            fail_graphics: false,
        }
    }
}

impl HeadlessOptions {
    pub fn close_after(mut self, polls: u64) -> Self {
        self.close_after = Some(polls);
        self
    }
}

/// Snapshot of what the headless backend has seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub initialised: bool,
    pub terminated: bool,
    pub requested_api: Option<ApiVersion>,
    pub windows_created: u64,
    pub windows_destroyed: u64,
    pub last_title: Option<String>,
    pub polls: u64,
    pub swaps: u64,
    /// Threads the context was made current on, in order of first use.
    pub current_threads: Vec<ThreadId>,
    /// Threads that swapped buffers, in order of first use.
    pub swap_threads: Vec<ThreadId>,
    /// Attempts to use the context from a thread it was not current on.
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Shared {
    stats: Mutex<HeadlessStats>,
    close_requested: AtomicBool,
    last_error: Mutex<Option<Fault>>,
    graphics: Arc<GraphicsCounters>,
}

impl Shared {
    fn stats(&self) -> MutexGuard<'_, HeadlessStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, code: i32, description: &str) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Fault::new(code, description));
    }
}

impl ErrorProbe for Shared {
    fn last_error(&self) -> Option<Fault> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cloneable view into a [`HeadlessDisplay`], usable from any thread.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    shared: Arc<Shared>,
}

impl HeadlessProbe {
    pub fn stats(&self) -> HeadlessStats {
        self.shared.stats().clone()
    }

    pub fn graphics(&self) -> Arc<GraphicsCounters> {
        self.shared.graphics.clone()
    }

    /// Makes every window report that it should close.
    pub fn request_close(&self) {
        self.shared.close_requested.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct HeadlessDisplay {
    options: HeadlessOptions,
    shared: Arc<Shared>,
    initialised: bool,
    next_window: u64,
    windows: HashSet<WindowId>,
}

impl HeadlessDisplay {
    pub fn new(options: HeadlessOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Shared::default()),
            initialised: false,
            next_window: 1,
            windows: HashSet::new(),
        }
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            shared: self.shared.clone(),
        }
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new(HeadlessOptions::default())
    }
}

impl DisplayBackend for HeadlessDisplay {
    fn init(&mut self) -> Result<(), BackendError> {
        if self.options.fail_init {
            self.shared
                .record_error(PLATFORM_ERROR, "headless platform disabled");
            return Err(BackendError::Init("headless platform disabled".into()));
        }
        self.initialised = true;
        self.shared.stats().initialised = true;
        debug!("headless display initialised");
        Ok(())
    }

    fn request_api(&mut self, api: ApiVersion) {
        self.shared.stats().requested_api = Some(api);
    }

    fn primary_video_mode(&mut self) -> Result<VideoMode, BackendError> {
        if !self.initialised {
            self.shared
                .record_error(NOT_INITIALIZED, "display backend is not initialised");
            return Err(BackendError::NoMonitor);
        }
        if self.options.fail_monitor {
            self.shared
                .record_error(PLATFORM_ERROR, "no monitor connected");
            return Err(BackendError::NoMonitor);
        }
        Ok(self.options.video_mode)
    }

    fn create_window(
        &mut self,
        title: &str,
        mode: VideoMode,
    ) -> Result<(WindowId, Box<dyn RenderSurface>), BackendError> {
        if !self.initialised {
            self.shared
                .record_error(NOT_INITIALIZED, "display backend is not initialised");
            return Err(BackendError::Window("backend not initialised".into()));
        }
        if self.options.fail_window {
            self.shared
                .record_error(API_UNAVAILABLE, "requested API unavailable");
            return Err(BackendError::Window("requested API unavailable".into()));
        }

        let id = WindowId(self.next_window);
        self.next_window += 1;
        self.windows.insert(id);
        {
            let mut stats = self.shared.stats();
            stats.windows_created += 1;
            stats.last_title = Some(title.to_string());
        }
        info!(
            window = id.0,
            width = mode.width,
            height = mode.height,
            "headless window created"
        );

        let surface = HeadlessSurface {
            shared: self.shared.clone(),
            current: None,
            fail_graphics: self.options.fail_graphics,
        };
        Ok((id, Box::new(surface)))
    }

    fn destroy_window(&mut self, window: WindowId) {
        if self.windows.remove(&window) {
            self.shared.stats().windows_destroyed += 1;
            debug!(window = window.0, "headless window destroyed");
        } else {
            warn!(window = window.0, "destroying unknown headless window");
        }
    }

    fn should_close(&self, window: WindowId) -> bool {
        !self.windows.contains(&window) || self.shared.close_requested.load(Ordering::SeqCst)
    }

    fn poll_events(&mut self) {
        let polls = {
            let mut stats = self.shared.stats();
            stats.polls += 1;
            stats.polls
        };
        if self.options.close_after.is_some_and(|limit| polls >= limit) {
            self.shared.close_requested.store(true, Ordering::SeqCst);
        }
        if !self.options.frame_interval.is_zero() {
            thread::sleep(self.options.frame_interval);
        }
    }

    fn terminate(&mut self) {
        self.initialised = false;
        self.shared.stats().terminated = true;
        debug!("headless display terminated");
    }

    fn error_probe(&self) -> Arc<dyn ErrorProbe> {
        self.shared.clone()
    }
}

/// Context of one headless window. Current on at most one thread at a time.
#[derive(Debug)]
struct HeadlessSurface {
    shared: Arc<Shared>,
    current: Option<ThreadId>,
    fail_graphics: bool,
}

impl HeadlessSurface {
    fn conflict(&self, description: &str) {
        self.shared.stats().conflicts += 1;
        self.shared.record_error(NO_CURRENT_CONTEXT, description);
        warn!(description, "headless context conflict");
    }
}

fn push_unique(threads: &mut Vec<ThreadId>, id: ThreadId) {
    if !threads.contains(&id) {
        threads.push(id);
    }
}

impl RenderSurface for HeadlessSurface {
    fn make_current(&mut self) -> Result<(), BackendError> {
        let me = thread::current().id();
        match self.current {
            Some(owner) if owner != me => {
                self.conflict("context is current on another thread");
                Err(BackendError::ContextBusy)
            }
            _ => {
                self.current = Some(me);
                push_unique(&mut self.shared.stats().current_threads, me);
                Ok(())
            }
        }
    }

    fn release_current(&mut self) {
        if self.current == Some(thread::current().id()) {
            self.current = None;
        }
    }

    fn swap_buffers(&mut self) {
        let me = thread::current().id();
        if self.current != Some(me) {
            self.conflict("swap on a thread without the current context");
            return;
        }
        let mut stats = self.shared.stats();
        stats.swaps += 1;
        push_unique(&mut stats.swap_threads, me);
    }

    fn load_graphics(&mut self) -> Result<Box<dyn GraphicsBackend>, BackendError> {
        if self.current != Some(thread::current().id()) {
            self.conflict("graphics loaded without a current context");
            return Err(BackendError::Graphics("no current context".into()));
        }
        if self.fail_graphics {
            self.shared
                .record_error(API_UNAVAILABLE, "graphics entry points unavailable");
            return Err(BackendError::Graphics(
                "graphics entry points unavailable".into(),
            ));
        }
        Ok(Box::new(NagaGraphics::new(self.shared.graphics.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(display: &mut HeadlessDisplay) -> (WindowId, Box<dyn RenderSurface>) {
        display.init().unwrap();
        let mode = display.primary_video_mode().unwrap();
        display.create_window("test", mode).unwrap()
    }

    #[test]
    fn closes_after_configured_polls() {
        let mut display = HeadlessDisplay::new(HeadlessOptions::default().close_after(3));
        let (id, _surface) = window(&mut display);
        for _ in 0..2 {
            display.poll_events();
            assert!(!display.should_close(id));
        }
        display.poll_events();
        assert!(display.should_close(id));
    }

    #[test]
    fn context_moves_between_threads_only_after_release() {
        let mut display = HeadlessDisplay::default();
        let probe = display.probe();
        let (_id, mut surface) = window(&mut display);
        surface.make_current().unwrap();
        surface.release_current();

        let surface = thread::spawn(move || {
            surface.make_current().unwrap();
            surface.swap_buffers();
            surface.release_current();
            surface
        })
        .join()
        .unwrap();
        drop(surface);

        let stats = probe.stats();
        assert_eq!(stats.current_threads.len(), 2);
        assert_eq!(stats.swaps, 1);
        assert_eq!(stats.conflicts, 0);
        assert_ne!(stats.swap_threads[0], thread::current().id());
    }

    #[test]
    fn using_context_held_elsewhere_is_a_conflict() {
        let mut display = HeadlessDisplay::default();
        let probe = display.probe();
        let (_id, mut surface) = window(&mut display);
        surface.make_current().unwrap();

        let outcome = thread::spawn(move || {
            let busy = surface.make_current();
            surface.swap_buffers();
            busy.is_err()
        })
        .join()
        .unwrap();

        assert!(outcome);
        assert_eq!(probe.stats().conflicts, 2);
        assert_eq!(probe.stats().swaps, 0);
        let fault = display.error_probe().last_error().unwrap();
        assert_eq!(fault.code, NO_CURRENT_CONTEXT);
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let mut display = HeadlessDisplay::new(HeadlessOptions {
            fail_init: true,
            ..HeadlessOptions::default()
        });
        assert!(matches!(display.init(), Err(BackendError::Init(_))));
        assert!(display.error_probe().last_error().is_some());

        let mut display = HeadlessDisplay::new(HeadlessOptions {
            fail_monitor: true,
            ..HeadlessOptions::default()
        });
        display.init().unwrap();
        assert!(matches!(
            display.primary_video_mode(),
            Err(BackendError::NoMonitor)
        ));

        let mut display = HeadlessDisplay::new(HeadlessOptions {
            fail_graphics: true,
            ..HeadlessOptions::default()
        });
        let (_id, mut surface) = window(&mut display);
        surface.make_current().unwrap();
        assert!(surface.load_graphics().is_err());
    }
}
