//! Owner of the one display window and its graphics context.
//!
//! A [`Context`] is either absent or present. `create` acquires the window
//! and makes its context current on the calling thread; `destroy` gives it
//! back. Misuse (double create, premature destroy, queries while absent) is
//! reported as a warning and leaves the existing state untouched.
//!
//! While a render thread owns the GPU half, [`Context::lend_gpu`] has taken
//! it out and [`Context::restore_gpu`] puts it back.

use std::sync::Arc;

use reporter::{bounded_format, fail, report, Category, Problem, Reporter};
use tracing::{debug, info, warn};

use crate::backend::{
    ApiVersion, DisplayBackend, GpuContext, GraphicsBackend, VideoMode, WindowId,
};

/// Longest window title in bytes, version suffix included.
pub const TITLE_CAPACITY: usize = 128;

struct Window {
    id: WindowId,
    title: String,
    mode: VideoMode,
    gpu: Option<GpuContext>,
}

pub struct Context {
    reporter: Arc<Reporter>,
    display: Box<dyn DisplayBackend>,
    api: ApiVersion,
    window: Option<Window>,
}

impl Context {
    /// An absent context over `display`.
    pub fn new(reporter: Arc<Reporter>, display: impl DisplayBackend + 'static) -> Self {
        Self {
            reporter,
            display: Box::new(display),
            api: ApiVersion::default(),
            window: None,
        }
    }

    pub fn with_api(mut self, api: ApiVersion) -> Self {
        self.api = api;
        self
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn is_present(&self) -> bool {
        self.window.is_some()
    }

    /// Acquires the window titled `"<title> | v<version>"`, sized to the
    /// primary monitor, with its context current on the calling thread.
    pub fn create(&mut self, title: &str) -> &mut Self {
        if self.window.is_some() {
            report!(self.reporter, Problem::DoubleCreation);
            return self;
        }

        if let Err(err) = self.display.init() {
            warn!(%err, "display backend init failed");
            fail!(self.reporter, Problem::BackendInit);
        }
        self.reporter
            .attach_probe(Category::Display, self.display.error_probe());
        self.display.request_api(self.api);

        let title = bounded_format!(
            self.reporter,
            TITLE_CAPACITY,
            "{} | v{}",
            title,
            env!("CARGO_PKG_VERSION")
        );

        let mode = match self.display.primary_video_mode() {
            Ok(mode) => mode,
            Err(err) => {
                warn!(%err, "primary video mode unavailable");
                fail!(self.reporter, Problem::MonitorUnavailable);
            }
        };

        let (id, mut surface) = match self.display.create_window(&title, mode) {
            Ok(window) => window,
            Err(err) => {
                warn!(%err, "window creation failed");
                fail!(self.reporter, Problem::WindowCreation);
            }
        };

        if let Err(err) = surface.make_current() {
            warn!(%err, "could not make the context current");
            fail!(self.reporter, Problem::GraphicsInit);
        }
        let graphics = match surface.load_graphics() {
            Ok(graphics) => graphics,
            Err(err) => {
                warn!(%err, "graphics backend failed to load");
                fail!(self.reporter, Problem::GraphicsInit);
            }
        };
        self.reporter
            .attach_probe(Category::Graphics, graphics.error_probe());

        info!(
            title = %title,
            width = mode.width,
            height = mode.height,
            api = %self.api,
            "context created"
        );
        self.window = Some(Window {
            id,
            title,
            mode,
            gpu: Some(GpuContext::new(surface, graphics)),
        });
        self
    }

    /// Releases the window and terminates the display backend.
    pub fn destroy(&mut self) {
        let Some(mut window) = self.window.take() else {
            report!(self.reporter, Problem::PrematureFree);
            return;
        };
        if let Some(gpu) = window.gpu.as_mut() {
            gpu.surface().release_current();
        }
        drop(window.gpu.take());
        self.display.destroy_window(window.id);
        self.display.terminate();
        self.reporter.detach_probe(Category::Graphics);
        self.reporter.detach_probe(Category::Display);
        debug!(title = %window.title, "context destroyed");
    }

    fn present(&self) -> Option<&Window> {
        let window = self.window.as_ref();
        if window.is_none() {
            report!(self.reporter, Problem::QueriedBeforeCreation);
        }
        window
    }

    /// `true` while the window has not been asked to close.
    pub fn run_state(&self) -> bool {
        self.present()
            .is_some_and(|window| !self.display.should_close(window.id))
    }

    pub fn width(&self) -> u32 {
        self.present().map_or(0, |window| window.mode.width)
    }

    pub fn height(&self) -> u32 {
        self.present().map_or(0, |window| window.mode.height)
    }

    pub fn title(&self) -> &str {
        self.present().map_or("", |window| window.title.as_str())
    }

    pub fn video_mode(&self) -> Option<VideoMode> {
        self.present().map(|window| window.mode)
    }

    pub fn poll_events(&mut self) {
        self.display.poll_events();
    }

    pub fn swap_buffers(&mut self) {
        match self.window.as_mut() {
            None => report!(self.reporter, Problem::SwapBeforeCreation),
            Some(Window { gpu: Some(gpu), .. }) => gpu.surface().swap_buffers(),
            Some(_) => warn!("swap requested while the render thread owns the context"),
        }
    }

    /// The graphics backend, while the context is current on this thread.
    pub fn graphics_mut(&mut self) -> Option<&mut dyn GraphicsBackend> {
        match self.window.as_mut() {
            None => {
                report!(self.reporter, Problem::QueriedBeforeCreation);
                None
            }
            Some(Window { gpu: Some(gpu), .. }) => Some(gpu.graphics()),
            Some(_) => {
                warn!("graphics requested while the render thread owns the context");
                None
            }
        }
    }

    /// Takes the GPU half out, leaving the window in place.
    pub(crate) fn lend_gpu(&mut self) -> Option<GpuContext> {
        self.window.as_mut().and_then(|window| window.gpu.take())
    }

    /// Returns a lent GPU half; it must be current on the calling thread.
    pub(crate) fn restore_gpu(&mut self, gpu: GpuContext) {
        match self.window.as_mut() {
            Some(window) if window.gpu.is_none() => window.gpu = Some(gpu),
            _ => warn!("discarding a GPU context that has no window to return to"),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.window.is_some() {
            debug!("context dropped while present; tearing down");
            self.destroy();
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("api", &self.api)
            .field("present", &self.window.is_some())
            .field("title", &self.window.as_ref().map(|w| w.title.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessDisplay, HeadlessOptions, HeadlessProbe};
    use crate::test_support::test_reporter;
    use reporter::BufferSink;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn context(options: HeadlessOptions) -> (Context, HeadlessProbe, BufferSink) {
        let (reporter, sink) = test_reporter();
        let display = HeadlessDisplay::new(options);
        let probe = display.probe();
        (Context::new(reporter, display), probe, sink)
    }

    #[test]
    fn create_sizes_window_to_monitor_and_versions_title() {
        let (mut ctx, probe, _) = context(HeadlessOptions::default());
        ctx.create("Leto");
        assert!(ctx.is_present());
        assert_eq!(ctx.width(), 1920);
        assert_eq!(ctx.height(), 1080);
        assert_eq!(ctx.title(), format!("Leto | v{}", env!("CARGO_PKG_VERSION")));
        assert!(ctx.run_state());

        let stats = probe.stats();
        assert_eq!(stats.windows_created, 1);
        assert_eq!(stats.requested_api, Some(ApiVersion::default()));
        assert_eq!(stats.current_threads, vec![std::thread::current().id()]);
    }

    #[test]
    fn double_create_keeps_existing_window() {
        let (mut ctx, probe, _) = context(HeadlessOptions::default());
        ctx.create("Leto");
        let title = ctx.title().to_string();
        ctx.create("Other");
        assert_eq!(ctx.title(), title);
        assert_eq!(ctx.width(), 1920);
        assert_eq!(probe.stats().windows_created, 1);
        assert_eq!(ctx.reporter().last_warning(), Some(Problem::DoubleCreation));
    }

    #[test]
    fn queries_before_create_warn_and_return_defaults() {
        let (ctx, _, sink) = context(HeadlessOptions::default());
        assert!(!ctx.run_state());
        assert_eq!(ctx.width(), 0);
        assert_eq!(ctx.height(), 0);
        assert_eq!(ctx.title(), "");
        assert_eq!(
            ctx.reporter().last_warning(),
            Some(Problem::QueriedBeforeCreation)
        );
        assert_eq!(sink.lines().len(), 4);
    }

    #[test]
    fn premature_destroy_and_swap_warn() {
        let (mut ctx, probe, _) = context(HeadlessOptions::default());
        ctx.destroy();
        assert_eq!(ctx.reporter().last_warning(), Some(Problem::PrematureFree));
        ctx.swap_buffers();
        assert_eq!(
            ctx.reporter().last_warning(),
            Some(Problem::SwapBeforeCreation)
        );
        assert_eq!(probe.stats().swaps, 0);
    }

    #[test]
    fn destroy_returns_to_absent() {
        let (mut ctx, probe, _) = context(HeadlessOptions::default());
        ctx.create("Leto");
        ctx.swap_buffers();
        ctx.destroy();
        assert!(!ctx.is_present());
        let stats = probe.stats();
        assert_eq!(stats.swaps, 1);
        assert_eq!(stats.windows_destroyed, 1);
        assert!(stats.terminated);

        ctx.create("Leto");
        assert!(ctx.is_present());
        assert_eq!(probe.stats().windows_created, 2);
    }

    #[test]
    fn long_titles_are_truncated() {
        let (mut ctx, _, _) = context(HeadlessOptions::default());
        let long = "x".repeat(200);
        ctx.create(&long);
        assert_eq!(ctx.title().len(), TITLE_CAPACITY);
        assert_eq!(ctx.reporter().last_warning(), Some(Problem::SmallBuffer));
    }

    #[test]
    fn setup_failures_are_fatal() {
        let cases = [
            (
                HeadlessOptions {
                    fail_init: true,
                    ..HeadlessOptions::default()
                },
                "backend_init",
            ),
            (
                HeadlessOptions {
                    fail_monitor: true,
                    ..HeadlessOptions::default()
                },
                "backend_monitor",
            ),
            (
                HeadlessOptions {
                    fail_window: true,
                    ..HeadlessOptions::default()
                },
                "null_window",
            ),
            (
                HeadlessOptions {
                    fail_graphics: true,
                    ..HeadlessOptions::default()
                },
                "gl_init",
            ),
        ];
        for (options, name) in cases {
            let (mut ctx, _, sink) = context(options);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                ctx.create("Leto");
            }));
            assert!(outcome.is_err(), "{name} should terminate");
            assert!(sink.contents().contains(name), "{name} not reported");
        }
    }

    #[test]
    fn graphics_are_lent_and_restored() {
        let (mut ctx, _, _) = context(HeadlessOptions::default());
        ctx.create("Leto");
        assert!(ctx.graphics_mut().is_some());
        let gpu = ctx.lend_gpu().expect("gpu half");
        assert!(ctx.graphics_mut().is_none());
        ctx.restore_gpu(gpu);
        assert!(ctx.graphics_mut().is_some());
    }
}
