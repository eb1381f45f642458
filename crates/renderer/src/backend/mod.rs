//! Seams to the platform layers the shell drives but does not implement.
//!
//! - [`DisplayBackend`] owns windows, monitors, and the event pump. It stays on
//!   the main thread.
//! - [`RenderSurface`] is the window's graphics context. It is `Send` so it
//!   can be moved to the render thread, but it may be current on at most one
//!   thread at a time.
//! - [`GraphicsBackend`] compiles, links, and binds shader programs and issues
//!   clear/draw calls against whichever surface is current.
//!
//! `headless` and `naga` provide an offscreen implementation of all three.

mod headless;
mod naga;

use std::fmt;
use std::sync::Arc;

use reporter::{ErrorProbe, Fault};
use thiserror::Error;

pub use headless::{HeadlessDisplay, HeadlessOptions, HeadlessProbe, HeadlessStats};
pub use naga::{GraphicsCounters, NagaGraphics};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("display backend failed to initialise: {0}")]
    Init(String),
    #[error("no primary monitor video mode available")]
    NoMonitor,
    #[error("window creation failed: {0}")]
    Window(String),
    #[error("graphics context is current on another thread")]
    ContextBusy,
    #[error("graphics functions could not be loaded: {0}")]
    Graphics(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Core,
    Compatibility,
}

/// Graphics API version requested before the window is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
    pub profile: Profile,
}

impl Default for ApiVersion {
    /// OpenGL 4.6 core profile.
    fn default() -> Self {
        Self {
            major: 4,
            minor: 6,
            profile: Profile::Core,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profile = match self.profile {
            Profile::Core => "core",
            Profile::Compatibility => "compat",
        };
        write!(f, "{}.{} {profile}", self.major, self.minor)
    }
}

/// Primary monitor mode; the window is sized to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

pub trait DisplayBackend: Send {
    fn init(&mut self) -> Result<(), BackendError>;

    /// Hint applied to every window created afterwards.
    fn request_api(&mut self, api: ApiVersion);

    fn primary_video_mode(&mut self) -> Result<VideoMode, BackendError>;

    fn create_window(
        &mut self,
        title: &str,
        mode: VideoMode,
    ) -> Result<(WindowId, Box<dyn RenderSurface>), BackendError>;

    fn destroy_window(&mut self, window: WindowId);

    fn should_close(&self, window: WindowId) -> bool;

    /// Processes pending platform events without blocking for long.
    fn poll_events(&mut self);

    fn terminate(&mut self);

    fn error_probe(&self) -> Arc<dyn ErrorProbe>;
}

pub trait RenderSurface: Send {
    /// Makes the context current on the calling thread.
    fn make_current(&mut self) -> Result<(), BackendError>;

    /// Detaches the context from the calling thread.
    fn release_current(&mut self);

    fn swap_buffers(&mut self);

    /// Resolves graphics entry points; the context must be current.
    fn load_graphics(&mut self) -> Result<Box<dyn GraphicsBackend>, BackendError>;
}

pub trait GraphicsBackend: Send {
    /// Compiles one stage; `Err` carries the compiler log.
    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, String>;

    fn delete_stage(&mut self, stage: StageId);

    /// Links two compiled stages; `Err` carries the linker log.
    fn link(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: ProgramId);

    /// Returns and clears the pending error flag.
    fn take_error(&mut self) -> Option<Fault>;

    fn clear(&mut self, color: [f32; 4]);

    /// Draws one full-screen triangle with the bound program.
    fn draw_fullscreen(&mut self);

    fn error_probe(&self) -> Arc<dyn ErrorProbe>;
}

/// The half of a window that follows the render thread: its context plus the
/// graphics entry points loaded for it.
pub struct GpuContext {
    surface: Box<dyn RenderSurface>,
    graphics: Box<dyn GraphicsBackend>,
}

impl GpuContext {
    pub fn new(surface: Box<dyn RenderSurface>, graphics: Box<dyn GraphicsBackend>) -> Self {
        Self { surface, graphics }
    }

    pub fn surface(&mut self) -> &mut dyn RenderSurface {
        self.surface.as_mut()
    }

    pub fn graphics(&mut self) -> &mut dyn GraphicsBackend {
        self.graphics.as_mut()
    }

    /// Borrows both halves at once.
    pub fn split(&mut self) -> (&mut dyn RenderSurface, &mut dyn GraphicsBackend) {
        (self.surface.as_mut(), self.graphics.as_mut())
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext").finish_non_exhaustive()
    }
}
