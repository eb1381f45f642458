//! Context ownership, shader programs, and the render thread for Leto.
//!
//! The crate moves one graphics context between two threads. The overall
//! flow is:
//!
//! ```text
//!   leto run
//!      │ Context::create ─▶ DisplayBackend ─▶ window + GpuContext (current on main)
//!      │ ShaderRegistry::create ─▶ ShaderLoader ─▶ Files ─▶ GraphicsBackend
//!      ▼
//!   RenderScheduler::run ──▶ render thread: clear ─▶ draw ─▶ swap
//!      ▲                            │
//!      └──── GpuContext + registry ◀┘ (after shutdown)
//! ```
//!
//! `Context` owns the window and lends its GPU half to the scheduler. The
//! shader registry travels with it, so programs are only ever touched by the
//! thread the context is current on. Platform layers sit behind the traits in
//! [`backend`]; the headless display and naga graphics backend shipped there
//! run the whole shell without a GPU.

pub mod backend;
pub mod context;
pub mod files;
pub mod scheduler;
pub mod shader;

pub use backend::{
    ApiVersion, BackendError, DisplayBackend, GpuContext, GraphicsBackend, HeadlessDisplay,
    HeadlessOptions, HeadlessProbe, HeadlessStats, NagaGraphics, Profile, RenderSurface,
    VideoMode,
};
pub use context::{Context, TITLE_CAPACITY};
pub use files::Files;
pub use scheduler::{
    FrameOptions, RenderScheduler, RenderSummary, RunningScheduler, SchedulerError,
    SchedulerState,
};
pub use shader::{ShaderId, ShaderLoader, ShaderRegistry, ShaderResource};
