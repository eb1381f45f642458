//! Frame pacing between the main thread and the render thread.
//!
//! ```text
//!   main thread                         render thread ("leto-render")
//!   ───────────                         ─────────────────────────────
//!   start: lend GPU, release ──spawn──▶ make current, ack ──┐
//!          wait for ack ◀───────────────────────────────────┘
//!   pump:  frame_requested = true ─────▶ wait ▶ clear flag ▶ clear/draw/swap
//!          poll events                   ...
//!   stop:  shutdown = true ────────────▶ drain pending frame, release
//!          join, make current, restore ◀── (GpuContext, ShaderRegistry)
//! ```
//!
//! The flag pair lives under one mutex with one condition variable for the
//! whole run. Only the render thread clears `frame_requested`, and a frame
//! requested before shutdown is still rendered.
//!
//! [`SchedulerState`] lives under the same mutex. The render thread moves it
//! to `Running` before acknowledging and to `Stopped` after releasing the
//! context; `stop` moves it to `Draining` when a frame is still pending.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context as _, Result};
use crossbeam_channel::{bounded, Sender};
use reporter::{fail, Fault, Problem};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, GpuContext};
use crate::context::Context;
use crate::shader::ShaderRegistry;

pub const RENDER_THREAD_NAME: &str = "leto-render";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("context is not present")]
    NoContext,
    #[error("graphics context is already owned by a render thread")]
    ContextLent,
    #[error("render thread could not take the context")]
    Handoff(#[source] BackendError),
    #[error("render thread panicked")]
    RenderThreadPanicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOptions {
    pub clear_color: [f32; 4],
    /// Shader bound once the render thread starts; `None` binds the head.
    pub active_shader: Option<String>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            active_shader: None,
        }
    }
}

#[derive(Debug, Default)]
struct FrameFlags {
    frame_requested: bool,
    shutdown: bool,
    state: SchedulerState,
}

#[derive(Debug, Default)]
struct FrameSignal {
    flags: Mutex<FrameFlags>,
    wake: Condvar,
}

enum Work {
    Frame,
    Shutdown,
}

impl FrameSignal {
    fn flags(&self) -> MutexGuard<'_, FrameFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SchedulerState {
        self.flags().state
    }

    fn set_state(&self, state: SchedulerState) {
        self.flags().state = state;
    }

    fn request_frame(&self) {
        self.flags().frame_requested = true;
        self.wake.notify_one();
    }

    /// Returns whether a requested frame is still pending.
    fn request_shutdown(&self) -> bool {
        let pending = Self::request_shutdown_locked(&mut self.flags());
        self.wake.notify_one();
        pending
    }

    fn request_shutdown_locked(flags: &mut FrameFlags) -> bool {
        flags.shutdown = true;
        if flags.frame_requested && flags.state == SchedulerState::Running {
            flags.state = SchedulerState::Draining;
        }
        flags.frame_requested
    }

    fn wait_for_work(&self) -> Work {
        let mut flags = self.flags();
        loop {
            if flags.frame_requested {
                flags.frame_requested = false;
                return Work::Frame;
            }
            if flags.shutdown {
                return Work::Shutdown;
            }
            flags = self
                .wake
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct RenderJob {
    gpu: GpuContext,
    registry: ShaderRegistry,
    frames: u64,
    graphics_errors: u64,
}

/// What a finished run hands back to the caller.
#[derive(Debug)]
pub struct RenderSummary {
    pub registry: ShaderRegistry,
    pub frames_requested: u64,
    pub frames_rendered: u64,
    /// Frames that left a graphics error behind.
    pub graphics_errors: u64,
    /// A frame was still pending when shutdown was signalled.
    pub drained: bool,
    pub state: SchedulerState,
}

#[derive(Debug, Clone, Default)]
pub struct RenderScheduler {
    options: FrameOptions,
}

impl RenderScheduler {
    pub fn new(options: FrameOptions) -> Self {
        Self { options }
    }

    /// Moves the context and `registry` to a new render thread.
    ///
    /// Returns once the render thread has made the context current.
    pub fn start<'a>(
        &self,
        context: &'a mut Context,
        registry: ShaderRegistry,
    ) -> Result<RunningScheduler<'a>> {
        if !context.is_present() {
            return Err(SchedulerError::NoContext.into());
        }
        let mut gpu = context.lend_gpu().ok_or(SchedulerError::ContextLent)?;
        gpu.surface().release_current();

        let signal = Arc::new(FrameSignal::default());
        let (ready_tx, ready_rx) = bounded(1);
        let job = RenderJob {
            gpu,
            registry,
            frames: 0,
            graphics_errors: 0,
        };
        let options = self.options.clone();
        let thread_signal = signal.clone();
        let handle = thread::Builder::new()
            .name(RENDER_THREAD_NAME.into())
            .spawn(move || render_thread(job, options, thread_signal, ready_tx))
            .context("failed to spawn render thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let job = handle
                    .join()
                    .map_err(|_| SchedulerError::RenderThreadPanicked)?;
                let mut registry = job.registry;
                reclaim(context, job.gpu);
                if let Some(gfx) = context.graphics_mut() {
                    registry.destroy(gfx);
                }
                return Err(SchedulerError::Handoff(err).into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(anyhow!(SchedulerError::RenderThreadPanicked))
                    .context("render thread exited before acknowledging the context");
            }
        }

        info!(thread = RENDER_THREAD_NAME, "render thread started");
        Ok(RunningScheduler {
            context,
            signal,
            handle: Some(handle),
            frames_requested: 0,
        })
    }

    /// `start`, `pump` until the window closes, then `stop`.
    pub fn run(&self, context: &mut Context, registry: ShaderRegistry) -> Result<RenderSummary> {
        let mut running = self.start(context, registry)?;
        running.pump();
        running.stop()
    }
}

/// Makes a returned GPU half current on this thread and gives it back to
/// `context`.
fn reclaim(context: &mut Context, mut gpu: GpuContext) {
    if let Err(err) = gpu.surface().make_current() {
        warn!(%err, "could not reclaim the context from the render thread");
        fail!(context.reporter(), Problem::GraphicsInit);
    }
    context.restore_gpu(gpu);
}

fn render_thread(
    mut job: RenderJob,
    options: FrameOptions,
    signal: Arc<FrameSignal>,
    ready: Sender<Result<(), BackendError>>,
) -> RenderJob {
    if let Err(err) = job.gpu.surface().make_current() {
        let _ = ready.send(Err(err));
        return job;
    }
    signal.set_state(SchedulerState::Running);
    let _ = ready.send(Ok(()));

    job.registry
        .activate(job.gpu.graphics(), options.active_shader.as_deref());

    while let Work::Frame = signal.wait_for_work() {
        if let Some(fault) = render_frame(&mut job.gpu, options.clear_color) {
            if job.graphics_errors == 0 {
                warn!(
                    code = fault.code,
                    description = %fault.description,
                    "frame raised a graphics error; further errors are logged at debug"
                );
            } else {
                debug!(code = fault.code, description = %fault.description, "frame raised a graphics error");
            }
            job.graphics_errors += 1;
        }
        job.frames += 1;
    }

    job.gpu.surface().release_current();
    signal.set_state(SchedulerState::Stopped);
    debug!(frames = job.frames, "render thread exiting");
    job
}

/// Clears, draws and swaps one frame, returning the error it left behind.
fn render_frame(gpu: &mut GpuContext, clear_color: [f32; 4]) -> Option<Fault> {
    let (surface, gfx) = gpu.split();
    gfx.clear(clear_color);
    gfx.draw_fullscreen();
    let fault = gfx.take_error();
    surface.swap_buffers();
    fault
}

/// A scheduler whose render thread owns the context.
///
/// Holding the `&mut Context` keeps the main thread from destroying the
/// window while frames may still run. Dropping it stops the thread and
/// destroys the registry.
pub struct RunningScheduler<'a> {
    context: &'a mut Context,
    signal: Arc<FrameSignal>,
    handle: Option<JoinHandle<RenderJob>>,
    frames_requested: u64,
}

impl RunningScheduler<'_> {
    pub fn state(&self) -> SchedulerState {
        self.signal.state()
    }

    pub fn frames_requested(&self) -> u64 {
        self.frames_requested
    }

    pub fn request_frame(&mut self) {
        self.signal.request_frame();
        self.frames_requested += 1;
    }

    /// Requests a frame per event poll until the window asks to close.
    pub fn pump(&mut self) {
        while self.context.run_state() {
            if self.handle.as_ref().map_or(true, JoinHandle::is_finished) {
                warn!("render thread exited while the window was open");
                break;
            }
            self.request_frame();
            self.context.poll_events();
        }
    }

    /// Stops the render thread and returns the context to the caller's thread.
    pub fn stop(mut self) -> Result<RenderSummary> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<RenderSummary> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("render thread already joined"))?;

        let drained = self.signal.request_shutdown();
        if drained {
            debug!("draining the pending frame before shutdown");
        }
        let job = handle
            .join()
            .map_err(|_| SchedulerError::RenderThreadPanicked)?;

        reclaim(self.context, job.gpu);
        info!(
            frames_requested = self.frames_requested,
            frames_rendered = job.frames,
            graphics_errors = job.graphics_errors,
            "render thread stopped"
        );
        Ok(RenderSummary {
            registry: job.registry,
            frames_requested: self.frames_requested,
            frames_rendered: job.frames,
            graphics_errors: job.graphics_errors,
            drained,
            state: self.signal.state(),
        })
    }
}

impl Drop for RunningScheduler<'_> {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        match self.shutdown() {
            Ok(mut summary) => {
                if let Some(gfx) = self.context.graphics_mut() {
                    summary.registry.destroy(gfx);
                }
            }
            Err(err) => warn!(error = %err, "render thread did not stop cleanly"),
        }
    }
}
