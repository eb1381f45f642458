//! Graphics backend that compiles GLSL through naga's front end.
//!
//! Programs never reach a GPU. Stages are parsed and validated as real GLSL
//! 450, programs are bookkept by id, and draw calls only bump counters, which
//! makes the backend useful both headless and in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use reporter::{ErrorProbe, Fault};
use tracing::{debug, trace};
use wgpu::naga;
use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

use super::{GraphicsBackend, ProgramId, ShaderStage, StageId};

pub const INVALID_VALUE: i32 = 0x0501;
pub const INVALID_OPERATION: i32 = 0x0502;

/// Counters shared with whoever created the backend.
#[derive(Debug, Default)]
pub struct GraphicsCounters {
    clears: AtomicU64,
    draws: AtomicU64,
    programs_linked: AtomicU64,
    programs_deleted: AtomicU64,
    binds: AtomicU64,
}

impl GraphicsCounters {
    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    pub fn programs_linked(&self) -> u64 {
        self.programs_linked.load(Ordering::Relaxed)
    }

    pub fn programs_deleted(&self) -> u64 {
        self.programs_deleted.load(Ordering::Relaxed)
    }

    /// Programs linked and not yet deleted.
    pub fn programs_live(&self) -> u64 {
        self.programs_linked() - self.programs_deleted()
    }

    pub fn binds(&self) -> u64 {
        self.binds.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct LastError(Mutex<Option<Fault>>);

impl ErrorProbe for LastError {
    fn last_error(&self) -> Option<Fault> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub struct NagaGraphics {
    frontend: glsl::Frontend,
    stages: HashMap<u32, ShaderStage>,
    programs: HashMap<u32, (StageId, StageId)>,
    next_id: u32,
    bound: Option<ProgramId>,
    pending_error: Option<Fault>,
    last_error: Arc<LastError>,
    counters: Arc<GraphicsCounters>,
    clear_color: [f32; 4],
}

impl NagaGraphics {
    pub fn new(counters: Arc<GraphicsCounters>) -> Self {
        Self {
            frontend: glsl::Frontend::default(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            bound: None,
            pending_error: None,
            last_error: Arc::new(LastError::default()),
            counters,
            clear_color: [0.0; 4],
        }
    }

    pub fn bound_program(&self) -> Option<ProgramId> {
        self.bound
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn raise(&mut self, code: i32, description: &str) {
        trace!(code, description, "graphics error raised");
        let fault = Fault::new(code, description);
        *self
            .last_error
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(fault.clone());
        // The first unread error wins, matching glGetError.
        self.pending_error.get_or_insert(fault);
    }
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

impl GraphicsBackend for NagaGraphics {
    fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, String> {
        let target = naga_stage(stage);
        let options = glsl::Options::from(target);
        let module = self
            .frontend
            .parse(&options, source)
            .map_err(|errors| errors.emit_to_string(source))?;

        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|error| error.emit_to_string(source))?;

        if !module.entry_points.iter().any(|entry| entry.stage == target) {
            return Err(format!("source has no {stage} entry point"));
        }

        let id = self.allocate_id();
        self.stages.insert(id, stage);
        debug!(id, %stage, "compiled shader stage");
        Ok(StageId(id))
    }

    fn delete_stage(&mut self, stage: StageId) {
        if self.stages.remove(&stage.0).is_none() {
            self.raise(INVALID_VALUE, "unknown shader stage");
        }
    }

    fn link(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String> {
        match (self.stages.get(&vertex.0), self.stages.get(&fragment.0)) {
            (Some(ShaderStage::Vertex), Some(ShaderStage::Fragment)) => {}
            (Some(_), Some(_)) => {
                return Err("program needs one vertex and one fragment stage".to_string())
            }
            _ => return Err("attached stage was never compiled".to_string()),
        }
        let id = self.allocate_id();
        self.programs.insert(id, (vertex, fragment));
        self.counters.programs_linked.fetch_add(1, Ordering::Relaxed);
        debug!(id, "linked shader program");
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_none() {
            self.raise(INVALID_VALUE, "unknown program");
            return;
        }
        if self.bound == Some(program) {
            self.bound = None;
        }
        self.counters
            .programs_deleted
            .fetch_add(1, Ordering::Relaxed);
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program.0) {
            self.raise(INVALID_VALUE, "unknown program");
            return;
        }
        self.bound = Some(program);
        self.counters.binds.fetch_add(1, Ordering::Relaxed);
    }

    fn take_error(&mut self) -> Option<Fault> {
        self.pending_error.take()
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.clear_color = color;
        self.counters.clears.fetch_add(1, Ordering::Relaxed);
    }

    fn draw_fullscreen(&mut self) {
        if self.bound.is_none() {
            self.raise(INVALID_OPERATION, "draw without a bound program");
            return;
        }
        self.counters.draws.fetch_add(1, Ordering::Relaxed);
    }

    fn error_probe(&self) -> Arc<dyn ErrorProbe> {
        self.last_error.clone()
    }
}
