//! Named shader programs and the registry that owns them.
//!
//! Types:
//!
//! - [`ShaderLoader`] turns `<asset root>/Shaders/<name>/{vertex.vs,fragment.fs}`
//!   into a linked program.
//! - [`ShaderResource`] owns one program handle. It is deliberately not
//!   `Clone`; whoever holds it is responsible for unloading it.
//! - [`ShaderRegistry`] keeps resources in insertion order and resolves them
//!   by name, first match wins.
//!
//! Every call that touches a program takes the graphics backend explicitly,
//! so the borrow checker ties GPU work to whoever currently holds the context.

use std::path::Path;
use std::sync::Arc;

use reporter::{fail, report, Problem, Reporter};
use tracing::{debug, info, warn};

use crate::backend::{GraphicsBackend, ProgramId, ShaderStage, StageId};
use crate::files::{Files, FRAGMENT_FILE, VERTEX_FILE};

/// Index of a resource inside its [`ShaderRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(usize);

impl ShaderId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct ShaderResource {
    name: String,
    program: Option<ProgramId>,
}

impl ShaderResource {
    /// A named resource with no program behind it yet.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn is_loaded(&self) -> bool {
        self.program.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ShaderLoader {
    reporter: Arc<Reporter>,
    files: Files,
}

impl ShaderLoader {
    pub fn new(reporter: Arc<Reporter>, asset_root: impl AsRef<Path>) -> Self {
        let files = Files::new(reporter.clone(), asset_root.as_ref());
        Self { reporter, files }
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    /// Compiles and links the shader pair called `name`.
    ///
    /// A missing name is a warning and yields `None`. Unreadable sources,
    /// compile errors, and link errors are fatal.
    pub fn load(
        &self,
        gfx: &mut dyn GraphicsBackend,
        name: Option<&str>,
    ) -> Option<ShaderResource> {
        let Some(name) = name else {
            report!(self.reporter, Problem::NullParam);
            return None;
        };

        let vertex_source = self.read_stage(name, VERTEX_FILE);
        let fragment_source = self.read_stage(name, FRAGMENT_FILE);

        let vertex = self.compile_stage(gfx, ShaderStage::Vertex, &vertex_source);
        let fragment = self.compile_stage(gfx, ShaderStage::Fragment, &fragment_source);

        let program = match gfx.link(vertex, fragment) {
            Ok(program) => program,
            Err(log) => {
                self.reporter.diagnostic(&log);
                fail!(self.reporter, Problem::ShaderCompilation);
            }
        };
        gfx.delete_stage(vertex);
        gfx.delete_stage(fragment);

        info!(shader = name, program = program.0, "shader loaded");
        Some(ShaderResource {
            name: name.to_string(),
            program: Some(program),
        })
    }

    fn read_stage(&self, name: &str, file: &str) -> String {
        let path = self.files.shader_path(name, file);
        match self.files.read_to_string(&path) {
            Some(source) => source,
            None => {
                self.reporter.diagnostic(&path.display().to_string());
                fail!(self.reporter, Problem::ShaderCompilation);
            }
        }
    }

    fn compile_stage(
        &self,
        gfx: &mut dyn GraphicsBackend,
        stage: ShaderStage,
        source: &str,
    ) -> StageId {
        match gfx.compile(stage, source) {
            Ok(id) => id,
            Err(log) => {
                self.reporter.diagnostic(&log);
                fail!(self.reporter, Problem::ShaderCompilation);
            }
        }
    }

    /// Releases the program behind `resource`.
    pub fn unload(&self, gfx: &mut dyn GraphicsBackend, resource: ShaderResource) {
        match resource.program {
            Some(program) => {
                gfx.delete_program(program);
                debug!(shader = %resource.name, "shader unloaded");
            }
            None => report!(self.reporter, Problem::NullObject),
        }
    }

    /// Binds `resource` for subsequent draws.
    pub fn activate(&self, gfx: &mut dyn GraphicsBackend, resource: &ShaderResource) {
        let Some(program) = resource.program else {
            report!(self.reporter, Problem::NullObject);
            return;
        };
        gfx.use_program(program);
        if let Some(fault) = gfx.take_error() {
            warn!(shader = %resource.name, code = fault.code, "program rejected on bind");
            fail!(self.reporter, Problem::MalformedShader);
        }
    }
}

pub struct ShaderRegistry {
    loader: ShaderLoader,
    resources: Vec<ShaderResource>,
}

impl ShaderRegistry {
    pub fn empty(loader: ShaderLoader) -> Self {
        Self {
            loader,
            resources: Vec::new(),
        }
    }

    /// A registry holding the one shader called `initial`.
    pub fn create(loader: ShaderLoader, gfx: &mut dyn GraphicsBackend, initial: &str) -> Self {
        let mut registry = Self::empty(loader);
        registry.append(gfx, Some(initial));
        registry
    }

    pub fn loader(&self) -> &ShaderLoader {
        &self.loader
    }

    /// Loads `name` and appends it as the new tail.
    pub fn append(&mut self, gfx: &mut dyn GraphicsBackend, name: Option<&str>) -> Option<ShaderId> {
        let resource = self.loader.load(gfx, name)?;
        Some(self.push(resource))
    }

    /// Appends an already built resource.
    pub fn push(&mut self, resource: ShaderResource) -> ShaderId {
        self.resources.push(resource);
        ShaderId(self.resources.len() - 1)
    }

    /// First resource called `name`; `None` asks for the head.
    pub fn find(&self, name: Option<&str>) -> Option<&ShaderResource> {
        self.find_id(name).and_then(|id| self.get(id))
    }

    pub fn find_id(&self, name: Option<&str>) -> Option<ShaderId> {
        let found = match name {
            None => self.head(),
            Some(name) => self
                .resources
                .iter()
                .position(|resource| resource.name == name)
                .map(ShaderId),
        };
        if found.is_none() {
            report!(self.loader.reporter, Problem::NoSuchValue);
        }
        found
    }

    /// Finds `name` and binds it. Returns whether a resource was found.
    pub fn activate(&self, gfx: &mut dyn GraphicsBackend, name: Option<&str>) -> bool {
        match self.find(name) {
            Some(resource) => {
                self.loader.activate(gfx, resource);
                true
            }
            None => false,
        }
    }

    /// Unloads every resource in order and empties the registry.
    pub fn destroy(&mut self, gfx: &mut dyn GraphicsBackend) {
        for resource in self.resources.drain(..) {
            self.loader.unload(gfx, resource);
        }
    }

    pub fn get(&self, id: ShaderId) -> Option<&ShaderResource> {
        self.resources.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn head(&self) -> Option<ShaderId> {
        (!self.resources.is_empty()).then_some(ShaderId(0))
    }

    pub fn tail(&self) -> Option<ShaderId> {
        self.resources.len().checked_sub(1).map(ShaderId)
    }

    /// Successor of `id` in traversal order.
    pub fn next_of(&self, id: ShaderId) -> Option<ShaderId> {
        let next = id.0 + 1;
        (next < self.resources.len()).then_some(ShaderId(next))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShaderId, &ShaderResource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(index, resource)| (ShaderId(index), resource))
    }
}

impl Drop for ShaderRegistry {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            warn!(
                count = self.resources.len(),
                "shader registry dropped without destroy; programs leaked"
            );
        }
    }
}

impl std::fmt::Debug for ShaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.resources.iter().map(ShaderResource::name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GraphicsCounters, NagaGraphics};
    use crate::test_support::{shader_tree, test_reporter, BROKEN_FRAGMENT};
    use reporter::{BufferSink, ErrorProbe, Fault};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::TempDir;

    struct Fixture {
        _assets: TempDir,
        loader: ShaderLoader,
        sink: BufferSink,
        gfx: NagaGraphics,
        counters: Arc<GraphicsCounters>,
    }

    fn fixture(valid: &[&str]) -> Fixture {
        let assets = shader_tree(valid);
        let (reporter, sink) = test_reporter();
        let counters = Arc::new(GraphicsCounters::default());
        Fixture {
            loader: ShaderLoader::new(reporter, assets.path()),
            _assets: assets,
            sink,
            gfx: NagaGraphics::new(counters.clone()),
            counters,
        }
    }

    fn no_such_value_lines(sink: &BufferSink) -> usize {
        sink.lines()
            .iter()
            .filter(|line| line.contains("no_such_value"))
            .count()
    }

    #[test]
    fn create_holds_exactly_one_loaded_resource() {
        let mut fx = fixture(&["basic"]);
        let mut registry = ShaderRegistry::create(fx.loader.clone(), &mut fx.gfx, "basic");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.head(), registry.tail());
        assert!(registry.find(Some("basic")).unwrap().is_loaded());
        registry.destroy(&mut fx.gfx);
    }

    #[test]
    fn append_grows_tail_and_links_successor() {
        let mut fx = fixture(&["basic", "waves"]);
        let mut registry = ShaderRegistry::create(fx.loader.clone(), &mut fx.gfx, "basic");
        let old_tail = registry.tail().unwrap();

        let id = registry.append(&mut fx.gfx, Some("waves")).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tail(), Some(id));
        assert_eq!(registry.next_of(old_tail), Some(id));
        assert_eq!(registry.next_of(id), None);
        assert_eq!(registry.iter().count(), registry.len());
        registry.destroy(&mut fx.gfx);
    }

    #[test]
    fn append_without_name_is_a_noop_warning() {
        let mut fx = fixture(&["basic"]);
        let mut registry = ShaderRegistry::empty(fx.loader.clone());
        assert_eq!(registry.append(&mut fx.gfx, None), None);
        assert!(registry.is_empty());
        assert_eq!(fx.loader.reporter().last_warning(), Some(Problem::NullParam));
    }

    #[test]
    fn find_on_empty_registry_then_append() {
        let mut fx = fixture(&["basic"]);
        let mut registry = ShaderRegistry::empty(fx.loader.clone());
        registry.append(&mut fx.gfx, Some("basic"));
        assert_eq!(registry.find(Some("basic")).map(ShaderResource::name), Some("basic"));

        assert!(registry.find(Some("missing")).is_none());
        assert_eq!(no_such_value_lines(&fx.sink), 1);
        assert_eq!(fx.loader.reporter().last_warning(), Some(Problem::NoSuchValue));
        registry.destroy(&mut fx.gfx);
    }

    #[test]
    fn find_without_name_returns_head_and_duplicates_resolve_first() {
        let mut fx = fixture(&["basic", "waves"]);
        let mut registry = ShaderRegistry::create(fx.loader.clone(), &mut fx.gfx, "waves");
        registry.append(&mut fx.gfx, Some("basic"));
        registry.append(&mut fx.gfx, Some("basic"));

        assert_eq!(registry.find(None).map(ShaderResource::name), Some("waves"));
        assert_eq!(registry.find_id(Some("basic")), registry.next_of(registry.head().unwrap()));
        registry.destroy(&mut fx.gfx);
    }

    #[test]
    fn destroy_releases_every_program_and_tolerates_repeat() {
        let mut fx = fixture(&["basic", "waves"]);
        let mut registry = ShaderRegistry::create(fx.loader.clone(), &mut fx.gfx, "basic");
        registry.append(&mut fx.gfx, Some("waves"));
        assert_eq!(fx.counters.programs_live(), 2);

        registry.destroy(&mut fx.gfx);
        assert!(registry.is_empty());
        assert_eq!(registry.tail(), None);
        assert_eq!(fx.counters.programs_live(), 0);

        registry.destroy(&mut fx.gfx);
        assert!(fx.sink.contents().is_empty());

        let id = registry.append(&mut fx.gfx, Some("basic")).unwrap();
        assert_eq!(registry.head(), Some(id));
        assert_eq!(registry.tail(), Some(id));
        registry.destroy(&mut fx.gfx);
    }

    #[test]
    fn activate_binds_program() {
        let mut fx = fixture(&["basic"]);
        let mut registry = ShaderRegistry::create(fx.loader.clone(), &mut fx.gfx, "basic");
        assert!(registry.activate(&mut fx.gfx, None));
        let program = registry.find(None).unwrap().program();
        assert_eq!(fx.gfx.bound_program(), program);
        assert!(!registry.activate(&mut fx.gfx, Some("missing")));
        registry.destroy(&mut fx.gfx);
    }

    #[test]
    fn pending_resources_warn_on_use() {
        let mut fx = fixture(&[]);
        let pending = ShaderResource::pending("later");
        fx.loader.activate(&mut fx.gfx, &pending);
        assert_eq!(fx.loader.reporter().last_warning(), Some(Problem::NullObject));
        fx.loader.unload(&mut fx.gfx, pending);
        assert_eq!(fx.counters.binds(), 0);
    }

    #[test]
    fn missing_sources_are_fatal_and_print_the_path() {
        let mut fx = fixture(&[]);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            fx.loader.load(&mut fx.gfx, Some("absent"));
        }));
        assert!(outcome.is_err());
        let out = fx.sink.contents();
        assert!(out.contains("Shaders/absent/vertex.vs"));
        assert!(out.contains("gl_shader_comp"));
    }

    #[test]
    fn compile_errors_are_fatal_and_print_the_log() {
        let mut fx = fixture(&["broken"]);
        std::fs::write(
            fx.loader.files().shader_path("broken", FRAGMENT_FILE),
            BROKEN_FRAGMENT,
        )
        .unwrap();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            fx.loader.load(&mut fx.gfx, Some("broken"));
        }));
        assert!(outcome.is_err());
        let lines = fx.sink.lines();
        assert!(lines.len() >= 2);
        assert!(lines.last().unwrap().contains("gl_shader_comp"));
        assert_eq!(fx.counters.programs_linked(), 0);
    }

    #[test]
    fn binding_a_program_from_another_backend_is_fatal() {
        let mut fx = fixture(&["basic"]);
        let resource = fx.loader.load(&mut fx.gfx, Some("basic")).unwrap();
        let mut other = NagaGraphics::new(Arc::new(GraphicsCounters::default()));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            fx.loader.activate(&mut other, &resource);
        }));
        assert!(outcome.is_err());
        let lines = fx.sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("activate() in"));
        assert!(lines[0].contains(":: gl_shader_bad --"));
        assert_eq!(other.bound_program(), None);

        fx.loader.unload(&mut fx.gfx, resource);
    }

    /// Compiles through naga but refuses every link.
    struct RejectingLinker {
        inner: NagaGraphics,
    }

    impl GraphicsBackend for RejectingLinker {
        fn compile(&mut self, stage: ShaderStage, source: &str) -> Result<StageId, String> {
            self.inner.compile(stage, source)
        }

        fn delete_stage(&mut self, stage: StageId) {
            self.inner.delete_stage(stage);
        }

        fn link(&mut self, _vertex: StageId, _fragment: StageId) -> Result<ProgramId, String> {
            Err("link log: varying v_uv has no producer".to_string())
        }

        fn delete_program(&mut self, program: ProgramId) {
            self.inner.delete_program(program);
        }

        fn use_program(&mut self, program: ProgramId) {
            self.inner.use_program(program);
        }

        fn take_error(&mut self) -> Option<Fault> {
            self.inner.take_error()
        }

        fn clear(&mut self, color: [f32; 4]) {
            self.inner.clear(color);
        }

        fn draw_fullscreen(&mut self) {
            self.inner.draw_fullscreen();
        }

        fn error_probe(&self) -> Arc<dyn ErrorProbe> {
            self.inner.error_probe()
        }
    }

    #[test]
    fn link_errors_are_fatal_and_print_the_log_first() {
        let fx = fixture(&["basic"]);
        let mut gfx = RejectingLinker {
            inner: NagaGraphics::new(fx.counters.clone()),
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            fx.loader.load(&mut gfx, Some("basic"));
        }));
        assert!(outcome.is_err());

        let lines = fx.sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "link log: varying v_uv has no producer");
        assert!(lines[1].contains("load() in"));
        assert!(lines[1].contains(":: gl_shader_comp --"));
        assert_eq!(fx.counters.programs_linked(), 0);
    }
}
