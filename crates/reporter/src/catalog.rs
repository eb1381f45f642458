//! Static taxonomy of every problem the shell can report.
//!
//! Each [`Problem`] maps to exactly one [`ProblemDescriptor`] in [`CATALOG`]:
//! a snake_case name, a short description, whether the problem is fatal, and
//! the [`Category`] that decides which diagnostic context is captured when it
//! is reported. The table is `static` and never mutated.

use std::fmt;

/// Where a problem originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Out of our control: allocation, clocks, file operations.
    Os,
    /// Raised by the display backend (windowing, monitors, contexts).
    Display,
    /// Raised by the graphics backend (shader compilation, program binding).
    Graphics,
    /// A mistake in the application's own logic.
    Internal,
}

impl Category {
    /// Numeric category tag printed after every problem line.
    pub const fn code(self) -> u16 {
        match self {
            Category::Os => 0x111E,
            Category::Display => 0x112E,
            Category::Graphics => 0x113E,
            Category::Internal => 0x114E,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Category::Os => "os",
            Category::Display => "display",
            Category::Graphics => "graphics",
            Category::Internal => "internal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Every condition the reporter knows about.
///
/// The discriminant doubles as the index into [`CATALOG`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Problem {
    NullParam,
    FailedBuffer,
    SmallBuffer,
    NoSuchValue,
    StringError,
    TimeError,
    NullObject,
    FileRead,
    BackendInit,
    MonitorUnavailable,
    WindowCreation,
    GraphicsInit,
    ShaderCompilation,
    MalformedShader,
    QueriedBeforeCreation,
    DoubleCreation,
    PrematureFree,
    SwapBeforeCreation,
}

impl Problem {
    pub const COUNT: usize = 18;

    pub const ALL: [Problem; Problem::COUNT] = [
        Problem::NullParam,
        Problem::FailedBuffer,
        Problem::SmallBuffer,
        Problem::NoSuchValue,
        Problem::StringError,
        Problem::TimeError,
        Problem::NullObject,
        Problem::FileRead,
        Problem::BackendInit,
        Problem::MonitorUnavailable,
        Problem::WindowCreation,
        Problem::GraphicsInit,
        Problem::ShaderCompilation,
        Problem::MalformedShader,
        Problem::QueriedBeforeCreation,
        Problem::DoubleCreation,
        Problem::PrematureFree,
        Problem::SwapBeforeCreation,
    ];

    pub fn descriptor(self) -> &'static ProblemDescriptor {
        &CATALOG[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn is_fatal(self) -> bool {
        self.descriptor().fatal
    }

    pub fn category(self) -> Category {
        self.descriptor().category
    }

    pub fn severity(self) -> Severity {
        if self.is_fatal() {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    /// Inverse of `problem as u16`.
    pub fn from_code(code: u16) -> Option<Problem> {
        Problem::ALL.get(usize::from(code)).copied()
    }

    /// Looks a problem up by its catalog name (`"no_such_value"`).
    pub fn from_name(name: &str) -> Option<Problem> {
        Problem::ALL
            .iter()
            .copied()
            .find(|problem| problem.name() == name)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct ProblemDescriptor {
    pub problem: Problem,
    pub name: &'static str,
    /// Kept under fifty characters so notification bodies stay readable.
    pub description: &'static str,
    pub fatal: bool,
    pub category: Category,
}

const fn entry(
    problem: Problem,
    name: &'static str,
    description: &'static str,
    fatal: bool,
    category: Category,
) -> ProblemDescriptor {
    ProblemDescriptor {
        problem,
        name,
        description,
        fatal,
        category,
    }
}

pub static CATALOG: [ProblemDescriptor; Problem::COUNT] = [
    entry(Problem::NullParam, "null_param", "a null parameter was passed", false, Category::Internal),
    entry(Problem::FailedBuffer, "failed_buffer", "an allocation failure occurred", true, Category::Os),
    entry(Problem::SmallBuffer, "small_buffer", "tried to write past buffer bounds", false, Category::Internal),
    entry(Problem::NoSuchValue, "no_such_value", "no equal value found in list", false, Category::Internal),
    entry(Problem::StringError, "string_error", "string manipulation error", false, Category::Internal),
    entry(Problem::TimeError, "time_error", "failed to get time", true, Category::Os),
    entry(Problem::NullObject, "null_object", "call made on an empty object", false, Category::Internal),
    entry(Problem::FileRead, "file_read", "failed to read from file", false, Category::Os),
    entry(Problem::BackendInit, "backend_init", "failed to initialize display backend", true, Category::Display),
    entry(Problem::MonitorUnavailable, "backend_monitor", "failed to get primary monitor", true, Category::Display),
    entry(Problem::WindowCreation, "null_window", "failed to create window", true, Category::Display),
    entry(Problem::GraphicsInit, "gl_init", "failed to initialize graphics context", true, Category::Graphics),
    entry(Problem::ShaderCompilation, "gl_shader_comp", "failed to compile shader", true, Category::Graphics),
    entry(Problem::MalformedShader, "gl_shader_bad", "failed to utilize shader", true, Category::Graphics),
    entry(Problem::QueriedBeforeCreation, "window_null", "call made to nonexistent window", false, Category::Internal),
    entry(Problem::DoubleCreation, "double_window", "created window twice", false, Category::Internal),
    entry(Problem::PrematureFree, "premature_free", "freed window before creation", false, Category::Internal),
    entry(Problem::SwapBeforeCreation, "premature_swap", "swapped buffers before creation", false, Category::Internal),
];
