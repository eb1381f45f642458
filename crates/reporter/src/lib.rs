//! Problem catalog and reporter for the Leto shell.
//!
//! Every component reports through one shared [`Reporter`]:
//!
//! ```text
//!   report!(reporter, Problem::X)
//!          │
//!          ├─ warning ─▶ "[m:ss:ms] fn() in file @ line :: name -- description, category: 0x..."
//!          │             last_warning = X
//!          │
//!          └─ fatal ───▶ same line + backend extra info
//!                        ├─▶ notify-send (when available)
//!                        └─▶ stdout (fallback)
//!                        exit(1)
//! ```
//!
//! The catalog in [`catalog`] is static; the reporter's only mutable state is
//! the last warning code.

pub mod catalog;
pub mod clock;
pub mod notify;
mod reporter;
pub mod text;

pub use catalog::{Category, Problem, ProblemDescriptor, Severity, CATALOG};
pub use clock::{Clock, FixedClock, MonotonicClock, Timestamp, TimestampFormat, WallClock};
pub use notify::{DesktopNotifier, Notifier, NotifyError};
pub use reporter::{
    BufferSink, Callsite, ErrorProbe, Fault, ProcessExit, Reporter, ReporterBuilder, Terminate,
    UnwindTerminate, FAILURE_STATUS,
};

/// Name of the enclosing function, without its module path.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        let name = name.trim_end_matches("::{{closure}}");
        match name.rfind("::") {
            Some(index) => &name[index + 2..],
            None => name,
        }
    }};
}

/// [`Callsite`] of the macro invocation.
#[macro_export]
macro_rules! callsite {
    () => {
        $crate::Callsite::new(file!(), $crate::function_name!(), line!())
    };
}

/// Reports a problem from the current location.
#[macro_export]
macro_rules! report {
    ($reporter:expr, $problem:expr) => {
        $reporter.report($problem, $crate::callsite!())
    };
}

/// Reports a fatal problem from the current location; evaluates to `!`.
#[macro_export]
macro_rules! fail {
    ($reporter:expr, $problem:expr) => {
        $reporter.fail($problem, $crate::callsite!())
    };
}
