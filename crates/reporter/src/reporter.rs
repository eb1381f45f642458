use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error};

use crate::catalog::{Category, Problem};
use crate::clock::{Clock, MonotonicClock, TimestampFormat};
use crate::notify::{platform_notifier, Notifier, NOTIFICATION_SUMMARY};

/// Exit status used for every fatal problem.
pub const FAILURE_STATUS: i32 = 1;

const NO_WARNING: u16 = u16::MAX;

/// Source location of a report, captured by [`callsite!`](crate::callsite).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Callsite {
    pub file: &'static str,
    pub function: &'static str,
    pub line: u32,
}

impl Callsite {
    pub const fn new(file: &'static str, function: &'static str, line: u32) -> Self {
        Self {
            file,
            function,
            line,
        }
    }

    /// An empty file or function name is treated as a missing callsite.
    pub fn is_complete(&self) -> bool {
        !self.file.is_empty() && !self.function.is_empty()
    }
}

/// Error state pulled from a backend at report time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub description: String,
}

impl Fault {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Last-error accessor a backend exposes to the reporter.
pub trait ErrorProbe: Send + Sync {
    fn last_error(&self) -> Option<Fault>;
}

/// How the process ends after a fatal problem.
pub trait Terminate: Send + Sync {
    fn terminate(&self, status: i32) -> !;
}

/// Exits the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl Terminate for ProcessExit {
    fn terminate(&self, status: i32) -> ! {
        std::process::exit(status)
    }
}

/// Unwinds the calling thread instead of exiting; for hosts and tests that
/// need to observe fatal problems in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwindTerminate;

impl Terminate for UnwindTerminate {
    fn terminate(&self, status: i32) -> ! {
        panic!("fatal problem reported (exit status {status})")
    }
}

/// In-memory output sink whose contents can be inspected after the fact.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for BufferSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Prints warnings, escalates errors, and remembers the last warning.
///
/// One reporter is created per process and shared as `Arc<Reporter>` by every
/// component, on either thread.
pub struct Reporter {
    clock: Box<dyn Clock>,
    sink: Mutex<Box<dyn Write + Send>>,
    notifier: Option<Box<dyn Notifier>>,
    terminate: Box<dyn Terminate>,
    probes: Mutex<HashMap<Category, Arc<dyn ErrorProbe>>>,
    last_warning: AtomicU16,
}

impl Reporter {
    pub fn builder() -> ReporterBuilder {
        ReporterBuilder::default()
    }

    /// Reporter writing to stdout, notifying through the platform helper and
    /// exiting the process on fatal problems.
    pub fn stdout() -> Self {
        Self::builder().build()
    }

    /// Reports `problem` from `callsite`.
    ///
    /// `None` is the "no problem" sentinel and returns immediately. Warnings
    /// print one timestamped line and return; fatal problems never return.
    pub fn report(&self, problem: impl Into<Option<Problem>>, callsite: Callsite) {
        let Some(problem) = problem.into() else {
            return;
        };
        let (problem, callsite) = if callsite.is_complete() {
            (problem, callsite)
        } else {
            (Problem::NullParam, crate::callsite!())
        };

        if problem.is_fatal() {
            self.escalate(problem, callsite);
        }

        let line = self.format_line(problem, callsite);
        self.write_line(&line);
        self.last_warning.store(problem as u16, Ordering::Release);
        debug!(problem = problem.name(), "warning reported");
    }

    /// Reports a fatal problem. Warnings passed here are escalated too.
    pub fn fail(&self, problem: Problem, callsite: Callsite) -> ! {
        let callsite = if callsite.is_complete() {
            callsite
        } else {
            crate::callsite!()
        };
        self.escalate(problem, callsite)
    }

    /// Most recent non-fatal problem, if any was reported.
    pub fn last_warning(&self) -> Option<Problem> {
        match self.last_warning.load(Ordering::Acquire) {
            NO_WARNING => None,
            code => Problem::from_code(code),
        }
    }

    /// Registers the last-error accessor consulted for `category` problems.
    pub fn attach_probe(&self, category: Category, probe: Arc<dyn ErrorProbe>) {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category, probe);
    }

    pub fn detach_probe(&self, category: Category) {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&category);
    }

    /// Current time from the reporter's clock in `format`.
    pub fn timestamp(&self, format: TimestampFormat) -> String {
        self.clock.now().render(format)
    }

    /// Writes diagnostic text that precedes a report (compiler logs, paths).
    pub fn diagnostic(&self, text: &str) {
        self.write_line(text);
    }

    fn escalate(&self, problem: Problem, callsite: Callsite) -> ! {
        let mut message = self.format_line(problem, callsite);
        if let Some(extra) = self.extra_info(problem.category()) {
            message.push_str(&format!(" | extra: {} :: {}", extra.code, extra.description));
        }

        match self.notifier.as_deref() {
            Some(notifier) if notifier.is_available() => {
                if let Err(err) = notifier.notify(NOTIFICATION_SUMMARY, &message) {
                    error!(%err, "desktop notification failed; falling back to console");
                    self.write_line(&message);
                }
            }
            _ => self.write_line(&message),
        }

        error!(
            problem = problem.name(),
            at = %self.timestamp(TimestampFormat::Full),
            "fatal problem reported; terminating"
        );
        self.terminate.terminate(FAILURE_STATUS)
    }

    fn extra_info(&self, category: Category) -> Option<Fault> {
        match category {
            Category::Os => {
                let err = io::Error::last_os_error();
                Some(Fault::new(err.raw_os_error().unwrap_or(0), err.to_string()))
            }
            Category::Display | Category::Graphics => {
                let probe = self
                    .probes
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&category)
                    .cloned();
                probe.and_then(|probe| probe.last_error())
            }
            Category::Internal => None,
        }
    }

    fn format_line(&self, problem: Problem, callsite: Callsite) -> String {
        let descriptor = problem.descriptor();
        format!(
            "{stamp} {function}() in {file} @ {line} :: {name} -- {description}, category: 0x{category:x}",
            stamp = self.clock.now().render(TimestampFormat::Bracketed),
            function = callsite.function,
            file = callsite.file,
            line = callsite.line,
            name = descriptor.name,
            description = descriptor.description,
            category = descriptor.category.code(),
        )
    }

    fn write_line(&self, line: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // Nothing sensible is left to do if the console itself is gone.
        let _ = writeln!(sink, "{line}");
        let _ = sink.flush();
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("last_warning", &self.last_warning())
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Reporter`]; every part has a production default.
pub struct ReporterBuilder {
    clock: Box<dyn Clock>,
    sink: Box<dyn Write + Send>,
    notifier: Option<Box<dyn Notifier>>,
    terminate: Box<dyn Terminate>,
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        Self {
            clock: Box::new(MonotonicClock::new()),
            sink: Box::new(io::stdout()),
            notifier: platform_notifier(),
            terminate: Box::new(ProcessExit),
        }
    }
}

impl ReporterBuilder {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Always print fatal problems to the sink.
    pub fn without_notifier(mut self) -> Self {
        self.notifier = None;
        self
    }

    pub fn terminate(mut self, terminate: impl Terminate + 'static) -> Self {
        self.terminate = Box::new(terminate);
        self
    }

    pub fn build(self) -> Reporter {
        Reporter {
            clock: self.clock,
            sink: Mutex::new(self.sink),
            notifier: self.notifier,
            terminate: self.terminate,
            probes: Mutex::new(HashMap::new()),
            last_warning: AtomicU16::new(NO_WARNING),
        }
    }
}
