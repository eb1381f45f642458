use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// Layouts a [`Timestamp`] can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `12 milliseconds, 4 seconds, 1 minutes`
    Full,
    /// `12ms, 4s, 1m`
    Shortened,
    /// `[1:04:012]`, used at the head of every warning line.
    Bracketed,
}

/// A point in time as produced by a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    /// Time elapsed since the clock was created.
    Elapsed(Duration),
    /// Local wall-clock time.
    Wall(DateTime<Local>),
}

impl Timestamp {
    pub fn render(&self, format: TimestampFormat) -> String {
        match self {
            Timestamp::Elapsed(elapsed) => {
                let total_ms = elapsed.as_millis();
                let ms = total_ms % 1000;
                let seconds = (total_ms / 1000) % 60;
                let minutes = total_ms / 60_000;
                match format {
                    TimestampFormat::Full => {
                        format!("{ms} milliseconds, {seconds} seconds, {minutes} minutes")
                    }
                    TimestampFormat::Shortened => format!("{ms}ms, {seconds}s, {minutes}m"),
                    TimestampFormat::Bracketed => format!("[{minutes}:{seconds:02}:{ms:03}]"),
                }
            }
            Timestamp::Wall(time) => match format {
                TimestampFormat::Full => time.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                TimestampFormat::Shortened => time.format("%H:%M:%S").to_string(),
                TimestampFormat::Bracketed => time.format("[%H:%M:%S%.3f]").to_string(),
            },
        }
    }
}

/// Abstraction over where report timestamps originate from.
///
/// Shared by every thread that reports, so sampling takes `&self`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock measuring time since the reporter started.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        Timestamp::Elapsed(self.origin.elapsed())
    }
}

/// Clock backed by the local wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> Timestamp {
        Timestamp::Wall(Local::now())
    }
}

/// Clock that always reports the same elapsed time; keeps test output stable.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    elapsed: Duration,
}

impl FixedClock {
    pub fn new(elapsed: Duration) -> Self {
        Self { elapsed }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::Elapsed(self.elapsed)
    }
}
