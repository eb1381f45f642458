//! Bounded string formatting.
//!
//! [`bounded`] formats into a string that may hold at most `capacity` bytes.
//! Output past the limit is dropped at a character boundary and a
//! `small_buffer` warning is reported; the truncated text is still returned so
//! callers carry on with what fit.

use std::fmt::{self, Write};

use crate::catalog::Problem;
use crate::reporter::{Callsite, Reporter};

/// Formats with [`bounded`], capturing the caller's location.
///
/// ```ignore
/// let title = bounded_format!(reporter, 128, "{} | v{}", title, version);
/// ```
#[macro_export]
macro_rules! bounded_format {
    ($reporter:expr, $capacity:expr, $($arg:tt)+) => {
        $crate::text::bounded(&$reporter, $crate::callsite!(), $capacity, format_args!($($arg)+))
    };
}

struct BoundedWriter {
    buffer: String,
    capacity: usize,
    overflowed: bool,
}

impl Write for BoundedWriter {
    fn write_str(&mut self, piece: &str) -> fmt::Result {
        if self.overflowed {
            return Ok(());
        }
        let room = self.capacity - self.buffer.len();
        if piece.len() <= room {
            self.buffer.push_str(piece);
            return Ok(());
        }
        let mut cut = room;
        while !piece.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buffer.push_str(&piece[..cut]);
        self.overflowed = true;
        Ok(())
    }
}

/// Formats `args` into at most `capacity` bytes.
pub fn bounded(
    reporter: &Reporter,
    callsite: Callsite,
    capacity: usize,
    args: fmt::Arguments<'_>,
) -> String {
    let mut writer = BoundedWriter {
        buffer: String::with_capacity(capacity.min(256)),
        capacity,
        overflowed: false,
    };
    if writer.write_fmt(args).is_err() {
        reporter.report(Problem::StringError, callsite);
        return writer.buffer;
    }
    if writer.overflowed {
        reporter.report(Problem::SmallBuffer, callsite);
    }
    writer.buffer
}
