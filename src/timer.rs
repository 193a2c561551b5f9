//! Wall-clock timing of named benchmark steps.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::Result;

/// Runs `action` between a header and a timing line written to `out`.
///
/// Writes a blank line and `name`, runs the action, then a blank line and the
/// elapsed time as rendered by [`format_millis`].
pub fn time_test<W, T, F>(name: &str, out: &mut W, action: F) -> Result<(T, Duration)>
where
    W: Write + ?Sized,
    F: FnOnce() -> Result<T>,
{
    writeln!(out)?;
    writeln!(out, "{name}")?;
    out.flush()?;

    let start = Instant::now();
    let value = action()?;
    let elapsed = start.elapsed();

    writeln!(out)?;
    writeln!(out, "{}", format_millis(elapsed))?;
    debug!(test = name, elapsed_us = elapsed.as_micros() as u64, "timer.done");
    Ok((value, elapsed))
}

/// Whole milliseconds with thousands separators, e.g. `1,234ms`.
pub fn format_millis(elapsed: Duration) -> String {
    format!("{}ms", group_thousands(elapsed.as_millis()))
}

/// Renders `value` with a `,` between every group of three digits.
pub fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
