//! Logging utilities for formatted output.
//!
//! Number, duration and rate formatting shared by progress messages and the
//! end-of-run summary, plus a timer that brackets a whole operation.

use std::time::{Duration, Instant};

use crate::fixmate::FixMateMetrics;

/// Formats a count with thousands separators (e.g. "1,234,567").
///
/// # Examples
///
/// ```
/// use matefix_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a fraction (0.0-1.0) as a percentage with `decimals` places.
///
/// # Examples
///
/// ```
/// use matefix_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a duration in human-readable form ("45s", "2m 15s", "1h 30m").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a processing rate in records per second (or per minute when slow).
#[must_use]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} records/s", format_count(count));
    }

    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} records/s", format_count(rate as u64))
    } else {
        let per_min = count as f64 / (secs / 60.0);
        format!("{per_min:.1} records/min")
    }
}

/// Logs the end-of-run summary block for a fixmate run.
pub fn log_fixmate_summary(metrics: &FixMateMetrics) {
    log::info!("=== Summary ===");
    log::info!("  Templates processed: {}", format_count(metrics.templates));
    log::info!("  Records read: {}", format_count(metrics.records_read));
    log::info!("  Records written: {}", format_count(metrics.records_written));
    log::info!("  Pairs synchronized: {}", format_count(metrics.pairs_synchronized));
    log::info!("  Unpaired primaries reset: {}", format_count(metrics.unpaired_primaries));

    if metrics.records_read > 0 && metrics.records_removed > 0 {
        let fraction = metrics.records_removed as f64 / metrics.records_read as f64;
        log::info!(
            "  Records removed: {} ({})",
            format_count(metrics.records_removed),
            format_percent(fraction, 2)
        );
    } else {
        log::info!("  Records removed: {}", format_count(metrics.records_removed));
    }

    log::info!("  Records trimmed to reference end: {}", format_count(metrics.records_trimmed));
    log::info!("  Records marked unmapped: {}", format_count(metrics.records_marked_unmapped));
    if metrics.templates_with_extra_primaries > 0 {
        log::warn!(
            "  Templates with more than two primary records: {}",
            format_count(metrics.templates_with_extra_primaries)
        );
    }
}

/// Operation timing and summary helper.
///
/// # Examples
///
/// ```no_run
/// use matefix_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Fixing mate information");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with item count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}
