//! Phase timing for the classifier run.
//!
//! A [`TimingGuard`] measures a scoped phase (reading the corpus, compiling
//! kernels, loading weights, handling images) and reports it on the
//! `mobilenet::telemetry` target when dropped. Reporting is opt-in: the global
//! switch set by [`configure`] must be on and the level must pass both the
//! telemetry threshold and the active log filter.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

const TARGET: &str = "mobilenet::telemetry";

static TELEMETRY_ENABLED: AtomicBool = AtomicBool::new(false);
static TELEMETRY_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Scoped stopwatch that logs its elapsed time on drop when active.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    /// Returns `true` when the guard will emit a log entry on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Elapsed time since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the clock without logging and return the measured duration.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(
                target: TARGET,
                self.level,
                "{}: {:.3} sec",
                self.label,
                self.start.elapsed().as_secs_f64()
            );
        }
    }
}

/// Start timing `label`; the guard reports only when telemetry allows `level`.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    timing_guard_if(label, level, true)
}

/// Like [`timing_guard`] with an extra caller-controlled switch.
pub fn timing_guard_if(
    label: impl Into<Cow<'static, str>>,
    level: Level,
    enabled: bool,
) -> TimingGuard {
    let active = enabled && telemetry_allows(level) && log_enabled!(target: TARGET, level);
    TimingGuard {
        label: label.into(),
        level,
        start: Instant::now(),
        active,
    }
}

/// Set the global telemetry switch and its level threshold.
pub fn configure(enabled: bool, level: LevelFilter) {
    TELEMETRY_ENABLED.store(enabled, Ordering::Relaxed);
    TELEMETRY_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns whether telemetry logging is currently enabled.
pub fn telemetry_enabled() -> bool {
    TELEMETRY_ENABLED.load(Ordering::Relaxed)
}

/// Returns `true` when telemetry is on and `level` is within the threshold.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && (level as u8) <= TELEMETRY_LEVEL.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns the global switch so parallel test threads cannot race on it.
    #[test]
    fn threshold_and_switch_gate_guards() {
        configure(false, LevelFilter::Trace);
        assert!(!telemetry_allows(Level::Error));
        assert!(!timing_guard("disabled", Level::Error).is_active());

        configure(true, LevelFilter::Info);
        assert!(telemetry_allows(Level::Info));
        assert!(telemetry_allows(Level::Warn));
        assert!(!telemetry_allows(Level::Debug));
        assert!(!timing_guard_if("switched off", Level::Info, false).is_active());

        configure(true, LevelFilter::Off);
        assert!(!telemetry_allows(Level::Error));
        configure(false, LevelFilter::Off);
    }

    #[test]
    fn finish_reports_elapsed_time() {
        let guard = timing_guard("finish", Level::Trace);
        std::thread::sleep(Duration::from_millis(2));
        assert!(guard.finish() >= Duration::from_millis(2));
    }
}
