//! Lightweight timing utilities for optional performance tracing.
//!
//! A [`TimingGuard`] records how long a scoped stage of the classification
//! pipeline took (model load, preprocessing, inference, decoding) and logs it
//! under the `scrawl::telemetry` target when it goes out of scope.
//!
//! Two switches gate every entry: telemetry must be turned on through
//! [`configure`], usually from the `telemetry` section of the settings file, and
//! the global logger must accept the requested level. When either switch is off a
//! guard is inert and costs one `Instant::now()`.

use std::{
    borrow::Cow,
    sync::atomic::{AtomicBool, AtomicU8, Ordering},
    time::{Duration, Instant},
};

use log::{Level, LevelFilter, log, log_enabled};

/// Log target used for every timing entry.
pub const TELEMETRY_TARGET: &str = "scrawl::telemetry";

static TELEMETRY_ENABLED: AtomicBool = AtomicBool::new(false);
static TELEMETRY_LEVEL: AtomicU8 = AtomicU8::new(LevelFilter::Off as u8);

/// RAII helper that logs how long an operation took when dropped.
///
/// Build one with [`timing_guard`] or [`timing_guard_if`]; whether it will log
/// is decided once, at creation, and can be queried with [`TimingGuard::is_active`].
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    fn new(label: Cow<'static, str>, level: Level, active: bool) -> Self {
        Self {
            label,
            level,
            start: Instant::now(),
            active,
        }
    }

    /// Returns `true` when the guard will emit a log entry on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the elapsed duration since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Consume the guard and return the elapsed duration without logging.
    pub fn finish(mut self) -> Duration {
        self.active = false;
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            log!(
                target: TELEMETRY_TARGET,
                self.level,
                "{} completed in {:.2?}",
                self.label,
                self.start.elapsed()
            );
        }
    }
}

/// Create a timing guard that logs at `level` when telemetry allows it.
///
/// The logger must also accept the level for the telemetry target, e.g.
/// `RUST_LOG=scrawl::telemetry=debug` for the per-stage entries the engine emits.
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    timing_guard_if(label, level, true)
}

/// Create a timing guard that also respects an explicit boolean flag.
///
/// Useful when a caller has its own per-request switch on top of the global one;
/// a `false` flag yields an inert guard regardless of the configured level.
pub fn timing_guard_if(
    label: impl Into<Cow<'static, str>>,
    level: Level,
    enabled: bool,
) -> TimingGuard {
    let active =
        enabled && telemetry_allows(level) && log_enabled!(target: TELEMETRY_TARGET, level);
    TimingGuard::new(label.into(), level, active)
}

/// Configure the global telemetry state.
///
/// Applies to guards created afterwards; guards already alive keep the decision
/// they made at creation. Call again whenever the loaded settings change.
pub fn configure(enabled: bool, level: LevelFilter) {
    TELEMETRY_ENABLED.store(enabled, Ordering::Relaxed);
    TELEMETRY_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns whether telemetry logging is currently enabled.
pub fn telemetry_enabled() -> bool {
    TELEMETRY_ENABLED.load(Ordering::Relaxed)
}

/// Returns the maximum telemetry logging level.
pub fn telemetry_level() -> LevelFilter {
    match TELEMETRY_LEVEL.load(Ordering::Relaxed) {
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        5 => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// Returns `true` when telemetry is enabled and `level` is within the configured threshold.
///
/// This ignores the logger's own filter; [`timing_guard`] checks both.
pub fn telemetry_allows(level: Level) -> bool {
    telemetry_enabled() && level <= telemetry_level()
}
