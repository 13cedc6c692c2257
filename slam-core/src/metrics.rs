//! Runtime counters and update-pass timing.
//!
//! Counters are plain `AtomicU64`s bumped on the hot path and read on export.
//! The timing ring buffer sits behind a `parking_lot::Mutex` since it is
//! only read for dashboards and benchmarks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Event counters for one [`crate::engine::ArousalEngine`].
#[derive(Debug)]
pub struct EngineCounters {
    /// Names newly bound in the registry.
    pub effects_registered: AtomicU64,
    /// Names unbound from the registry.
    pub effects_unregistered: AtomicU64,
    /// Entity update passes run.
    pub update_passes: AtomicU64,
    /// Laws that finished and reset to `None`.
    pub effects_completed: AtomicU64,
    /// Entity states discarded by sweeps.
    pub entities_swept: AtomicU64,
    /// Records encoded.
    pub saves: AtomicU64,
    /// Records decoded successfully.
    pub loads: AtomicU64,
    /// Decodes that failed and reverted the engine.
    pub load_failures: AtomicU64,
    /// Entities whose stored arousal was replaced on load.
    pub arousal_heals: AtomicU64,
    /// Group values reset on load.
    pub corrupted_groups: AtomicU64,
}

impl EngineCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            effects_registered: AtomicU64::new(0),
            effects_unregistered: AtomicU64::new(0),
            update_passes: AtomicU64::new(0),
            effects_completed: AtomicU64::new(0),
            entities_swept: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            arousal_heals: AtomicU64::new(0),
            corrupted_groups: AtomicU64::new(0),
        }
    }

    /// Add `n` to `counter`.
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Copy every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            effects_registered: load(&self.effects_registered),
            effects_unregistered: load(&self.effects_unregistered),
            update_passes: load(&self.update_passes),
            effects_completed: load(&self.effects_completed),
            entities_swept: load(&self.entities_swept),
            saves: load(&self.saves),
            loads: load(&self.loads),
            load_failures: load(&self.load_failures),
            arousal_heals: load(&self.arousal_heals),
            corrupted_groups: load(&self.corrupted_groups),
        }
    }
}

impl Default for EngineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CounterSnapshot {
    pub effects_registered: u64,
    pub effects_unregistered: u64,
    pub update_passes: u64,
    pub effects_completed: u64,
    pub entities_swept: u64,
    pub saves: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub arousal_heals: u64,
    pub corrupted_groups: u64,
}

impl CounterSnapshot {
    fn rows(&self) -> [(&'static str, &'static str, u64); 10] {
        [
            ("effects_registered", "Effect names bound", self.effects_registered),
            ("effects_unregistered", "Effect names unbound", self.effects_unregistered),
            ("update_passes", "Entity update passes", self.update_passes),
            ("effects_completed", "Laws run to completion", self.effects_completed),
            ("entities_swept", "Entity states swept", self.entities_swept),
            ("saves", "Save records written", self.saves),
            ("loads", "Save records loaded", self.loads),
            ("load_failures", "Failed loads", self.load_failures),
            ("arousal_heals", "Arousal values repaired on load", self.arousal_heals),
            ("corrupted_groups", "Group values reset on load", self.corrupted_groups),
        ]
    }

    /// Format as Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in self.rows() {
            out.push_str(&format!(
                "# HELP slam_{name}_total {help}\n\
                 # TYPE slam_{name}_total counter\n\
                 slam_{name}_total {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Update timer
// ---------------------------------------------------------------------------

const HISTORY_LEN: usize = 256;

/// Ring buffer of recent update-pass durations.
#[derive(Debug)]
pub struct UpdateTimer {
    history: Mutex<TimerHistory>,
}

#[derive(Debug)]
struct TimerHistory {
    timings_us: Vec<f64>,
    write_idx: usize,
    count: u64,
}

/// Percentiles over the recorded history, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimerPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// Slowest recorded pass.
    pub max: f64,
}

impl UpdateTimer {
    /// Empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Mutex::new(TimerHistory {
                timings_us: vec![0.0; HISTORY_LEN],
                write_idx: 0,
                count: 0,
            }),
        }
    }

    /// Start timing; the elapsed time is recorded when the guard drops.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            start: Instant::now(),
        }
    }

    /// Record one duration in microseconds.
    pub fn record(&self, us: f64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings_us[idx] = us;
        h.write_idx = (idx + 1) % HISTORY_LEN;
        h.count += 1;
    }

    /// Passes recorded since creation.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.history.lock().count
    }

    /// Percentiles over the retained history.
    #[must_use]
    pub fn percentiles(&self) -> TimerPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).map_or(HISTORY_LEN, |c| c.min(HISTORY_LEN));
        if n == 0 {
            return TimerPercentiles::default();
        }
        let mut sorted = h.timings_us[..n].to_vec();
        sorted.sort_by(f64::total_cmp);
        TimerPercentiles {
            p50: sorted[n / 2],
            p95: sorted[(n * 95 / 100).min(n - 1)],
            max: sorted[n - 1],
        }
    }
}

impl Default for UpdateTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Records elapsed time into its [`UpdateTimer`] on drop.
pub struct TimerGuard<'a> {
    timer: &'a UpdateTimer,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed().as_secs_f64() * 1_000_000.0);
    }
}

// ---------------------------------------------------------------------------
// Span names
// ---------------------------------------------------------------------------

/// Names for `tracing` spans around the heavier operations.
pub mod spans {
    /// One entity update pass.
    pub const ADVANCE: &str = "slam::advance";
    /// Registry fan-out to every entity.
    pub const FAN_OUT: &str = "slam::registry::fan_out";
    /// Record encode.
    pub const SAVE: &str = "slam::persist::save";
    /// Record decode.
    pub const LOAD: &str = "slam::persist::load";
    /// Stale state sweep.
    pub const SWEEP: &str = "slam::sweep";
}
