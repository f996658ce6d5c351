//! Recompilation types.
//!
//! Configuration, counters and the timing report shared by the compiler
//! thread and the execution-thread handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Configuration for the background recompilation pipeline.
#[derive(Debug, Clone)]
pub struct RecompileConfig {
    /// Run optimizing compiles on a dedicated thread. When false, jobs are
    /// compiled inline on the execution thread as soon as they are queued.
    pub concurrent_recompilation: bool,
    /// Artificial delay the compiler thread sleeps after every wake-up.
    /// Diagnostic only: it widens race windows and makes `stop()` drain the
    /// leftover queue synchronously.
    pub recompile_delay: Option<Duration>,
    /// Measure compile/idle time on the compiler thread and report the
    /// useful-work percentage on stop.
    pub trace_recompilation: bool,
    /// Maximum number of jobs waiting in the input queue.
    pub queue_capacity: usize,
}

impl RecompileConfig {
    /// Whether the diagnostic delay is active.
    pub fn has_recompile_delay(&self) -> bool {
        self.recompile_delay.is_some_and(|delay| !delay.is_zero())
    }
}

impl Default for RecompileConfig {
    fn default() -> Self {
        Self {
            concurrent_recompilation: true,
            recompile_delay: None,
            trace_recompilation: false,
            queue_capacity: 8,
        }
    }
}

/// Atomic counters for recompilation events.
///
/// Advisory only: nothing in the protocol reads these to make a decision.
#[derive(Debug)]
pub struct RecompileMetrics {
    /// Jobs accepted into the input queue.
    pub queued: AtomicU64,
    /// Jobs compiled and published to the output queue.
    pub compiled: AtomicU64,
    /// Jobs whose code was installed.
    pub installed: AtomicU64,
    /// Jobs refused because the input queue was full.
    pub rejected: AtomicU64,
    /// Install passes that stopped at a published but not yet ready job.
    pub deferred_installs: AtomicU64,
}

impl RecompileMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            queued: AtomicU64::new(0),
            compiled: AtomicU64::new(0),
            installed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            deferred_installs: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> RecompileStats {
        RecompileStats {
            queued: self.queued.load(Ordering::Relaxed),
            compiled: self.compiled.load(Ordering::Relaxed),
            installed: self.installed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            deferred_installs: self.deferred_installs.load(Ordering::Relaxed),
        }
    }
}

impl Default for RecompileMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RecompileMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecompileStats {
    /// Jobs accepted into the input queue.
    pub queued: u64,
    /// Jobs compiled and published to the output queue.
    pub compiled: u64,
    /// Jobs whose code was installed.
    pub installed: u64,
    /// Jobs refused because the input queue was full.
    pub rejected: u64,
    /// Install passes that stopped at a published but not yet ready job.
    pub deferred_installs: u64,
}

/// Time the compiler thread spent compiling versus alive.
///
/// Only filled in when `trace_recompilation` is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerTimings {
    /// Sum of time spent inside compile steps.
    pub compiling: Duration,
    /// Lifetime of the compiler loop, from start to stop acknowledgement.
    pub total: Duration,
}

impl CompilerTimings {
    /// Percentage of the thread's lifetime spent compiling.
    ///
    /// Returns `None` when no lifetime was recorded.
    pub fn useful_work_percentage(&self) -> Option<f64> {
        if self.total.is_zero() {
            return None;
        }
        let ratio = self.compiling.as_secs_f64() / self.total.as_secs_f64();
        Some(ratio * 100.0)
    }
}

/// Summary returned by `Recompiler::stop`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopReport {
    /// Compiler thread timings (zero unless tracing was on).
    pub timings: CompilerTimings,
    /// Jobs compiled on the execution thread by the delayed-stop drain.
    pub drained: usize,
    /// Counter snapshot taken after the drain.
    pub stats: RecompileStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = RecompileMetrics::new();
        RecompileMetrics::bump(&metrics.queued);
        RecompileMetrics::bump(&metrics.queued);
        RecompileMetrics::bump(&metrics.installed);

        let stats = metrics.snapshot();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.installed, 1);
        assert_eq!(stats.compiled, 0);
    }

    #[test]
    fn test_useful_work_percentage() {
        let timings = CompilerTimings {
            compiling: Duration::from_millis(25),
            total: Duration::from_millis(100),
        };
        let pct = timings.useful_work_percentage().unwrap_or_default();
        assert!((pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_useful_work_without_lifetime() {
        assert_eq!(CompilerTimings::default().useful_work_percentage(), None);
    }

    #[test]
    fn test_zero_delay_is_not_a_delay() {
        let config = RecompileConfig {
            recompile_delay: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(!config.has_recompile_delay());
        assert!(RecompileConfig::default().concurrent_recompilation);
    }
}
