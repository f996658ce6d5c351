//! Function records as seen by the recompiler.
//!
//! The only state the execution thread and the compiler thread share
//! without a queue in between is the [`RecompileMarker`] on each function.
//! It is written with release and read with acquire ordering; the compiler
//! thread flips it to [`RecompileState::ReadyToInstall`] strictly after the
//! compiled job is visible in the output queue.

use std::sync::atomic::{AtomicU8, Ordering};

/// Where a function stands in the recompile pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecompileState {
    /// Not queued for optimization.
    Idle,
    /// Queued (or being compiled, or published but not yet flipped).
    InRecompileQueue,
    /// Optimized code is in the output queue and may be installed.
    ReadyToInstall,
}

impl RecompileState {
    const fn to_raw(self) -> u8 {
        match self {
            RecompileState::Idle => 0,
            RecompileState::InRecompileQueue => 1,
            RecompileState::ReadyToInstall => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => RecompileState::InRecompileQueue,
            2 => RecompileState::ReadyToInstall,
            _ => RecompileState::Idle,
        }
    }
}

/// Atomic eligibility marker stored on a function record.
#[derive(Debug)]
pub struct RecompileMarker {
    state: AtomicU8,
}

impl RecompileMarker {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(RecompileState::Idle.to_raw()),
        }
    }

    /// Current state, acquire load.
    pub fn state(&self) -> RecompileState {
        RecompileState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether the function is queued and its optimized code is not yet
    /// ready to install.
    pub fn is_in_recompile_queue(&self) -> bool {
        self.state() == RecompileState::InRecompileQueue
    }

    /// Move `Idle -> InRecompileQueue`.
    ///
    /// Returns `false` if the function was already somewhere in the
    /// pipeline. Callers must do this before `queue_for_optimization`.
    pub fn mark_for_recompile(&self) -> bool {
        self.state
            .compare_exchange(
                RecompileState::Idle.to_raw(),
                RecompileState::InRecompileQueue.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Release store of `ReadyToInstall`. Compiler side only, after publish.
    pub(crate) fn mark_ready_to_install(&self) {
        let previous = RecompileState::from_raw(
            self.state
                .swap(RecompileState::ReadyToInstall.to_raw(), Ordering::Release),
        );
        debug_assert_eq!(previous, RecompileState::InRecompileQueue);
    }

    /// Reset to `Idle`, returning the state it replaced.
    pub(crate) fn reset(&self) -> RecompileState {
        RecompileState::from_raw(
            self.state
                .swap(RecompileState::Idle.to_raw(), Ordering::AcqRel),
        )
    }
}

impl Default for RecompileMarker {
    fn default() -> Self {
        Self::new()
    }
}

/// A function record the recompiler can optimize.
///
/// Records are shared (`Arc`) with the rest of the runtime; the recompiler
/// never owns one exclusively.
pub trait OptimizableFunction: Send + Sync + 'static {
    /// Optimized code produced by the compiler and consumed by install.
    type Code: Send + 'static;

    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// The eligibility marker for this function.
    fn recompile_marker(&self) -> &RecompileMarker;

    /// Swap in optimized code. Only ever called on the execution thread.
    fn install_code(&self, code: Self::Code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_lifecycle() {
        let marker = RecompileMarker::new();
        assert_eq!(marker.state(), RecompileState::Idle);

        assert!(marker.mark_for_recompile());
        assert!(marker.is_in_recompile_queue());

        marker.mark_ready_to_install();
        assert_eq!(marker.state(), RecompileState::ReadyToInstall);
        assert!(!marker.is_in_recompile_queue());

        assert_eq!(marker.reset(), RecompileState::ReadyToInstall);
        assert_eq!(marker.state(), RecompileState::Idle);
    }

    #[test]
    fn test_double_mark_is_refused() {
        let marker = RecompileMarker::new();
        assert!(marker.mark_for_recompile());
        assert!(!marker.mark_for_recompile());

        marker.mark_ready_to_install();
        assert!(!marker.mark_for_recompile(), "ready functions stay out of the queue");
    }
}
