//! Recompile jobs.

use std::fmt;
use std::sync::Arc;

use crate::function::{OptimizableFunction, RecompileState};

/// Lifecycle of a job. Only moves forward.
///
/// "Eligible" is not a phase of its own: a `Published` job becomes eligible
/// when the compiler thread flips its function's marker, see
/// [`RecompileJob::is_ready_to_install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPhase {
    /// Waiting in the input queue.
    Queued,
    /// Owned by the compiler.
    Compiling,
    /// In the output queue with optimized code attached.
    Published,
    /// Code handed to the function record.
    Installed,
}

/// A function on its way through compile, publish and install.
///
/// A job lives in at most one queue at a time; moving it between queues
/// moves ownership with it.
pub struct RecompileJob<F: OptimizableFunction> {
    function: Arc<F>,
    code: Option<F::Code>,
    phase: JobPhase,
}

impl<F: OptimizableFunction> RecompileJob<F> {
    pub fn new(function: Arc<F>) -> Self {
        Self {
            function,
            code: None,
            phase: JobPhase::Queued,
        }
    }

    pub fn function(&self) -> &Arc<F> {
        &self.function
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Whether the compiler thread has flipped this job's function marker.
    pub fn is_ready_to_install(&self) -> bool {
        self.phase == JobPhase::Published
            && self.function.recompile_marker().state() == RecompileState::ReadyToInstall
    }

    pub(crate) fn begin_compiling(&mut self) {
        debug_assert_eq!(self.phase, JobPhase::Queued);
        self.phase = JobPhase::Compiling;
    }

    pub(crate) fn publish(&mut self, code: F::Code) {
        debug_assert_eq!(self.phase, JobPhase::Compiling);
        self.code = Some(code);
        self.phase = JobPhase::Published;
    }

    /// Take the optimized code out for installation.
    ///
    /// Returns `None` if the job was never published or was already
    /// installed.
    pub(crate) fn take_code(&mut self) -> Option<F::Code> {
        if self.phase != JobPhase::Published {
            return None;
        }
        let code = self.code.take()?;
        self.phase = JobPhase::Installed;
        Some(code)
    }
}

impl<F: OptimizableFunction> fmt::Debug for RecompileJob<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecompileJob")
            .field("function", &self.function.name())
            .field("phase", &self.phase)
            .field("has_code", &self.code.is_some())
            .finish()
    }
}
