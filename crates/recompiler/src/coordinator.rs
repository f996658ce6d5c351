//! Execution-thread side of background recompilation.
//!
//! [`Recompiler`] is the only handle that can queue jobs, install finished
//! code and stop the compiler thread. The compiler thread never sees it: it
//! owns a separate `CompilerWorker`. Install and queue therefore cannot run
//! on the compiler thread, and because [`Recompiler::stop`] consumes the
//! handle, queueing during or after a stop does not type-check.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, info, warn};

use crate::compiler_thread::{CompilerWorker, OptimizingCompiler, RecompileShared};
use crate::error::RecompileError;
use crate::function::{OptimizableFunction, RecompileState};
use crate::heap::HeapRelocation;
use crate::job::RecompileJob;
use crate::types::{RecompileConfig, RecompileMetrics, RecompileStats, StopReport};

/// Where compile steps run.
enum WorkerSlot<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    /// On the dedicated compiler thread.
    Background {
        handle: JoinHandle<CompilerWorker<F, C, H>>,
        thread_id: ThreadId,
    },
    /// Inline on the execution thread, right after each queue call.
    Inline(CompilerWorker<F, C, H>),
}

/// Execution-thread handle of the recompilation pipeline.
pub struct Recompiler<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    shared: Arc<RecompileShared<F>>,
    /// `None` once stopped.
    worker: Option<WorkerSlot<F, C, H>>,
    config: RecompileConfig,
}

impl<F, C, H> Recompiler<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    /// Start the pipeline.
    ///
    /// With `concurrent_recompilation` on, this spawns the compiler thread.
    /// Otherwise compile steps run inline inside `queue_for_optimization`.
    pub fn start(config: RecompileConfig, compiler: C, heap: Arc<H>) -> Result<Self, RecompileError> {
        let shared = Arc::new(RecompileShared::new());
        let worker = CompilerWorker::new(Arc::clone(&shared), compiler, heap, &config);

        let slot = if config.concurrent_recompilation {
            let handle = worker.spawn()?;
            let thread_id = handle.thread().id();
            WorkerSlot::Background { handle, thread_id }
        } else {
            info!("Concurrent recompilation disabled, compiling inline");
            WorkerSlot::Inline(worker)
        };

        Ok(Self {
            shared,
            worker: Some(slot),
            config,
        })
    }

    pub fn config(&self) -> &RecompileConfig {
        &self.config
    }

    /// Number of jobs queued and not yet picked up by a compile step.
    ///
    /// Advisory: it can be stale by the time the caller reads it.
    pub fn queue_length(&self) -> usize {
        self.shared.queue_length.load(Ordering::Acquire)
    }

    /// Whether another job fits in the input queue.
    pub fn is_queue_available(&self) -> bool {
        self.queue_length() < self.config.queue_capacity
    }

    /// Number of compiled jobs waiting in the output queue.
    pub fn output_len(&self) -> usize {
        self.shared.output.len()
    }

    pub fn stats(&self) -> RecompileStats {
        self.shared.metrics.snapshot()
    }

    /// Queue `function` for optimizing compilation. Never blocks when the
    /// compiler thread is running.
    ///
    /// The caller must already have marked the function with
    /// [`RecompileMarker::mark_for_recompile`](crate::RecompileMarker::mark_for_recompile).
    /// If the input queue is full the marker is reset to `Idle` and
    /// `QueueFull` is returned; the function keeps running unoptimized.
    pub fn queue_for_optimization(&mut self, function: Arc<F>) -> Result<(), RecompileError> {
        self.check_worker()?;
        debug_assert!(!self.is_compiler_thread());
        debug_assert!(!self.shared.stop_thread.load(Ordering::Acquire));
        debug_assert!(
            function.recompile_marker().is_in_recompile_queue(),
            "`{}` queued without being marked for recompilation",
            function.name()
        );

        if !self.is_queue_available() {
            function.recompile_marker().reset();
            RecompileMetrics::bump(&self.shared.metrics.rejected);
            warn!(
                function = function.name(),
                capacity = self.config.queue_capacity,
                "Recompile queue full, job rejected"
            );
            return Err(RecompileError::QueueFull {
                capacity: self.config.queue_capacity,
            });
        }

        self.shared.queue_length.fetch_add(1, Ordering::AcqRel);
        debug!(function = function.name(), "Function queued for optimization");
        self.shared.input.enqueue(RecompileJob::new(function));
        RecompileMetrics::bump(&self.shared.metrics.queued);

        if let Some(WorkerSlot::Inline(worker)) = self.worker.as_mut()
            && let Err(err) = worker.compile_next()
        {
            let _ = self.shared.failure.set(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Install every job at the front of the output queue whose function is
    /// ready, stopping at the first one that is not. Never blocks.
    ///
    /// Returns the number of functions installed by this pass.
    pub fn install_optimized_functions(&mut self) -> Result<usize, RecompileError> {
        self.check_worker()?;
        debug_assert!(!self.is_compiler_thread());
        Ok(self.shared.install_optimized_functions())
    }

    /// Stop the compiler thread and wait for it to exit.
    ///
    /// A job already being compiled finishes first; queued jobs are left
    /// alone, unless the diagnostic delay is configured, in which case they
    /// are compiled and installed on this thread before returning.
    pub fn stop(mut self) -> Result<StopReport, RecompileError> {
        debug_assert!(!self.is_compiler_thread());
        let Some(slot) = self.worker.take() else {
            return Err(RecompileError::WorkerPanicked);
        };

        let mut worker = self.shared.stop_and_join(slot)?;
        self.shared.check_failure()?;

        let mut drained = 0usize;
        if self.config.has_recompile_delay() {
            // The delay can leave jobs behind when the thread stopped first.
            // Finish them here so diagnostic runs are deterministic.
            self.shared.install_optimized_functions();
            while self.shared.queue_length.load(Ordering::Acquire) > 0 {
                worker.compile_next()?;
                drained = drained.saturating_add(1);
                self.shared.install_optimized_functions();
            }
        }

        let timings = worker.timings();
        if self.config.trace_recompilation
            && let Some(percentage) = timings.useful_work_percentage()
        {
            info!(
                compiling_ms = timings.compiling.as_millis(),
                total_ms = timings.total.as_millis(),
                "Compiler thread did {percentage:.2}% useful work"
            );
        }

        Ok(StopReport {
            timings,
            drained,
            stats: self.shared.metrics.snapshot(),
        })
    }

    /// Report a recorded compile failure, or a compiler thread that exited
    /// on its own. The thread only leaves its loop on stop or on a recorded
    /// failure, so finishing without either means it panicked.
    fn check_worker(&self) -> Result<(), RecompileError> {
        self.shared.check_failure()?;
        match self.worker.as_ref() {
            Some(WorkerSlot::Background { handle, .. }) if handle.is_finished() => {
                // The failure may have been recorded just before the exit.
                self.shared.check_failure()?;
                Err(RecompileError::WorkerPanicked)
            }
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<RecompileShared<F>> {
        &self.shared
    }

    fn is_compiler_thread(&self) -> bool {
        match self.worker.as_ref() {
            Some(WorkerSlot::Background { thread_id, .. }) => *thread_id == thread::current().id(),
            _ => false,
        }
    }
}

impl<F, C, H> Drop for Recompiler<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    fn drop(&mut self) {
        let Some(slot) = self.worker.take() else {
            return;
        };
        // Log instead of re-panicking: a panic during drop aborts.
        if let Err(err) = self.shared.stop_and_join(slot) {
            tracing::error!(%err, "Optimizing compiler thread did not stop cleanly");
        }
    }
}

impl<F, C, H> std::fmt::Debug for Recompiler<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recompiler")
            .field("running", &self.worker.is_some())
            .field("queue_length", &self.queue_length())
            .field("output_len", &self.output_len())
            .finish()
    }
}

impl<F: OptimizableFunction> RecompileShared<F> {
    /// Set the stop flag, wake the compiler thread once and wait for it to
    /// acknowledge by exiting.
    fn stop_and_join<C, H>(
        &self,
        slot: WorkerSlot<F, C, H>,
    ) -> Result<CompilerWorker<F, C, H>, RecompileError>
    where
        C: OptimizingCompiler<F>,
        H: HeapRelocation,
    {
        self.stop_thread.store(true, Ordering::Release);
        match slot {
            WorkerSlot::Background { handle, .. } => {
                self.input.wake();
                handle.join().map_err(|_| RecompileError::WorkerPanicked)
            }
            WorkerSlot::Inline(worker) => Ok(worker),
        }
    }

    /// Drain the ready prefix of the output queue.
    pub(crate) fn install_optimized_functions(&self) -> usize {
        let mut installed = 0usize;

        while let Some(ready) = self.output.peek(RecompileJob::is_ready_to_install) {
            if !ready {
                // Published but not yet flipped. Everything behind it was
                // published later, so stop here rather than skip past it.
                RecompileMetrics::bump(&self.metrics.deferred_installs);
                break;
            }

            // Only this thread dequeues, so the front is still the job we
            // just checked.
            let Some(mut job) = self.output.dequeue() else {
                break;
            };
            let function = Arc::clone(job.function());
            // Published jobs always carry code.
            let Some(code) = job.take_code() else {
                continue;
            };

            function.install_code(code);
            let previous = function.recompile_marker().reset();
            debug_assert_eq!(
                previous,
                RecompileState::ReadyToInstall,
                "`{}` installed twice",
                function.name()
            );

            RecompileMetrics::bump(&self.metrics.installed);
            debug!(function = function.name(), "Optimized code installed");
            installed = installed.saturating_add(1);
        }

        installed
    }
}
