//! Background optimizing compiler thread.
//!
//! The compiler thread sleeps on the input queue's wake signal. Each wake-up
//! either means "one job was queued" or "stop": after waking (and after the
//! optional diagnostic delay) it checks the stop flag, and otherwise runs one
//! compile step:
//!
//! 1. take the heap relocation lock for the whole step;
//! 2. dequeue exactly one job and decrement the advisory queue length;
//! 3. run the optimizing compiler;
//! 4. enqueue the compiled job on the output queue;
//! 5. flip the function's marker to `ReadyToInstall`.
//!
//! Steps 4 and 5 must stay in that order. The execution thread may run an
//! install pass between them; it sees the published job at the front with
//! its marker still `InRecompileQueue` and leaves it alone.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::error::RecompileError;
use crate::function::OptimizableFunction;
use crate::heap::HeapRelocation;
use crate::job::RecompileJob;
use crate::queue::{InputQueue, WorkQueue};
use crate::types::{CompilerTimings, RecompileConfig, RecompileMetrics};

/// The optimizing compile step, opaque to the recompiler.
///
/// Jobs reaching the compiler were vetted before being queued, so an `Err`
/// here is treated as a fatal inconsistency rather than a recoverable miss.
pub trait OptimizingCompiler<F: OptimizableFunction>: Send + 'static {
    /// Build optimized code for `function`, or explain why it could not.
    fn optimize(&mut self, function: &F) -> Result<F::Code, String>;
}

impl<F, C> OptimizingCompiler<F> for C
where
    F: OptimizableFunction,
    C: FnMut(&F) -> Result<F::Code, String> + Send + 'static,
{
    fn optimize(&mut self, function: &F) -> Result<F::Code, String> {
        self(function)
    }
}

/// State shared by the execution thread and the compiler thread.
pub(crate) struct RecompileShared<F: OptimizableFunction> {
    pub(crate) input: InputQueue<RecompileJob<F>>,
    pub(crate) output: WorkQueue<RecompileJob<F>>,
    /// Release-stored by `stop`, acquire-loaded by the compiler loop.
    pub(crate) stop_thread: AtomicBool,
    /// Jobs queued but not yet dequeued by a compile step. Advisory: used by
    /// the delayed-stop drain and for diagnostics, never to decide whether a
    /// dequeue will succeed.
    pub(crate) queue_length: AtomicUsize,
    pub(crate) metrics: RecompileMetrics,
    /// First fatal error raised by a compile step.
    pub(crate) failure: OnceLock<RecompileError>,
}

impl<F: OptimizableFunction> RecompileShared<F> {
    pub(crate) fn new() -> Self {
        Self {
            input: InputQueue::new(),
            output: WorkQueue::new(),
            stop_thread: AtomicBool::new(false),
            queue_length: AtomicUsize::new(0),
            metrics: RecompileMetrics::new(),
            failure: OnceLock::new(),
        }
    }

    pub(crate) fn check_failure(&self) -> Result<(), RecompileError> {
        match self.failure.get() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Everything one compile step needs.
///
/// Owned by the compiler thread while it runs. The thread hands it back
/// through its join handle on exit so `stop` can keep compiling on the
/// execution thread.
pub(crate) struct CompilerWorker<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    shared: Arc<RecompileShared<F>>,
    compiler: C,
    heap: Arc<H>,
    recompile_delay: Option<Duration>,
    trace_recompilation: bool,
    timings: CompilerTimings,
}

impl<F, C, H> CompilerWorker<F, C, H>
where
    F: OptimizableFunction,
    C: OptimizingCompiler<F>,
    H: HeapRelocation,
{
    pub(crate) fn new(
        shared: Arc<RecompileShared<F>>,
        compiler: C,
        heap: Arc<H>,
        config: &RecompileConfig,
    ) -> Self {
        Self {
            shared,
            compiler,
            heap,
            recompile_delay: config.recompile_delay.filter(|delay| !delay.is_zero()),
            trace_recompilation: config.trace_recompilation,
            timings: CompilerTimings::default(),
        }
    }

    pub(crate) fn timings(&self) -> CompilerTimings {
        self.timings
    }

    /// Spawn the compiler thread.
    pub(crate) fn spawn(self) -> Result<thread::JoinHandle<Self>, RecompileError> {
        thread::Builder::new()
            .name("optimizing-compiler".to_string())
            .spawn(move || self.run())
            .map_err(|err| RecompileError::Spawn(err.to_string()))
    }

    /// Compiler thread body. Returns when the stop flag is observed or a
    /// compile step fails.
    fn run(mut self) -> Self {
        let epoch = self.trace_recompilation.then(Instant::now);
        info!("Optimizing compiler thread started");

        loop {
            self.shared.input.wait();

            if let Some(delay) = self.recompile_delay {
                thread::sleep(delay);
            }

            if self.shared.stop_thread.load(Ordering::Acquire) {
                if let Some(epoch) = epoch {
                    self.timings.total = epoch.elapsed();
                }
                info!(
                    queued = self.shared.queue_length.load(Ordering::Relaxed),
                    "Optimizing compiler thread stopped"
                );
                return self;
            }

            let compiling_start = self.trace_recompilation.then(Instant::now);

            if let Err(err) = self.compile_next() {
                error!(%err, "Optimizing compiler thread hit a fatal inconsistency");
                // Only the first failure is kept; the loop exits right after.
                let _ = self.shared.failure.set(err);
                if let Some(epoch) = epoch {
                    self.timings.total = epoch.elapsed();
                }
                return self;
            }

            if let Some(start) = compiling_start {
                self.timings.compiling = self.timings.compiling.saturating_add(start.elapsed());
            }
        }
    }

    /// Run one compile step: dequeue, optimize, publish, then mark ready.
    pub(crate) fn compile_next(&mut self) -> Result<(), RecompileError> {
        let _relocation = self.heap.relocation_lock();

        let mut job = self
            .shared
            .input
            .try_dequeue()
            .ok_or(RecompileError::InputQueueEmpty)?;
        self.shared.queue_length.fetch_sub(1, Ordering::AcqRel);

        let function = Arc::clone(job.function());
        debug_assert!(
            function.recompile_marker().is_in_recompile_queue(),
            "dequeued `{}` is not marked for recompilation",
            function.name()
        );

        job.begin_compiling();
        let code = self
            .compiler
            .optimize(&function)
            .map_err(|reason| RecompileError::CompilationFailed {
                function: function.name().to_owned(),
                reason,
            })?;
        job.publish(code);

        self.shared.output.enqueue(job);
        // An install pass running right here sees the job at the front of
        // the output queue with the marker still InRecompileQueue, and stops.
        function.recompile_marker().mark_ready_to_install();

        RecompileMetrics::bump(&self.shared.metrics.compiled);
        debug!(function = function.name(), "Optimized function published for install");
        Ok(())
    }
}
