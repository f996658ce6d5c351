//! Synthetic workload: an interpreter loop calling functions round-robin,
//! queueing hot ones for optimization and installing them as they finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use recompiler::{
    OptimizableFunction, OptimizingCompiler, RecompileError, RecompileMarker, RecompileState,
    Recompiler, RelocationLock, StopReport,
};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::cli::Options;

/// Optimized code produced for a [`SimFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCode {
    pub generation: u64,
}

#[derive(Debug)]
pub struct SimFunction {
    name: String,
    marker: RecompileMarker,
    calls: AtomicU64,
    optimized: AtomicBool,
}

impl SimFunction {
    pub fn new(name: String) -> Self {
        Self {
            name,
            marker: RecompileMarker::new(),
            calls: AtomicU64::new(0),
            optimized: AtomicBool::new(false),
        }
    }

    /// Record one call and return the call count including it.
    fn call(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized.load(Ordering::Acquire)
    }
}

impl OptimizableFunction for SimFunction {
    type Code = SimCode;

    fn name(&self) -> &str {
        &self.name
    }

    fn recompile_marker(&self) -> &RecompileMarker {
        &self.marker
    }

    fn install_code(&self, code: SimCode) {
        debug!(function = %self.name, generation = code.generation, "Switched to optimized code");
        self.optimized.store(true, Ordering::Release);
    }
}

/// Compiler stand-in that burns a fixed amount of time per function.
#[derive(Debug)]
pub struct SimCompiler {
    cost: Duration,
    generation: u64,
}

impl SimCompiler {
    pub fn new(cost: Duration) -> Self {
        Self { cost, generation: 0 }
    }
}

impl OptimizingCompiler<SimFunction> for SimCompiler {
    fn optimize(&mut self, _function: &SimFunction) -> Result<SimCode, String> {
        if !self.cost.is_zero() {
            thread::sleep(self.cost);
        }
        self.generation = self.generation.saturating_add(1);
        Ok(SimCode {
            generation: self.generation,
        })
    }
}

#[derive(Debug)]
pub struct SimSummary {
    pub functions: usize,
    pub optimized: usize,
    /// Calls that ran already-optimized code.
    pub optimized_calls: u64,
    /// Times a hot function could not be queued because the queue was full.
    pub skipped: u64,
    /// Calls between queueing a function and seeing it installed, for every
    /// install observed before stop.
    pub install_latencies: Vec<u64>,
    pub report: StopReport,
}

impl SimSummary {
    /// Mean queue-to-install latency in calls.
    pub fn mean_install_latency(&self) -> Option<u64> {
        let count = u64::try_from(self.install_latencies.len()).ok()?;
        self.install_latencies.iter().sum::<u64>().checked_div(count)
    }
}

/// Run the workload described by `opts` to completion.
pub fn run(opts: &Options) -> eyre::Result<SimSummary> {
    eyre::ensure!(opts.functions > 0, "--functions must be at least 1");

    let functions: Vec<Arc<SimFunction>> = (0..opts.functions)
        .map(|i| Arc::new(SimFunction::new(format!("fn_{i}"))))
        .collect();
    let heap = Arc::new(RelocationLock::new());
    let mut recompiler = Recompiler::start(
        opts.recompile_config(),
        SimCompiler::new(opts.compile_cost()),
        Arc::clone(&heap),
    )?;
    info!(
        functions = opts.functions,
        calls = opts.calls,
        hot_threshold = opts.hot_threshold,
        concurrent = recompiler.config().concurrent_recompilation,
        "Starting simulation"
    );

    let mut cursor = 0usize;
    let mut optimized_calls = 0u64;
    let mut skipped = 0u64;
    // Function index -> call number it was queued at.
    let mut queued_at: FxHashMap<usize, u64> = FxHashMap::default();
    let mut install_latencies = Vec::new();

    for call in 1..=opts.calls {
        let index = cursor;
        cursor = cursor.saturating_add(1) % opts.functions;
        let Some(function) = functions.get(index) else {
            continue;
        };

        let count = function.call();
        if function.is_optimized() {
            optimized_calls = optimized_calls.saturating_add(1);
        } else if count >= opts.hot_threshold
            && function.recompile_marker().state() == RecompileState::Idle
        {
            if recompiler.is_queue_available() && function.recompile_marker().mark_for_recompile()
            {
                match recompiler.queue_for_optimization(Arc::clone(function)) {
                    Ok(()) => {
                        queued_at.insert(index, call);
                    }
                    Err(RecompileError::QueueFull { .. }) => skipped = skipped.saturating_add(1),
                    Err(err) => return Err(err.into()),
                }
            } else {
                skipped = skipped.saturating_add(1);
            }
        }

        if opts.install_interval > 0
            && call % opts.install_interval == 0
            && recompiler.install_optimized_functions()? > 0
        {
            queued_at.retain(|&index, queued_call| {
                let installed = functions.get(index).is_some_and(|f| f.is_optimized());
                if installed {
                    install_latencies.push(call.saturating_sub(*queued_call));
                }
                !installed
            });
        }

        if opts.compact_interval > 0 && call % opts.compact_interval == 0 {
            let _compaction = heap.lock();
            debug!(call, "Heap compaction");
        }
    }

    let report = recompiler.stop()?;

    let optimized = functions.iter().filter(|f| f.is_optimized()).count();
    let summary = SimSummary {
        functions: opts.functions,
        optimized,
        optimized_calls,
        skipped,
        install_latencies,
        report,
    };

    info!(
        optimized = summary.optimized,
        functions = summary.functions,
        mean_install_latency = summary.mean_install_latency(),
        max_install_latency = summary.install_latencies.iter().max(),
        optimized_calls = summary.optimized_calls,
        skipped = summary.skipped,
        drained = summary.report.drained,
        "Simulation finished"
    );
    let stats = summary.report.stats;
    info!(
        queued = stats.queued,
        compiled = stats.compiled,
        installed = stats.installed,
        rejected = stats.rejected,
        deferred_installs = stats.deferred_installs,
        "Recompiler stats"
    );

    Ok(summary)
}
