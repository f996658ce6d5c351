//! Background optimizing recompilation.
//!
//! This crate coordinates an optimizing compiler running on a dedicated
//! thread with an execution thread that keeps running unoptimized code, and
//! hands the finished code back without stopping the execution thread.
//!
//! # Architecture
//!
//! ```text
//! execution thread                          compiler thread
//! ────────────────                          ───────────────
//! Recompiler::queue_for_optimization ──► input queue ──► CompilerWorker
//!                                                          │ relocation lock
//!                                                          │ optimize()
//! Recompiler::install_optimized_functions ◄── output queue ◄┘ then flip marker
//! Recompiler::stop ── stop flag + wake ──► loop exits, worker handed back
//! ```
//!
//! - `queue`: FIFO work queues and the counting wake signal
//! - `function`: the atomic [`RecompileMarker`] and [`OptimizableFunction`]
//! - `heap`: relocation exclusion held for each compile step
//! - `job`: [`RecompileJob`] and its lifecycle
//! - `compiler_thread`: the compiler loop and one compile step
//! - `coordinator`: [`Recompiler`]: queue, install, stop
//!
//! The one piece of cross-thread state outside the queues is the marker on
//! each function. The compiler thread publishes a job to the output queue
//! *before* flipping the marker to ready, and an install pass stops at the
//! first job whose marker has not flipped yet.

pub mod compiler_thread;
pub mod coordinator;
pub mod error;
pub mod function;
pub mod heap;
pub mod job;
pub mod queue;
pub mod types;

pub use compiler_thread::OptimizingCompiler;
pub use coordinator::Recompiler;
pub use error::RecompileError;
pub use function::{OptimizableFunction, RecompileMarker, RecompileState};
pub use heap::{HeapRelocation, RelocationLock};
pub use job::{JobPhase, RecompileJob};
pub use types::{CompilerTimings, RecompileConfig, RecompileMetrics, RecompileStats, StopReport};

#[cfg(test)]
mod tests;
