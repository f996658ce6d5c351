//! Error types for the recompilation coordinator.

/// Errors surfaced to the execution thread.
///
/// `CompilationFailed` is a fatal inconsistency: jobs are vetted before they
/// are queued, so a failing optimizing compile means the vetting upstream is
/// broken. Once the compiler thread records it, every later call on the
/// coordinator returns it again; it is never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecompileError {
    /// The optimizing compiler rejected a job that was already vetted.
    #[error("optimizing compile of `{function}` failed: {reason}")]
    CompilationFailed {
        /// Name of the function whose compile failed.
        function: String,
        /// Message returned by the compiler.
        reason: String,
    },

    /// The input queue already holds `capacity` jobs.
    #[error("recompile queue is full ({capacity} jobs)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// A compile step ran with no job in the input queue.
    #[error("compile step found the input queue empty")]
    InputQueueEmpty,

    /// The compiler thread panicked.
    #[error("optimizing compiler thread panicked")]
    WorkerPanicked,

    /// The OS refused to spawn the compiler thread.
    #[error("failed to spawn optimizing compiler thread: {0}")]
    Spawn(String),
}
