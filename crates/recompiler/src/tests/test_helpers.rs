//! Shared test helpers for recompiler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::compiler_thread::{OptimizingCompiler, RecompileShared};
use crate::function::{OptimizableFunction, RecompileMarker, RecompileState};
use crate::heap::HeapRelocation;
use crate::job::RecompileJob;
use crate::{RecompileError, Recompiler};

/// Names of installed functions, in install order.
pub type InstallLog = Arc<Mutex<Vec<String>>>;

/// Function record that remembers what was installed into it.
#[derive(Debug)]
pub struct TestFunction {
    name: String,
    marker: RecompileMarker,
    installed: Mutex<Option<u64>>,
    install_count: AtomicUsize,
    /// Marker state observed at the moment `install_code` ran.
    state_at_install: Mutex<Option<RecompileState>>,
    log: Option<InstallLog>,
}

impl TestFunction {
    fn build(name: &str, log: Option<InstallLog>) -> Arc<Self> {
        let function = Arc::new(Self {
            name: name.to_string(),
            marker: RecompileMarker::new(),
            installed: Mutex::new(None),
            install_count: AtomicUsize::new(0),
            state_at_install: Mutex::new(None),
            log,
        });
        assert!(function.marker.mark_for_recompile());
        function
    }

    /// A function already marked `InRecompileQueue`.
    pub fn queued(name: &str) -> Arc<Self> {
        Self::build(name, None)
    }

    /// Like [`TestFunction::queued`], appending to `log` on install.
    pub fn logged(name: &str, log: &InstallLog) -> Arc<Self> {
        Self::build(name, Some(Arc::clone(log)))
    }

    pub fn installed(&self) -> Option<u64> {
        *self.installed.lock().unwrap()
    }

    pub fn install_count(&self) -> usize {
        self.install_count.load(Ordering::SeqCst)
    }

    pub fn state_at_install(&self) -> Option<RecompileState> {
        *self.state_at_install.lock().unwrap()
    }
}

impl OptimizableFunction for TestFunction {
    type Code = u64;

    fn name(&self) -> &str {
        &self.name
    }

    fn recompile_marker(&self) -> &RecompileMarker {
        &self.marker
    }

    fn install_code(&self, code: u64) {
        *self.state_at_install.lock().unwrap() = Some(self.marker.state());
        *self.installed.lock().unwrap() = Some(code);
        self.install_count.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
    }
}

/// Compiler that numbers its outputs 1, 2, 3, ... and can be told to fail.
#[derive(Debug, Default)]
pub struct TestCompiler {
    compiled: u64,
    fail_on: Option<String>,
}

impl TestCompiler {
    pub fn failing_on(name: &str) -> Self {
        Self {
            compiled: 0,
            fail_on: Some(name.to_string()),
        }
    }
}

impl OptimizingCompiler<TestFunction> for TestCompiler {
    fn optimize(&mut self, function: &TestFunction) -> Result<u64, String> {
        if self.fail_on.as_deref() == Some(function.name()) {
            return Err("graph building bailed out".to_string());
        }
        self.compiled += 1;
        Ok(self.compiled)
    }
}

/// Compiler that reports each compile start and waits for a go-ahead.
pub struct GatedCompiler {
    pub started: Sender<String>,
    pub go: Receiver<()>,
}

impl OptimizingCompiler<TestFunction> for GatedCompiler {
    fn optimize(&mut self, function: &TestFunction) -> Result<u64, String> {
        self.started
            .send(function.name().to_string())
            .map_err(|e| e.to_string())?;
        self.go.recv().map_err(|e| e.to_string())?;
        Ok(1)
    }
}

/// Put a compiled job for `function` on the output queue without flipping
/// its marker, as if the compiler thread were paused between the two steps.
pub(crate) fn publish_unflipped(
    shared: &RecompileShared<TestFunction>,
    function: &Arc<TestFunction>,
    code: u64,
) {
    let mut job = RecompileJob::new(Arc::clone(function));
    job.begin_compiling();
    job.publish(code);
    shared.output.enqueue(job);
}

/// Poll `install_optimized_functions` until `expected` functions have been
/// installed in total, or panic after a timeout.
pub fn install_until<C, H>(
    recompiler: &mut Recompiler<TestFunction, C, H>,
    expected: usize,
) -> Result<usize, RecompileError>
where
    C: OptimizingCompiler<TestFunction>,
    H: HeapRelocation,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut installed = 0;
    while installed < expected {
        installed += recompiler.install_optimized_functions()?;
        assert!(
            Instant::now() < deadline,
            "timed out with {installed}/{expected} installed"
        );
        thread::sleep(Duration::from_millis(1));
    }
    Ok(installed)
}
