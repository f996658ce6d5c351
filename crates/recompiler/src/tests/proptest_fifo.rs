//! Property-based tests for install ordering.
//!
//! Random interleavings of queue and install calls against a live compiler
//! thread must install every accepted function exactly once, in queue order.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use rustc_hash::FxHashSet;

use super::test_helpers::{InstallLog, TestCompiler, TestFunction};
use crate::function::OptimizableFunction;
use crate::heap::RelocationLock;
use crate::{RecompileConfig, RecompileError, Recompiler};

#[derive(Debug, Clone, Copy)]
enum Op {
    Queue,
    Install,
    Yield,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            3 => Just(Op::Queue),
            2 => Just(Op::Install),
            1 => Just(Op::Yield),
        ],
        1..48,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the interleaving, a delayed stop installs everything that was
    /// accepted, each once, in the order it was queued.
    #[test]
    fn installs_follow_queue_order(ops in arb_ops(), concurrent in any::<bool>()) {
        let config = RecompileConfig {
            concurrent_recompilation: concurrent,
            recompile_delay: Some(Duration::from_micros(200)),
            queue_capacity: 4,
            ..Default::default()
        };
        let mut recompiler =
            Recompiler::start(config, TestCompiler::default(), Arc::new(RelocationLock::new()))
                .unwrap();

        let log = InstallLog::default();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Queue => {
                    let function = TestFunction::logged(&format!("f{i}"), &log);
                    match recompiler.queue_for_optimization(Arc::clone(&function)) {
                        Ok(()) => accepted.push(function),
                        Err(RecompileError::QueueFull { .. }) => rejected.push(function),
                        Err(err) => prop_assert!(false, "unexpected error: {err}"),
                    }
                }
                Op::Install => {
                    recompiler.install_optimized_functions().unwrap();
                }
                Op::Yield => thread::yield_now(),
            }
        }

        let report = recompiler.stop().unwrap();

        let expected: Vec<_> = accepted.iter().map(|f| f.name().to_string()).collect();
        prop_assert_eq!(&*log.lock().unwrap(), &expected);

        let unique: FxHashSet<_> = expected.iter().collect();
        prop_assert_eq!(unique.len(), expected.len());
        for function in &accepted {
            prop_assert_eq!(function.install_count(), 1);
        }
        for function in &rejected {
            prop_assert_eq!(function.install_count(), 0);
        }
        prop_assert_eq!(report.stats.rejected, u64::try_from(rejected.len()).unwrap());
    }
}
