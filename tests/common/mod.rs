//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod tasks;

use crossbeam_channel::RecvTimeoutError;
use stagepipe::Pipeline;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for anything that should finish "promptly"
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Route `tracing` output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stagepipe=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Poll `cond` every millisecond until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Cancel and join `pipeline` on a helper thread, failing the test if the
/// join does not complete within `timeout`.
pub fn shutdown_within(mut pipeline: Pipeline, timeout: Duration) -> Pipeline {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let result = pipeline.shutdown();
        let _ = tx.send((pipeline, result));
    });
    match rx.recv_timeout(timeout) {
        Ok((pipeline, result)) => {
            result.expect("Pipeline shutdown should succeed");
            pipeline
        }
        Err(RecvTimeoutError::Timeout) => panic!("Pipeline did not join within {:?}", timeout),
        Err(RecvTimeoutError::Disconnected) => panic!("Shutdown thread panicked"),
    }
}
