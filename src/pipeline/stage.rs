//! Stage: a task replicated across N worker threads.
//!
//! Each worker runs, until the run's cancellation signal fires:
//! 1. Pop one item into its cell for every input port (registry order).
//! 2. Execute its task replica.
//! 3. Push its cell for every output port (registry order).
//!
//! A pop/push that cannot complete is retried with the stage's
//! [`WaitStrategy`], re-checking cancellation between attempts. On exit a
//! worker stops all of the stage's output buffers, then all input buffers,
//! which releases peers still retrying against them.

use crate::config::{StageConfig, WaitStrategy};
use crate::error::{StageError, StageResult};
use crate::pipeline::buffer::TransferStatus;
use crate::pipeline::port::{DataType, PortDirection};
use crate::pipeline::registry::PortRegistry;
use crate::pipeline::signal::CancellationSignal;
use crate::pipeline::task::{ExecControl, Task, TaskIo};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-worker counters updated by the worker threads.
#[derive(Debug)]
struct WorkerCounters {
    cycles: Box<[AtomicU64]>,
    exec_failures: AtomicU64,
}

impl WorkerCounters {
    fn new(n_threads: usize) -> Self {
        Self {
            cycles: (0..n_threads).map(|_| AtomicU64::new(0)).collect(),
            exec_failures: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> StageStats {
        StageStats {
            cycles_per_worker: self
                .cycles
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            exec_failures: self.exec_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a stage's execution counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Completed `exec` calls, indexed by worker.
    pub cycles_per_worker: Vec<u64>,
    /// `exec` calls that returned an error.
    pub exec_failures: u64,
}

impl StageStats {
    pub fn total_cycles(&self) -> u64 {
        self.cycles_per_worker.iter().sum()
    }
}

/// Live worker threads of one run. Each thread owns its replica and hands it
/// back when joined.
struct WorkerPool {
    signal: CancellationSignal,
    handles: Vec<JoinHandle<Box<dyn Task>>>,
}

/// A task replicated across `n_threads` workers, with one buffer per port.
pub struct Stage {
    name: String,
    config: StageConfig,
    template: Box<dyn Task>,
    replicas: Vec<Box<dyn Task>>,
    pub(crate) ports: Arc<PortRegistry>,
    counters: Arc<WorkerCounters>,
    pool: Option<WorkerPool>,
    /// Set by `run`, cleared by `reset`.
    needs_reset: bool,
}

impl Stage {
    /// Build a stage with the default wait strategy.
    pub fn new<T: Task + ?Sized>(task: &T, buffer_size: usize, n_threads: usize) -> StageResult<Self> {
        Self::with_config(task, StageConfig::new(buffer_size, n_threads))
    }

    /// Build a stage from a validated [`StageConfig`].
    pub fn with_config<T: Task + ?Sized>(task: &T, config: StageConfig) -> StageResult<Self> {
        config.validate()?;

        let name = task.name().to_string();
        let mut template = task.replicate();
        template.set_control(ExecControl::MANUAL);

        let replicas = (0..config.n_threads)
            .map(|_| template.replicate())
            .collect();
        let ports = PortRegistry::build(&name, task.ports(), config.buffer_size, config.n_threads)?;

        tracing::debug!(
            "Stage '{}' built: {} worker(s), buffer size {}, {} port buffer(s)",
            name,
            config.n_threads,
            config.buffer_size,
            ports.len()
        );

        Ok(Self {
            name,
            config,
            template,
            replicas,
            ports: Arc::new(ports),
            counters: Arc::new(WorkerCounters::new(config.n_threads)),
            pool: None,
            needs_reset: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_threads(&self) -> usize {
        self.config.n_threads
    }

    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Replicas held by the stage. Zero while workers are live.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Input port names in registry order.
    pub fn input_ports(&self) -> Vec<&str> {
        self.ports.input_names().collect()
    }

    /// Output port names in registry order.
    pub fn output_ports(&self) -> Vec<&str> {
        self.ports.output_names().collect()
    }

    pub fn port_type(&self, direction: PortDirection, name: &str) -> StageResult<DataType> {
        Ok(self.ports.get(direction, name)?.data_type())
    }

    /// Whether the given port shares its queue with another buffer.
    pub fn is_port_bound(&self, direction: PortDirection, name: &str) -> StageResult<bool> {
        Ok(self.ports.get(direction, name)?.is_bound())
    }

    /// Items currently queued behind the given port.
    pub fn queued(&self, direction: PortDirection, name: &str) -> StageResult<usize> {
        Ok(self.ports.get(direction, name)?.len())
    }

    /// Whether workers were started and not yet joined.
    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    pub fn stats(&self) -> StageStats {
        self.counters.snapshot()
    }

    /// Spawn one worker thread per replica. Returns immediately.
    ///
    /// Workers stop every buffer of the stage on exit, so a stage that has
    /// already run must be [`reset`](Self::reset) first.
    pub fn run(&mut self, signal: &CancellationSignal) -> StageResult<()> {
        if self.pool.is_some() {
            return Err(StageError::Running(self.name.clone()));
        }
        if self.needs_reset {
            return Err(StageError::NotReset(self.name.clone()));
        }
        self.needs_reset = true;

        tracing::info!("Stage '{}' starting {} worker(s)", self.name, self.config.n_threads);

        let mut pool = WorkerPool {
            signal: signal.clone(),
            handles: Vec::with_capacity(self.config.n_threads),
        };
        let replicas = std::mem::take(&mut self.replicas);
        for (tid, mut task) in replicas.into_iter().enumerate() {
            let ports = Arc::clone(&self.ports);
            let counters = Arc::clone(&self.counters);
            let signal = signal.clone();
            let wait = self.config.wait;
            let stage = self.name.clone();

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.name, tid))
                .spawn(move || {
                    run_worker(&stage, tid, task.as_mut(), &ports, &counters, wait, &signal);
                    task
                });

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    tracing::error!("Stage '{}': failed to spawn worker {}: {}", self.name, tid, source);
                    self.pool = Some(pool);
                    return Err(StageError::Spawn {
                        stage: self.name.clone(),
                        tid,
                        source,
                    });
                }
            }
        }

        self.pool = Some(pool);
        Ok(())
    }

    /// Block until every worker has exited and take their replicas back.
    ///
    /// Call after the run's signal is cancelled; joining a live run blocks
    /// until someone cancels it. Joining a stage that is not running is a
    /// no-op.
    pub fn join(&mut self) -> StageResult<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };

        let mut panicked = 0;
        let mut replicas = Vec::with_capacity(self.config.n_threads);
        for (tid, handle) in pool.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(task) => replicas.push(task),
                Err(_) => {
                    tracing::error!("Stage '{}': worker {} panicked", self.name, tid);
                    panicked += 1;
                    replicas.push(self.template.replicate());
                }
            }
        }
        // Workers that never spawned lost their replica with the closure.
        while replicas.len() < self.config.n_threads {
            replicas.push(self.template.replicate());
        }
        self.replicas = replicas;

        tracing::info!("Stage '{}' joined", self.name);

        if panicked > 0 {
            return Err(StageError::WorkerPanicked {
                stage: self.name.clone(),
                count: panicked,
            });
        }
        Ok(())
    }

    /// Reset every buffer and restore fresh replicas so the next run starts
    /// from the same state as the first.
    pub fn reset(&mut self) -> StageResult<()> {
        if self.pool.is_some() {
            return Err(StageError::Running(self.name.clone()));
        }
        self.ports.reset_all();
        self.needs_reset = false;
        self.replicas = (0..self.config.n_threads)
            .map(|_| self.template.replicate())
            .collect();
        tracing::debug!("Stage '{}' reset", self.name);
        Ok(())
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            tracing::warn!(
                "Stage '{}' dropped with live workers; cancelling its run",
                self.name
            );
            pool.signal.cancel();
            let _ = self.join();
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("ports", &self.ports)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Retry `attempt` until it reports `Done` or the run is cancelled.
#[inline]
fn transfer(
    signal: &CancellationSignal,
    wait: WaitStrategy,
    mut attempt: impl FnMut() -> TransferStatus,
) {
    let mut retry = 0u32;
    while !signal.is_cancelled() {
        if attempt().is_done() {
            return;
        }
        wait.pause(retry);
        retry = retry.saturating_add(1);
    }
}

/// Stops every buffer of the stage when the worker exits, including by
/// unwinding out of a panicking `exec`.
struct StopOnExit<'a>(&'a PortRegistry);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.stop_all();
    }
}

fn run_worker(
    stage: &str,
    tid: usize,
    task: &mut dyn Task,
    ports: &PortRegistry,
    counters: &WorkerCounters,
    wait: WaitStrategy,
    signal: &CancellationSignal,
) {
    tracing::debug!("Stage '{}' worker {} started", stage, tid);
    let _stop = StopOnExit(ports);
    let mut io = TaskIo::new(tid, ports);

    while !signal.is_cancelled() {
        for buffer in ports.inputs() {
            transfer(signal, wait, || buffer.pop(tid));
        }

        if signal.is_cancelled() {
            break;
        }

        if let Err(e) = task.exec(&mut io) {
            counters.exec_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Stage '{}' worker {}: exec failed: {:#}", stage, tid, e);
        }
        counters.cycles[tid].fetch_add(1, Ordering::Relaxed);

        for buffer in ports.outputs() {
            transfer(signal, wait, || buffer.push(tid));
        }
    }

    tracing::debug!("Stage '{}' worker {} exiting", stage, tid);
}
