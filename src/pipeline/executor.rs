//! Pipeline driver: owns stages, wires them, and drives one run at a time.
//!
//! A run:
//! 1. `run()` creates a fresh cancellation signal and starts every stage.
//! 2. Workers stream data through the bound buffers.
//! 3. `cancel()` flips the signal; every worker leaves its loop within one
//!    retry and stops its buffers.
//! 4. `join()` reaps every worker thread.
//! 5. `reset()` (optional) clears buffers and replicas for the next run.

use crate::config::PipelineConfig;
use crate::error::{StageError, StageResult};
use crate::pipeline::buffer::BindStatus;
use crate::pipeline::id::StageId;
use crate::pipeline::signal::CancellationSignal;
use crate::pipeline::stage::{Stage, StageStats};
use crate::pipeline::task::Task;

/// A set of stages driven through a shared run lifecycle.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    /// Signal of the current run; `None` when idle.
    signal: Option<CancellationSignal>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Graph building ──

    /// Add a stage to the pipeline. Returns its StageId.
    pub fn add_stage(&mut self, stage: Stage) -> StageId {
        let id = StageId(self.stages.len() as u32);
        tracing::debug!("Pipeline: added stage '{}' as {}", stage.name(), id);
        self.stages.push(stage);
        id
    }

    /// Build a stage for `task` using the entry named after the task in
    /// `config`, and add it.
    pub fn add_configured<T: Task + ?Sized>(
        &mut self,
        task: &T,
        config: &PipelineConfig,
    ) -> StageResult<StageId> {
        let stage_config = *config.stage(task.name())?;
        let stage = Stage::with_config(task, stage_config)?;
        Ok(self.add_stage(stage))
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.index())
    }

    /// Id of the first stage called `name`.
    pub fn find(&self, name: &str) -> Option<StageId> {
        self.stages
            .iter()
            .position(|s| s.name() == name)
            .map(|idx| StageId(idx as u32))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Feed input port `input` of stage `to` from output port `output` of
    /// stage `from`. With `to == from` this is a feedback loop (see
    /// [`Stage::bind_loopback`]).
    pub fn bind(
        &mut self,
        to: StageId,
        input: &str,
        from: StageId,
        output: &str,
    ) -> StageResult<BindStatus> {
        let n = self.stages.len();
        if to.index() >= n || from.index() >= n {
            return Err(StageError::InvalidArgument(format!(
                "unknown stage id ({} or {}, {} stage(s))",
                to, from, n
            )));
        }
        if to == from {
            return self.stages[to.index()].bind_loopback(input, output);
        }

        let (dst, src) = if to.index() < from.index() {
            let (lo, hi) = self.stages.split_at_mut(from.index());
            (&mut lo[to.index()], &hi[0])
        } else {
            let (lo, hi) = self.stages.split_at_mut(to.index());
            (&mut hi[0], &lo[from.index()])
        };
        dst.bind(input, src, output)
    }

    // ── Lifecycle ──

    pub fn is_running(&self) -> bool {
        self.signal.is_some()
    }

    /// Start every stage under a fresh cancellation signal and return it.
    ///
    /// A pipeline that has run before must be [`reset`](Self::reset) first;
    /// otherwise the first stage fails with `NotReset`. If a stage fails to
    /// start, the run is cancelled and every stage joined before the error is
    /// returned.
    pub fn run(&mut self) -> StageResult<CancellationSignal> {
        if self.signal.is_some() {
            return Err(StageError::Running("pipeline".to_string()));
        }

        let signal = CancellationSignal::new();
        tracing::info!("Pipeline starting {} stage(s)", self.stages.len());

        for idx in 0..self.stages.len() {
            if let Err(e) = self.stages[idx].run(&signal) {
                signal.cancel();
                for stage in &mut self.stages {
                    let _ = stage.join();
                }
                return Err(e);
            }
        }

        self.signal = Some(signal.clone());
        Ok(signal)
    }

    /// Ask every worker of the current run to stop. No-op when idle.
    pub fn cancel(&self) {
        if let Some(signal) = &self.signal {
            signal.cancel();
        }
    }

    /// Join every stage. Reports the first stage error after all stages are
    /// joined.
    pub fn join(&mut self) -> StageResult<()> {
        let mut first_err = None;
        for stage in &mut self.stages {
            if let Err(e) = stage.join() {
                first_err.get_or_insert(e);
            }
        }
        self.signal = None;
        tracing::info!("Pipeline joined");
        first_err.map_or(Ok(()), Err)
    }

    /// Cancel the current run and join it.
    pub fn shutdown(&mut self) -> StageResult<()> {
        self.cancel();
        self.join()
    }

    /// Reset every stage for another run.
    pub fn reset(&mut self) -> StageResult<()> {
        if self.signal.is_some() {
            return Err(StageError::Running("pipeline".to_string()));
        }
        for stage in &mut self.stages {
            stage.reset()?;
        }
        Ok(())
    }

    /// Per-stage counters, in stage order.
    pub fn stats(&self) -> Vec<(StageId, StageStats)> {
        self.stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| (StageId(idx as u32), stage.stats()))
            .collect()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::warn!("Pipeline dropped while running; shutting down");
            let _ = self.shutdown();
        }
    }
}
