//! Task abstraction consumed by stages.
//!
//! A stage never looks at what a task computes. It only needs to:
//! - read the task's port declarations,
//! - switch the task to manual control,
//! - replicate it once per worker,
//! - call `exec` once per cycle with access to that worker's port cells.

use crate::error::StageResult;
use crate::pipeline::port::{PortDescriptor, PortDirection};
use crate::pipeline::registry::PortRegistry;
use crate::pipeline::scalar::Scalar;

/// Which parts of its own lifecycle a task manages by itself.
///
/// Stages run tasks with [`ExecControl::MANUAL`]: the stage owns the port
/// storage and decides when `exec` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecControl {
    /// The task allocates its own port storage.
    pub auto_alloc: bool,
    /// The task triggers its own execution when inputs arrive.
    pub auto_exec: bool,
    /// The task may skip per-call bookkeeping.
    pub fast: bool,
}

impl ExecControl {
    pub const MANUAL: Self = Self {
        auto_alloc: false,
        auto_exec: false,
        fast: false,
    };
}

impl Default for ExecControl {
    fn default() -> Self {
        Self {
            auto_alloc: true,
            auto_exec: true,
            fast: false,
        }
    }
}

/// A unit of computation that a stage replicates across its workers.
pub trait Task: Send {
    /// Human-readable name; also names the stage built from this task.
    fn name(&self) -> &str;

    /// Declared ports. Must be identical for every replica.
    fn ports(&self) -> &[PortDescriptor];

    /// Produce an independent replica. Must not affect `self`.
    fn replicate(&self) -> Box<dyn Task>;

    /// Called once on the canonical replica before it is replicated.
    fn set_control(&mut self, _control: ExecControl) {}

    /// Run once, reading inputs from and writing outputs to `io`.
    fn exec(&mut self, io: &mut TaskIo<'_>) -> anyhow::Result<()>;
}

/// A worker's view of its port cells during `exec`.
pub struct TaskIo<'a> {
    tid: usize,
    ports: &'a PortRegistry,
}

impl<'a> TaskIo<'a> {
    pub(crate) fn new(tid: usize, ports: &'a PortRegistry) -> Self {
        Self { tid, ports }
    }

    /// Index of the worker running this replica.
    pub fn worker(&self) -> usize {
        self.tid
    }

    /// Value popped into this worker's cell for input `name` this cycle.
    ///
    /// `None` when the input was stopped without delivering.
    pub fn input<T: Scalar>(&self, name: &str) -> StageResult<Option<T>> {
        Ok(self
            .ports
            .typed::<T>(PortDirection::Input, name)?
            .read(self.tid))
    }

    /// Set the value pushed on output `name` after `exec` returns.
    ///
    /// Outputs left unset this cycle push nothing.
    pub fn set_output<T: Scalar>(&mut self, name: &str, value: T) -> StageResult<()> {
        self.ports
            .typed::<T>(PortDirection::Output, name)?
            .write(self.tid, value);
        Ok(())
    }
}
