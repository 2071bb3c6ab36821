//! # stagepipe: replicated pipeline stages over bounded buffers
//!
//! A small runtime for streaming numeric data through a graph of stages. Each
//! stage runs one task on several worker threads; stages talk through bounded
//! queues of fixed-size scalars (`i8`..`i64`, `f32`, `f64`).
//!
//! ## Architecture
//!
//! - **Task**: user code with named typed ports and a per-cycle `exec`
//! - **Stage**: N replicas of a task, one worker thread each, one buffer per port
//! - **Pipeline**: owns stages, binds ports across them, drives run/cancel/join
//! - **Config**: per-stage thread counts, buffer sizes and wait strategies in TOML
//!
//! ## Example
//!
//! ```ignore
//! use stagepipe::{Pipeline, Stage};
//!
//! let mut pipeline = Pipeline::new();
//! let source = pipeline.add_stage(Stage::new(&MySource::default(), 64, 2)?);
//! let sink = pipeline.add_stage(Stage::new(&MySink::default(), 64, 4)?);
//! pipeline.bind(sink, "in", source, "out")?;
//!
//! pipeline.run()?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! pipeline.shutdown()?;
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{PipelineConfig, StageConfig, WaitStrategy};
pub use error::{ErrorKind, StageError, StageResult};
pub use pipeline::{
    BindStatus, CancellationSignal, DataType, ExecControl, Pipeline, PortDescriptor,
    PortDirection, Scalar, Stage, StageId, StageStats, Task, TaskIo, TransferStatus,
};
