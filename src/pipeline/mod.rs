//! Replicated multi-threaded stages connected by bounded typed buffers.
//!
//! A [`Task`] declares named, typed ports and a per-cycle `exec`. A [`Stage`]
//! replicates the task across N worker threads and gives each port a bounded
//! queue plus one value cell per worker. Binding an input port to an upstream
//! output port makes both share a single queue.
//!
//! # Architecture
//!
//! ```text
//! [Stage A: N workers] ──out──► (shared bounded queue) ──in──► [Stage B: M workers]
//! ```
//!
//! # Design
//!
//! - **Closed type set**: port buffers are an enum over six scalar types
//!   ([`AnyBuffer`]); binding dispatches on the input's variant.
//! - **Cooperative shutdown**: workers poll a [`CancellationSignal`] between
//!   retries; on exit they stop every buffer of their stage so blocked peers
//!   upstream and downstream are released.
//! - **Restartable**: `join` hands replicas back; `reset` clears queues and
//!   re-clones replicas so a second run behaves like the first.

mod binder;
pub mod buffer;
pub mod executor;
pub mod id;
pub mod port;
pub mod registry;
pub mod scalar;
pub mod signal;
pub mod stage;
pub mod task;

pub use buffer::{BindStatus, TransferStatus, TypedBuffer};
pub use executor::Pipeline;
pub use id::StageId;
pub use port::{DataType, PortDescriptor, PortDirection};
pub use registry::{AnyBuffer, PortRegistry};
pub use scalar::Scalar;
pub use signal::CancellationSignal;
pub use stage::{Stage, StageStats};
pub use task::{ExecControl, Task, TaskIo};
