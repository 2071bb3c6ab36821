//! Error handling for stagepipe
//!
//! Every fallible operation in the crate returns [`StageError`]. Errors fall
//! into two kinds (see [`ErrorKind`]): bad construction parameters, and
//! topology/lifecycle errors raised while wiring or driving stages. Neither is
//! transient; both abort pipeline construction before any worker runs.

use crate::pipeline::port::{DataType, PortDirection};
use thiserror::Error;

/// Coarse classification of a [`StageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad construction or configuration parameters.
    InvalidArgument,
    /// Topology or lifecycle errors (unknown ports, type mismatches, misuse
    /// while workers are live, thread failures).
    Runtime,
}

/// Main error type for stage construction, binding and lifecycle operations
#[derive(Error, Debug)]
pub enum StageError {
    /// Invalid construction or configuration parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A port name that is not present in the requested registry
    #[error("Unknown {direction} port '{name}' on stage '{stage}'")]
    UnknownPort {
        stage: String,
        direction: PortDirection,
        name: String,
    },

    /// Binding between ports whose data types differ
    #[error(
        "Type mismatch binding input '{input}' ({input_type}) to output '{output}' ({output_type})"
    )]
    TypeMismatch {
        input: String,
        input_type: DataType,
        output: String,
        output_type: DataType,
    },

    /// Typed access to a port that carries another data type
    #[error("Port '{name}' on stage '{stage}' carries {actual}, not {expected}")]
    PortType {
        stage: String,
        name: String,
        expected: DataType,
        actual: DataType,
    },

    /// Operation requires the stage to have no live workers
    #[error("Stage '{0}' has live workers")]
    Running(String),

    /// A previous run left the stage's buffers stopped
    #[error("Stage '{0}' must be reset before it can run again")]
    NotReset(String),

    /// The operating system refused to spawn a worker thread
    #[error("Failed to spawn worker {tid} of stage '{stage}': {source}")]
    Spawn {
        stage: String,
        tid: usize,
        #[source]
        source: std::io::Error,
    },

    /// One or more worker threads panicked
    #[error("Stage '{stage}': {count} worker(s) panicked")]
    WorkerPanicked { stage: String, count: usize },

    /// Configuration errors (parse/IO)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StageError>,
    },
}

impl StageError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StageError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error. Context wrappers report the kind of their source.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::InvalidArgument(_) | StageError::Config(_) => ErrorKind::InvalidArgument,
            StageError::WithContext { source, .. } => source.kind(),
            StageError::UnknownPort { .. }
            | StageError::TypeMismatch { .. }
            | StageError::PortType { .. }
            | StageError::Running(_)
            | StageError::NotReset(_)
            | StageError::Spawn { .. }
            | StageError::WorkerPanicked { .. } => ErrorKind::Runtime,
        }
    }
}

/// Result type alias for stagepipe operations
pub type StageResult<T> = std::result::Result<T, StageError>;
