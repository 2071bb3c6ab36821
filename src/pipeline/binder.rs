//! Binding of an input port to an output port of another stage or of the
//! same stage.

use crate::error::{StageError, StageResult};
use crate::pipeline::buffer::{BindStatus, TypedBuffer};
use crate::pipeline::registry::{AnyBuffer, PortRegistry};
use crate::pipeline::scalar::Scalar;
use crate::pipeline::stage::Stage;
use std::sync::Arc;

impl Stage {
    /// Feed this stage's input port `input` from `source`'s output port
    /// `output`.
    ///
    /// Topology-construction step: only legal while this stage has no live
    /// workers. On error neither buffer is modified.
    pub fn bind(&mut self, input: &str, source: &Stage, output: &str) -> StageResult<BindStatus> {
        let name = self.name().to_string();
        let ports = self.ports_for_binding()?;
        let status = bind_any(ports.input_mut(input)?, source.ports.output(output)?, output)?;
        log_binding(status, &name, input, source.name(), output);
        Ok(status)
    }

    /// Feed this stage's input port `input` from its own output port
    /// `output`, forming a feedback loop.
    ///
    /// Items pushed on `output` come back on `input`. The loop has to be
    /// primed: a worker blocks on `input` until something is queued, so at
    /// least one other input or a task that emits without input must start
    /// the cycle.
    pub fn bind_loopback(&mut self, input: &str, output: &str) -> StageResult<BindStatus> {
        let name = self.name().to_string();
        let (input_buffer, output_buffer) =
            self.ports_for_binding()?.input_and_output(input, output)?;
        let status = bind_any(input_buffer, output_buffer, output)?;
        log_binding(status, &name, input, &name, output);
        Ok(status)
    }

    fn ports_for_binding(&mut self) -> StageResult<&mut PortRegistry> {
        if self.is_running() {
            return Err(StageError::Running(self.name().to_string()));
        }
        let name = self.name().to_string();
        Arc::get_mut(&mut self.ports).ok_or(StageError::Running(name))
    }
}

fn log_binding(status: BindStatus, stage: &str, input: &str, source: &str, output: &str) {
    match status {
        BindStatus::Bound => tracing::debug!("Bound '{}.{}' <- '{}.{}'", stage, input, source, output),
        BindStatus::Rebound => tracing::warn!(
            "Rebound '{}.{}' <- '{}.{}', previous association dropped",
            stage,
            input,
            source,
            output
        ),
    }
}

/// Dispatch on the input's element type, then bind through the typed buffers.
fn bind_any(input: &mut AnyBuffer, output: &AnyBuffer, output_name: &str) -> StageResult<BindStatus> {
    match input {
        AnyBuffer::I8(b) => bind_typed(b, output, output_name),
        AnyBuffer::I16(b) => bind_typed(b, output, output_name),
        AnyBuffer::I32(b) => bind_typed(b, output, output_name),
        AnyBuffer::I64(b) => bind_typed(b, output, output_name),
        AnyBuffer::F32(b) => bind_typed(b, output, output_name),
        AnyBuffer::F64(b) => bind_typed(b, output, output_name),
    }
}

fn bind_typed<T: Scalar>(
    input: &mut TypedBuffer<T>,
    output: &AnyBuffer,
    output_name: &str,
) -> StageResult<BindStatus> {
    let typed_output = T::downcast(output).ok_or_else(|| StageError::TypeMismatch {
        input: input.name().to_string(),
        input_type: T::DATA_TYPE,
        output: output_name.to_string(),
        output_type: output.data_type(),
    })?;
    Ok(input.bind(typed_output))
}
