//! Port registry: name → buffer maps for one stage.
//!
//! Inputs and outputs live in separate `IndexMap`s so the worker loop visits
//! ports in declaration order every cycle. Buffers are stored type-erased as
//! [`AnyBuffer`], a closed union over the bufferable scalar types.

use crate::error::{StageError, StageResult};
use crate::pipeline::buffer::{TransferStatus, TypedBuffer};
use crate::pipeline::port::{DataType, PortDescriptor, PortDirection};
use crate::pipeline::scalar::Scalar;
use indexmap::IndexMap;

/// Type-erased port buffer.
#[derive(Debug)]
pub enum AnyBuffer {
    I8(TypedBuffer<i8>),
    I16(TypedBuffer<i16>),
    I32(TypedBuffer<i32>),
    I64(TypedBuffer<i64>),
    F32(TypedBuffer<f32>),
    F64(TypedBuffer<f64>),
}

/// Run `$body` with `$b` bound to the typed buffer inside `$buf`.
macro_rules! with_buffer {
    ($buf:expr, $b:ident => $body:expr) => {
        match $buf {
            AnyBuffer::I8($b) => $body,
            AnyBuffer::I16($b) => $body,
            AnyBuffer::I32($b) => $body,
            AnyBuffer::I64($b) => $body,
            AnyBuffer::F32($b) => $body,
            AnyBuffer::F64($b) => $body,
        }
    };
}

impl AnyBuffer {
    /// Build the buffer for `port`, choosing the element type from its tag.
    /// Returns `None` for tags that cannot be buffered.
    pub fn for_port(port: &PortDescriptor, buffer_size: usize, n_threads: usize) -> Option<Self> {
        fn make<T: Scalar>(port: &PortDescriptor, buffer_size: usize, n_threads: usize) -> AnyBuffer {
            T::wrap(TypedBuffer::<T>::new(
                port.name.as_ref(),
                port.direction,
                buffer_size,
                n_threads,
            ))
        }

        match port.data_type {
            DataType::I8 => Some(make::<i8>(port, buffer_size, n_threads)),
            DataType::I16 => Some(make::<i16>(port, buffer_size, n_threads)),
            DataType::I32 => Some(make::<i32>(port, buffer_size, n_threads)),
            DataType::I64 => Some(make::<i64>(port, buffer_size, n_threads)),
            DataType::F32 => Some(make::<f32>(port, buffer_size, n_threads)),
            DataType::F64 => Some(make::<f64>(port, buffer_size, n_threads)),
            DataType::U8 | DataType::U16 | DataType::U32 | DataType::U64 => None,
        }
    }

    pub fn name(&self) -> &str {
        with_buffer!(self, b => b.name())
    }

    pub fn direction(&self) -> PortDirection {
        with_buffer!(self, b => b.direction())
    }

    pub fn data_type(&self) -> DataType {
        with_buffer!(self, b => b.data_type())
    }

    pub fn capacity(&self) -> usize {
        with_buffer!(self, b => b.capacity())
    }

    pub fn len(&self) -> usize {
        with_buffer!(self, b => b.len())
    }

    pub fn is_empty(&self) -> bool {
        with_buffer!(self, b => b.is_empty())
    }

    pub fn is_bound(&self) -> bool {
        with_buffer!(self, b => b.is_bound())
    }

    pub fn is_stopped(&self) -> bool {
        with_buffer!(self, b => b.is_stopped())
    }

    #[inline]
    pub fn pop(&self, tid: usize) -> TransferStatus {
        with_buffer!(self, b => b.pop(tid))
    }

    #[inline]
    pub fn push(&self, tid: usize) -> TransferStatus {
        with_buffer!(self, b => b.push(tid))
    }

    pub fn stop(&self) {
        with_buffer!(self, b => b.stop())
    }

    pub fn reset(&self) {
        with_buffer!(self, b => b.reset())
    }
}

/// Input and output buffers of one stage, keyed by port name.
#[derive(Debug)]
pub struct PortRegistry {
    stage: String,
    inputs: IndexMap<String, AnyBuffer>,
    outputs: IndexMap<String, AnyBuffer>,
}

impl PortRegistry {
    /// Build one buffer per bufferable port. Duplicate names within a
    /// direction are rejected; unbufferable ports are skipped.
    pub fn build(
        stage: &str,
        ports: &[PortDescriptor],
        buffer_size: usize,
        n_threads: usize,
    ) -> StageResult<Self> {
        let mut inputs = IndexMap::new();
        let mut outputs = IndexMap::new();
        let mut declared: Vec<(PortDirection, &str)> = Vec::with_capacity(ports.len());

        for port in ports {
            let name = port.name.as_ref();
            if declared.contains(&(port.direction, name)) {
                return Err(StageError::InvalidArgument(format!(
                    "duplicate {} port '{}' on stage '{}'",
                    port.direction, name, stage
                )));
            }
            declared.push((port.direction, name));

            let Some(buffer) = AnyBuffer::for_port(port, buffer_size, n_threads) else {
                tracing::warn!(
                    "Stage '{}': skipping {} port '{}' with unsupported type {}",
                    stage,
                    port.direction,
                    name,
                    port.data_type
                );
                continue;
            };
            match port.direction {
                PortDirection::Input => inputs.insert(name.to_string(), buffer),
                PortDirection::Output => outputs.insert(name.to_string(), buffer),
            };
        }

        Ok(Self {
            stage: stage.to_string(),
            inputs,
            outputs,
        })
    }

    fn unknown(&self, direction: PortDirection, name: &str) -> StageError {
        StageError::UnknownPort {
            stage: self.stage.clone(),
            direction,
            name: name.to_string(),
        }
    }

    pub fn input(&self, name: &str) -> StageResult<&AnyBuffer> {
        self.inputs
            .get(name)
            .ok_or_else(|| self.unknown(PortDirection::Input, name))
    }

    pub fn input_mut(&mut self, name: &str) -> StageResult<&mut AnyBuffer> {
        if !self.inputs.contains_key(name) {
            return Err(self.unknown(PortDirection::Input, name));
        }
        Ok(&mut self.inputs[name])
    }

    /// Input `input` for mutation alongside output `output` of the same
    /// registry.
    pub fn input_and_output(
        &mut self,
        input: &str,
        output: &str,
    ) -> StageResult<(&mut AnyBuffer, &AnyBuffer)> {
        if !self.inputs.contains_key(input) {
            return Err(self.unknown(PortDirection::Input, input));
        }
        if !self.outputs.contains_key(output) {
            return Err(self.unknown(PortDirection::Output, output));
        }
        Ok((&mut self.inputs[input], &self.outputs[output]))
    }

    pub fn output(&self, name: &str) -> StageResult<&AnyBuffer> {
        self.outputs
            .get(name)
            .ok_or_else(|| self.unknown(PortDirection::Output, name))
    }

    pub fn get(&self, direction: PortDirection, name: &str) -> StageResult<&AnyBuffer> {
        match direction {
            PortDirection::Input => self.input(name),
            PortDirection::Output => self.output(name),
        }
    }

    /// Typed view of a port, failing if the port carries another type.
    pub fn typed<T: Scalar>(
        &self,
        direction: PortDirection,
        name: &str,
    ) -> StageResult<&TypedBuffer<T>> {
        let buffer = self.get(direction, name)?;
        T::downcast(buffer).ok_or_else(|| StageError::PortType {
            stage: self.stage.clone(),
            name: name.to_string(),
            expected: T::DATA_TYPE,
            actual: buffer.data_type(),
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = &AnyBuffer> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &AnyBuffer> {
        self.outputs.values()
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Stop outputs first, then inputs.
    pub fn stop_all(&self) {
        for buffer in self.outputs.values() {
            buffer.stop();
        }
        for buffer in self.inputs.values() {
            buffer.stop();
        }
    }

    pub fn reset_all(&self) {
        for buffer in self.inputs.values() {
            buffer.reset();
        }
        for buffer in self.outputs.values() {
            buffer.reset();
        }
    }
}
