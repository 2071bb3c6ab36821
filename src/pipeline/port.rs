//! Port descriptors for the stage system.
//!
//! Each task declares its ports (inputs/outputs) via `PortDescriptor` slices.
//! The stage uses these to build its buffers and the binder uses the recorded
//! data type to validate connections.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Scalar data type carried by a port.
///
/// Only the signed integer and float tags can be buffered; ports declared
/// with an unsigned tag are skipped when a stage builds its registries.
/// Serialized names match [`DataType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 8-bit signed integer
    #[serde(rename = "int8")]
    I8,
    /// 16-bit signed integer
    #[serde(rename = "int16")]
    I16,
    /// 32-bit signed integer
    #[serde(rename = "int32")]
    I32,
    /// 64-bit signed integer
    #[serde(rename = "int64")]
    I64,
    /// 32-bit floating point
    #[serde(rename = "float32")]
    F32,
    /// 64-bit floating point
    #[serde(rename = "float64")]
    F64,
    /// 8-bit unsigned integer
    #[serde(rename = "uint8")]
    U8,
    /// 16-bit unsigned integer
    #[serde(rename = "uint16")]
    U16,
    /// 32-bit unsigned integer
    #[serde(rename = "uint32")]
    U32,
    /// 64-bit unsigned integer
    #[serde(rename = "uint64")]
    U64,
}

impl DataType {
    /// Canonical lowercase name (`int32`, `float64`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Descriptor for a task's port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: Cow<'static, str>,
    pub direction: PortDirection,
    pub data_type: DataType,
}

impl PortDescriptor {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        direction: PortDirection,
        data_type: DataType,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type,
        }
    }

    pub const fn input(name: &'static str, data_type: DataType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            direction: PortDirection::Input,
            data_type,
        }
    }

    pub const fn output(name: &'static str, data_type: DataType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            direction: PortDirection::Output,
            data_type,
        }
    }
}
