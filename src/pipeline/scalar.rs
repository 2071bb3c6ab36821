//! The closed set of scalar types a port buffer can carry.
//!
//! `Scalar` is sealed: it is implemented for exactly the six bufferable
//! [`DataType`]s and ties each Rust type to its tag and its [`AnyBuffer`]
//! variant, so type dispatch happens once by `match` and everything after it
//! works through a statically typed [`TypedBuffer`].

use crate::pipeline::buffer::TypedBuffer;
use crate::pipeline::port::DataType;
use crate::pipeline::registry::AnyBuffer;
use std::fmt::Debug;

mod sealed {
    pub trait Sealed {}
}

/// A value type that can flow through a port buffer.
pub trait Scalar: sealed::Sealed + Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Tag recorded on ports of this type.
    const DATA_TYPE: DataType;

    /// Erase a typed buffer into the registry union.
    fn wrap(buffer: TypedBuffer<Self>) -> AnyBuffer;

    /// Recover the typed buffer if `buffer` carries this type.
    fn downcast(buffer: &AnyBuffer) -> Option<&TypedBuffer<Self>>;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const DATA_TYPE: DataType = DataType::$variant;

                #[inline]
                fn wrap(buffer: TypedBuffer<Self>) -> AnyBuffer {
                    AnyBuffer::$variant(buffer)
                }

                #[inline]
                fn downcast(buffer: &AnyBuffer) -> Option<&TypedBuffer<Self>> {
                    match buffer {
                        AnyBuffer::$variant(b) => Some(b),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}
