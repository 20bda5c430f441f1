//! Host buffers and the memory arguments of one execution.

use smallvec::SmallVec;
use snafu::ensure;
use weld_dtype::HasElementType;
use weld_ir::shape::static_shape;
use weld_ir::{ElementType, Shape};

use crate::error::*;

/// Host element type a buffer can be viewed as.
pub trait Scalar: HasElementType {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(impl Scalar for $ty {
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }
        })*
    };
}

impl_scalar!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Dense row-major host tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    element_type: ElementType,
    shape: SmallVec<[usize; 4]>,
    /// Backed by words so every element type is naturally aligned.
    words: Vec<u64>,
}

impl Buffer {
    pub fn zeros(element_type: ElementType, shape: &[usize]) -> Self {
        let bytes = shape.iter().product::<usize>() * element_type.bytes();
        Self { element_type, shape: shape.into(), words: vec![0; bytes.div_ceil(8)] }
    }

    pub fn from_slice<T: Scalar>(shape: &[usize], values: &[T]) -> Result<Self> {
        let mut buffer = Self::zeros(T::ELEMENT_TYPE, shape);
        ensure!(
            values.len() == buffer.len(),
            BufferSizeSnafu { element_type: T::ELEMENT_TYPE, shape: shape.to_vec(), len: std::mem::size_of_val(values) }
        );
        buffer.as_mut_slice::<T>()?.copy_from_slice(values);
        Ok(buffer)
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Shape as an IR port shape.
    pub fn port_shape(&self) -> Shape {
        static_shape(&self.shape)
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type.bytes()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }

    pub fn as_slice<T: Scalar>(&self) -> Result<&[T]> {
        ensure!(T::ELEMENT_TYPE == self.element_type, ElementTypeMismatchSnafu { expected: self.element_type, actual: T::ELEMENT_TYPE });
        // SAFETY: the element type matches T, the words hold at least `len`
        // elements and u64 alignment covers every scalar type.
        Ok(unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<T>(), self.len()) })
    }

    pub fn as_mut_slice<T: Scalar>(&mut self) -> Result<&mut [T]> {
        ensure!(T::ELEMENT_TYPE == self.element_type, ElementTypeMismatchSnafu { expected: self.element_type, actual: T::ELEMENT_TYPE });
        let len = self.len();
        // SAFETY: as in `as_slice`, with unique access through `&mut self`.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<T>(), len) })
    }

    pub fn to_vec<T: Scalar>(&self) -> Result<Vec<T>> {
        Ok(self.as_slice::<T>()?.to_vec())
    }

    /// Every element widened to `f64`.
    pub fn read_f64(&self) -> Result<Vec<f64>> {
        macro_rules! widen {
            ($ty:ty) => {
                self.as_slice::<$ty>()?.iter().map(|&v| v.to_f64()).collect()
            };
        }
        Ok(match self.element_type {
            ElementType::I8 => widen!(i8),
            ElementType::U8 => widen!(u8),
            ElementType::I16 => widen!(i16),
            ElementType::U16 => widen!(u16),
            ElementType::I32 => widen!(i32),
            ElementType::U32 => widen!(u32),
            ElementType::I64 => widen!(i64),
            ElementType::U64 => widen!(u64),
            ElementType::F32 => widen!(f32),
            ElementType::F64 => widen!(f64),
            ElementType::Boolean => self.bool_bytes().iter().map(|&b| f64::from(b != 0)).collect(),
            element_type => return UnsupportedElementTypeSnafu { element_type }.fail(),
        })
    }

    /// Overwrite every element, narrowing from `f64` with `as` semantics.
    pub fn write_f64(&mut self, values: &[f64]) -> Result<()> {
        ensure!(
            values.len() == self.len(),
            BufferSizeSnafu { element_type: self.element_type, shape: self.shape.to_vec(), len: values.len() * 8 }
        );
        macro_rules! narrow {
            ($ty:ty) => {
                for (dst, &v) in self.as_mut_slice::<$ty>()?.iter_mut().zip(values) {
                    *dst = <$ty>::from_f64(v);
                }
            };
        }
        match self.element_type {
            ElementType::I8 => narrow!(i8),
            ElementType::U8 => narrow!(u8),
            ElementType::I16 => narrow!(i16),
            ElementType::U16 => narrow!(u16),
            ElementType::I32 => narrow!(i32),
            ElementType::U32 => narrow!(u32),
            ElementType::I64 => narrow!(i64),
            ElementType::U64 => narrow!(u64),
            ElementType::F32 => narrow!(f32),
            ElementType::F64 => narrow!(f64),
            ElementType::Boolean => {
                let len = self.len();
                // SAFETY: boolean buffers hold one byte per element.
                let bytes = unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), len) };
                for (dst, &v) in bytes.iter_mut().zip(values) {
                    *dst = u8::from(v != 0.0);
                }
            }
            element_type => return UnsupportedElementTypeSnafu { element_type }.fail(),
        }
        Ok(())
    }

    fn bool_bytes(&self) -> &[u8] {
        // SAFETY: boolean buffers hold one byte per element.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len()) }
    }
}

/// Inputs and outputs of one execution: body parameters, then body results.
#[derive(Debug, Default)]
pub struct MemoryArgs<'a> {
    pub srcs: Vec<&'a Buffer>,
    pub dsts: Vec<&'a mut Buffer>,
}

impl<'a> MemoryArgs<'a> {
    pub fn new(srcs: Vec<&'a Buffer>, dsts: Vec<&'a mut Buffer>) -> Self {
        Self { srcs, dsts }
    }

    pub fn src_shapes(&self) -> Vec<Shape> {
        self.srcs.iter().map(|b| b.port_shape()).collect()
    }

    /// Human-readable shape list for diagnostics.
    pub fn describe(&self) -> String {
        let shapes: Vec<String> = self.srcs.iter().map(|b| format!("{:?}", b.shape())).collect();
        format!("[{}]", shapes.join(", "))
    }
}
