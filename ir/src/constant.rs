use std::sync::Arc;

use smallvec::SmallVec;
use weld_dtype::ElementType;

use crate::error::{ConstantSizeSnafu, Result};
use crate::shape::{Shape, static_shape};

/// Immutable constant payload.
///
/// Values are stored widened to `f64` and shared between clones, so copying a
/// graph that holds large constants stays cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    element_type: ElementType,
    dims: SmallVec<[usize; 4]>,
    values: Arc<[f64]>,
}

impl Constant {
    /// A single `value` is splatted over the whole shape.
    pub fn new(element_type: ElementType, dims: &[usize], values: Vec<f64>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        let values = match values.len() {
            n if n == expected => values,
            1 => vec![values[0]; expected],
            actual => return ConstantSizeSnafu { shape: dims.to_vec(), expected, actual }.fail(),
        };
        Ok(Self { element_type, dims: dims.into(), values: values.into() })
    }

    /// Rank-0 constant.
    pub fn scalar(element_type: ElementType, value: f64) -> Self {
        Self { element_type, dims: SmallVec::new(), values: Arc::from([value]) }
    }

    /// Integer vector, used for orders and axes.
    pub fn indices(values: &[i64]) -> Self {
        Self {
            element_type: ElementType::I64,
            dims: SmallVec::from_slice(&[values.len()]),
            values: values.iter().map(|&v| v as f64).collect(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn shape(&self) -> Shape {
        static_shape(&self.dims)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.values.len() == 1
    }

    pub fn as_i64_vec(&self) -> Vec<i64> {
        self.values.iter().map(|&v| v as i64).collect()
    }

    /// Bit pattern of a single-element 4-byte constant as it sits in a vector lane.
    pub fn lane_bits(&self) -> Option<u32> {
        if !self.is_scalar() {
            return None;
        }
        let v = self.values[0];
        match self.element_type {
            ElementType::F32 => Some((v as f32).to_bits()),
            ElementType::I32 => Some((v as i32) as u32),
            ElementType::U32 => Some(v as u32),
            _ => None,
        }
    }
}
