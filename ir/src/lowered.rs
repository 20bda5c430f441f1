//! Hardware-facing ops produced when a fused body is lowered for code generation.
//!
//! These ops speak in vector registers and byte offsets rather than tensors:
//! [`BroadcastLoad`] reads one element and splats it, [`VectorBuffer`] reserves a
//! register's worth of scratch, and [`Fill`] overwrites the tail lanes of a register.

use weld_dtype::ElementType;

use crate::error::{AxisOutOfRangeSnafu, Result};
use crate::graph::PortInfo;
use crate::shape::{Dim, Shape};

/// How tensors are laid out in memory; decides which dimension a broadcast load
/// stretches when no axis is given explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutClass {
    /// Plain row-major: the innermost dimension.
    #[default]
    Planar,
    /// Channel-blocked: the block is innermost, so the second-innermost dimension.
    Blocked,
}

impl LayoutClass {
    pub fn broadcast_axis(self, rank: usize) -> Option<usize> {
        match self {
            LayoutClass::Planar => rank.checked_sub(1),
            LayoutClass::Blocked => rank.checked_sub(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastLoad {
    pub bcast_dim: Dim,
    /// Byte offset of the loaded element.
    pub offset: usize,
    pub layout: LayoutClass,
    /// Overrides the layout-derived axis.
    pub axis: Option<usize>,
}

impl BroadcastLoad {
    pub fn new(bcast_dim: impl Into<Dim>, layout: LayoutClass) -> Self {
        Self { bcast_dim: bcast_dim.into(), offset: 0, layout, axis: None }
    }

    pub fn with_axis(mut self, axis: usize) -> Self {
        self.axis = Some(axis);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn infer(&self, input: &PortInfo) -> Result<PortInfo> {
        let rank = input.shape.len();
        let axis = self.axis.or_else(|| self.layout.broadcast_axis(rank));
        let axis = match axis {
            Some(axis) if axis < rank => axis,
            _ => return AxisOutOfRangeSnafu { op: "BroadcastLoad", axis: axis.map_or(-1, |a| a as i64), rank }.fail(),
        };
        let mut shape: Shape = input.shape.clone();
        shape[axis] = self.bcast_dim;
        Ok(PortInfo { element_type: input.element_type, shape })
    }
}

/// Scratch memory of one vector register; always shaped `[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorBuffer {
    pub element_type: ElementType,
}

impl VectorBuffer {
    pub fn infer(&self) -> PortInfo {
        PortInfo { element_type: self.element_type, shape: [Dim::Static(1)].into_iter().collect() }
    }
}

/// Overwrite lanes `offset..width` of a register with `fill_value`.
///
/// `offset` counts elements. `offset == width` leaves the register untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub offset: usize,
    /// Raw lane bits; zero selects the cheaper zeroing path.
    pub fill_value: u32,
}

impl Fill {
    pub fn new(offset: usize, fill_value: u32) -> Self {
        Self { offset, fill_value }
    }

    pub fn is_zero_fill(&self) -> bool {
        self.fill_value == 0
    }

    /// Lane-level semantics over a register image of `lanes.len()` elements.
    pub fn apply(&self, lanes: &mut [u32]) {
        if let Some(tail) = lanes.get_mut(self.offset..) {
            tail.fill(self.fill_value);
        }
    }
}
