//! Operation enum and shape/type inference.

use smallvec::{SmallVec, smallvec};
use snafu::ensure;
use weld_dtype::ElementType;

use crate::constant::Constant;
use crate::error::*;
use crate::graph::PortInfo;
use crate::lowered::{BroadcastLoad, Fill, VectorBuffer};
use crate::shape::{Dim, Shape, broadcast_merge, normalize_axis};
use crate::subgraph::Subgraph;
use crate::types::{BinaryOp, UnaryOp};

pub type Ports = SmallVec<[PortInfo; 2]>;

/// What inference sees of one input: its port, and the payload when the
/// producer is a constant.
#[derive(Debug, Clone)]
pub struct InferInput {
    pub port: PortInfo,
    pub constant: Option<Constant>,
}

#[derive(Debug, Clone)]
pub enum Op {
    Parameter { element_type: ElementType, shape: Shape },
    /// Graph output sink; has no outputs of its own.
    Result,
    Constant(Constant),

    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `cond ? then : else`, broadcast over all three.
    Select,
    Convert { to: ElementType },

    /// Inputs: data, input_low, input_high, output_low, output_high.
    FakeQuantize { levels: usize },
    /// Inputs: data, order (constant). An empty order reverses the axes.
    Transpose,
    Softmax { axis: i64 },
    MatMul { transpose_a: bool, transpose_b: bool },
    Split { axis: i64, num_splits: usize },

    BroadcastLoad(BroadcastLoad),
    VectorBuffer(VectorBuffer),
    Fill(Fill),

    Subgraph(Box<Subgraph>),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Parameter { .. } => "Parameter",
            Op::Result => "Result",
            Op::Constant(_) => "Constant",
            Op::Unary(_) => "Unary",
            Op::Binary(_) => "Binary",
            Op::Select => "Select",
            Op::Convert { .. } => "Convert",
            Op::FakeQuantize { .. } => "FakeQuantize",
            Op::Transpose => "Transpose",
            Op::Softmax { .. } => "Softmax",
            Op::MatMul { .. } => "MatMul",
            Op::Split { .. } => "Split",
            Op::BroadcastLoad(_) => "BroadcastLoad",
            Op::VectorBuffer(_) => "VectorBuffer",
            Op::Fill(_) => "Fill",
            Op::Subgraph(_) => "Subgraph",
        }
    }

    /// Expected input count; a subgraph takes one input per body parameter.
    pub fn input_arity(&self) -> usize {
        match self {
            Op::Parameter { .. } | Op::Constant(_) | Op::VectorBuffer(_) => 0,
            Op::Result
            | Op::Unary(_)
            | Op::Convert { .. }
            | Op::Softmax { .. }
            | Op::Split { .. }
            | Op::BroadcastLoad(_)
            | Op::Fill(_) => 1,
            Op::Binary(_) | Op::Transpose | Op::MatMul { .. } => 2,
            Op::Select => 3,
            Op::FakeQuantize { .. } => 5,
            Op::Subgraph(sg) => sg.body().parameters().len(),
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, Op::Parameter { .. })
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Op::Result)
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Op::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_subgraph(&self) -> Option<&Subgraph> {
        match self {
            Op::Subgraph(sg) => Some(sg),
            _ => None,
        }
    }

    pub fn as_subgraph_mut(&mut self) -> Option<&mut Subgraph> {
        match self {
            Op::Subgraph(sg) => Some(sg),
            _ => None,
        }
    }

    /// Ops whose lowering needs extra hidden constants or scratch buffers.
    pub fn is_domain_sensitive(&self) -> bool {
        matches!(self, Op::Transpose | Op::FakeQuantize { .. } | Op::Softmax { .. } | Op::MatMul { .. })
    }

    /// Constant inputs that stay inside a fused body even when non-scalar.
    pub fn constant_input_should_be_inside_body(&self, index: usize) -> bool {
        match self {
            Op::Transpose => index == 1,
            Op::FakeQuantize { .. } => (1..=4).contains(&index),
            _ => false,
        }
    }

    /// Lane-parallel ops: every output element depends on the same index of every input.
    pub fn is_elementwise(&self) -> bool {
        matches!(
            self,
            Op::Unary(_) | Op::Binary(_) | Op::Select | Op::Convert { .. } | Op::Fill(_) | Op::BroadcastLoad(_)
        )
    }

    pub fn infer(&self, inputs: &[InferInput]) -> Result<Ports> {
        let op = self.name();
        let expected = self.input_arity();
        ensure!(inputs.len() == expected, InputAritySnafu { op, expected, actual: inputs.len() });

        match self {
            Op::Parameter { element_type, shape } => {
                Ok(smallvec![PortInfo { element_type: *element_type, shape: shape.clone() }])
            }
            Op::Result => Ok(Ports::new()),
            Op::Constant(c) => Ok(smallvec![PortInfo { element_type: c.element_type(), shape: c.shape() }]),

            Op::Unary(unary) => {
                let port = &inputs[0].port;
                ensure!(
                    !unary.requires_float() || port.element_type.is_float(),
                    UnsupportedElementTypeSnafu { op, element_type: port.element_type }
                );
                Ok(smallvec![port.clone()])
            }
            Op::Binary(_) => {
                let (lhs, rhs) = (&inputs[0].port, &inputs[1].port);
                ensure!(
                    lhs.element_type == rhs.element_type,
                    ElementTypeMismatchSnafu { op, lhs: lhs.element_type, rhs: rhs.element_type }
                );
                let shape = broadcast(op, &lhs.shape, &rhs.shape)?;
                Ok(smallvec![PortInfo { element_type: lhs.element_type, shape }])
            }
            Op::Select => {
                let (cond, then, other) = (&inputs[0].port, &inputs[1].port, &inputs[2].port);
                ensure!(
                    cond.element_type.is_bool(),
                    UnsupportedElementTypeSnafu { op, element_type: cond.element_type }
                );
                ensure!(
                    then.element_type == other.element_type,
                    ElementTypeMismatchSnafu { op, lhs: then.element_type, rhs: other.element_type }
                );
                let shape = broadcast(op, &broadcast(op, &cond.shape, &then.shape)?, &other.shape)?;
                Ok(smallvec![PortInfo { element_type: then.element_type, shape }])
            }
            Op::Convert { to } => Ok(smallvec![PortInfo { element_type: *to, shape: inputs[0].port.shape.clone() }]),

            Op::FakeQuantize { .. } => {
                let data = &inputs[0].port;
                let mut shape = data.shape.clone();
                for range in &inputs[1..] {
                    shape = broadcast(op, &shape, &range.port.shape)?;
                }
                Ok(smallvec![PortInfo { element_type: data.element_type, shape }])
            }
            Op::Transpose => infer_transpose(&inputs[0].port, &inputs[1]),
            Op::Softmax { axis } => {
                let port = &inputs[0].port;
                ensure!(port.element_type.is_float(), UnsupportedElementTypeSnafu { op, element_type: port.element_type });
                normalize_axis(*axis, port.shape.len())
                    .ok_or_else(|| Error::AxisOutOfRange { op, axis: *axis, rank: port.shape.len() })?;
                Ok(smallvec![port.clone()])
            }
            Op::MatMul { transpose_a, transpose_b } => {
                infer_matmul(&inputs[0].port, &inputs[1].port, *transpose_a, *transpose_b)
            }
            Op::Split { axis, num_splits } => infer_split(&inputs[0].port, *axis, *num_splits),

            Op::BroadcastLoad(load) => Ok(smallvec![load.infer(&inputs[0].port)?]),
            Op::VectorBuffer(buffer) => Ok(smallvec![buffer.infer()]),
            Op::Fill(_) => Ok(smallvec![inputs[0].port.clone()]),

            Op::Subgraph(sg) => sg.infer(inputs),
        }
    }
}

fn broadcast(op: &'static str, lhs: &Shape, rhs: &Shape) -> Result<Shape> {
    broadcast_merge(lhs, rhs).ok_or_else(|| Error::NotBroadcastable { op, lhs: lhs.clone(), rhs: rhs.clone() })
}

fn infer_transpose(data: &PortInfo, order: &InferInput) -> Result<Ports> {
    let Some(order) = &order.constant else {
        return ExpectedConstantSnafu { op: "Transpose", index: 1usize }.fail();
    };
    let rank = data.shape.len();
    let order = order.as_i64_vec();
    let order: Vec<i64> = if order.is_empty() { (0..rank as i64).rev().collect() } else { order };

    let mut seen = vec![false; rank];
    let valid = order.len() == rank
        && order.iter().all(|&axis| match normalize_axis(axis, rank) {
            Some(a) if !seen[a] => {
                seen[a] = true;
                true
            }
            _ => false,
        });
    ensure!(valid, InvalidTransposeOrderSnafu { order, rank });

    let shape = order.iter().filter_map(|&axis| normalize_axis(axis, rank)).map(|a| data.shape[a]).collect();
    Ok(smallvec![PortInfo { element_type: data.element_type, shape }])
}

fn infer_matmul(a: &PortInfo, b: &PortInfo, transpose_a: bool, transpose_b: bool) -> Result<Ports> {
    let op = "MatMul";
    ensure!(a.element_type == b.element_type, ElementTypeMismatchSnafu { op, lhs: a.element_type, rhs: b.element_type });
    ensure!(a.shape.len() >= 2, AxisOutOfRangeSnafu { op, axis: -2i64, rank: a.shape.len() });
    ensure!(b.shape.len() >= 2, AxisOutOfRangeSnafu { op, axis: -2i64, rank: b.shape.len() });

    let (ra, rb) = (a.shape.len(), b.shape.len());
    let (m, k_a) = if transpose_a { (a.shape[ra - 1], a.shape[ra - 2]) } else { (a.shape[ra - 2], a.shape[ra - 1]) };
    let (k_b, n) = if transpose_b { (b.shape[rb - 1], b.shape[rb - 2]) } else { (b.shape[rb - 2], b.shape[rb - 1]) };
    if let (Dim::Static(lhs), Dim::Static(rhs)) = (k_a, k_b) {
        ensure!(lhs == rhs, MatMulInnerMismatchSnafu { lhs, rhs });
    }

    let batch_a: Shape = a.shape[..ra - 2].iter().copied().collect();
    let batch_b: Shape = b.shape[..rb - 2].iter().copied().collect();
    let mut shape = broadcast(op, &batch_a, &batch_b)?;
    shape.push(m);
    shape.push(n);
    Ok(smallvec![PortInfo { element_type: a.element_type, shape }])
}

fn infer_split(data: &PortInfo, axis: i64, num_splits: usize) -> Result<Ports> {
    let rank = data.shape.len();
    let axis_idx = normalize_axis(axis, rank).ok_or(Error::AxisOutOfRange { op: "Split", axis, rank })?;
    ensure!(num_splits > 0, SplitNotDivisibleSnafu { dim: 0usize, num_splits });

    let mut shape = data.shape.clone();
    if let Dim::Static(dim) = shape[axis_idx] {
        ensure!(dim % num_splits == 0, SplitNotDivisibleSnafu { dim, num_splits });
        shape[axis_idx] = Dim::Static(dim / num_splits);
    }
    let port = PortInfo { element_type: data.element_type, shape };
    Ok(std::iter::repeat_n(port, num_splits).collect())
}

