use snafu::Snafu;
use weld_dtype::ElementType;

use crate::graph::NodeId;
use crate::shape::Shape;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Node id does not refer to a live node.
    #[snafu(display("node {id} does not exist"))]
    NodeNotFound { id: NodeId },

    /// Port index outside of a node's outputs.
    #[snafu(display("node {id} has no output {index} (it has {count})"))]
    OutputOutOfRange { id: NodeId, index: usize, count: usize },

    /// Port index outside of a node's inputs.
    #[snafu(display("node {id} has no input {index} (it has {count})"))]
    InputOutOfRange { id: NodeId, index: usize, count: usize },

    /// Op received the wrong number of inputs.
    #[snafu(display("{op} expects {expected} inputs, got {actual}"))]
    InputArity { op: &'static str, expected: usize, actual: usize },

    /// Element types of operands do not agree.
    #[snafu(display("{op}: element type mismatch {lhs} vs {rhs}"))]
    ElementTypeMismatch { op: &'static str, lhs: ElementType, rhs: ElementType },

    /// Op cannot run on this element type.
    #[snafu(display("{op} does not support element type {element_type}"))]
    UnsupportedElementType { op: &'static str, element_type: ElementType },

    /// Numpy broadcasting failed.
    #[snafu(display("{op}: shapes {lhs:?} and {rhs:?} are not broadcastable"))]
    NotBroadcastable { op: &'static str, lhs: Shape, rhs: Shape },

    /// Axis outside of the tensor rank.
    #[snafu(display("{op}: axis {axis} is out of range for rank {rank}"))]
    AxisOutOfRange { op: &'static str, axis: i64, rank: usize },

    /// Input that must be a constant is not.
    #[snafu(display("{op}: input {index} must be a constant"))]
    ExpectedConstant { op: &'static str, index: usize },

    /// Transpose order is not a permutation of the input rank.
    #[snafu(display("invalid transpose order {order:?} for rank {rank}"))]
    InvalidTransposeOrder { order: Vec<i64>, rank: usize },

    /// Reduction dimensions of a matrix product disagree.
    #[snafu(display("matmul: inner dimensions differ ({lhs} vs {rhs})"))]
    MatMulInnerMismatch { lhs: usize, rhs: usize },

    /// Split axis is not divisible by the split count.
    #[snafu(display("split: dimension {dim} is not divisible into {num_splits} parts"))]
    SplitNotDivisible { dim: usize, num_splits: usize },

    /// Constant payload does not match its shape.
    #[snafu(display("constant of shape {shape:?} needs {expected} values, got {actual}"))]
    ConstantSize { shape: Vec<usize>, expected: usize, actual: usize },

    /// Op requires a static shape.
    #[snafu(display("{op} requires a static shape, got {shape:?}"))]
    DynamicShape { op: &'static str, shape: Shape },

    /// Removing a node that still feeds other nodes.
    #[snafu(display("node {id} still has {count} consumers"))]
    NodeInUse { id: NodeId, count: usize },

    /// Output arities differ on node replacement.
    #[snafu(display("cannot replace node {old} ({old_outputs} outputs) by {new} ({new_outputs} outputs)"))]
    ReplaceArity { old: NodeId, new: NodeId, old_outputs: usize, new_outputs: usize },

    /// Parameter reshape got the wrong number of shapes.
    #[snafu(display("graph has {expected} parameters, got {actual} shapes"))]
    ParameterCount { expected: usize, actual: usize },

    /// Dependency cycle found in a graph.
    #[snafu(display("graph '{graph}' contains a cycle"))]
    Cycle { graph: String },

    /// Node is registered as a parameter/result but has a different op.
    #[snafu(display("node {id} is registered as {role} but is a {op}"))]
    RoleMismatch { id: NodeId, role: &'static str, op: &'static str },
}
