//! Error types for kernel generation.

use snafu::Snafu;
use weld_ir::{ElementType, NodeId};

use crate::isa::Isa;
use crate::regs::RegClass;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Error from IR layer.
    #[snafu(display("IR error: {source}"))]
    Ir { source: weld_ir::Error },

    /// The host cannot run code for this profile.
    #[snafu(display("ISA {isa} is not supported by the host"))]
    IsaNotSupported { isa: Isa },

    /// An emitter was asked to generate code for a profile it cannot target.
    #[snafu(display("emitter {emitter} does not support {isa}"))]
    TargetIncompatible { emitter: &'static str, isa: Isa },

    /// A register pool ran dry.
    #[snafu(display("out of {class} registers: {requested} requested, {available} available"))]
    RegisterExhausted { class: RegClass, requested: usize, available: usize },

    /// An emitter received a register list that does not match its declaration.
    #[snafu(display("emitter {emitter} expects {expected} {what}, got {actual}"))]
    EmitArity { emitter: &'static str, what: &'static str, expected: usize, actual: usize },

    /// Register of the wrong class passed to an emitter.
    #[snafu(display("emitter {emitter} expects a {expected} register at {what} {index}"))]
    RegisterClass { emitter: &'static str, what: &'static str, index: usize, expected: RegClass },

    #[snafu(display("{op} is not supported by the JIT"))]
    UnsupportedOp { op: String },

    #[snafu(display("element type {element_type} is not supported by the JIT"))]
    UnsupportedElementType { element_type: ElementType },

    /// Kernels are compiled for one static shape.
    #[snafu(display("port of {node} has a dynamic shape"))]
    DynamicShape { node: NodeId },

    /// Parameter neither spans the iteration domain nor holds a single element.
    #[snafu(display("parameter {node} with {size} elements cannot be iterated over {work_amount}"))]
    UnsupportedLayout { node: NodeId, size: usize, work_amount: usize },

    /// Body value read before it was computed.
    #[snafu(display("body value {node} has no register"))]
    UnboundValue { node: NodeId },

    /// Constant table entry missing at emission time.
    #[snafu(display("constant table has no entry '{name}'"))]
    MissingConstant { name: String },

    /// Kernel invoked with the wrong number of data pointers.
    #[snafu(display("kernel {name} takes {expected} arguments, got {actual}"))]
    ArgumentCount { name: String, expected: usize, actual: usize },

    /// Cranelift rejected the generated function.
    #[snafu(display("JIT compilation failed: {reason}"))]
    Jit { reason: String },
}
