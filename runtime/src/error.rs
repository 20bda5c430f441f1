//! Error types for subgraph execution.

use snafu::Snafu;
use weld_ir::ElementType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Codegen error occurred.
    #[snafu(display("Codegen error: {source}"))]
    Codegen { source: weld_codegen::Error },

    /// Error from IR layer.
    #[snafu(display("IR error: {source}"))]
    Ir { source: weld_ir::Error },

    /// No candidate implementation accepted the shapes.
    #[snafu(display("no implementation of {op} accepts shapes {shapes}"))]
    NoImplementation { op: String, shapes: String },

    /// `execute` called while no implementation is active.
    #[snafu(display("executor has no active implementation; call update first"))]
    NotUpdated,

    #[snafu(display("buffer of {len} bytes cannot hold {shape:?} x {element_type}"))]
    BufferSize { element_type: ElementType, shape: Vec<usize>, len: usize },

    #[snafu(display("expected {expected} buffer, got {actual}"))]
    ElementTypeMismatch { expected: ElementType, actual: ElementType },

    #[snafu(display("expected {expected} {what} buffers, got {actual}"))]
    BufferCount { what: &'static str, expected: usize, actual: usize },

    /// The reference interpreter has no semantics for this op.
    #[snafu(display("reference implementation does not support {op}"))]
    UnsupportedReference { op: String },

    /// Element type without a host representation in buffers.
    #[snafu(display("element type {element_type} has no host representation"))]
    UnsupportedElementType { element_type: ElementType },

    /// Values handed to the interpreter disagree with the shapes it was prepared for.
    #[snafu(display("value of shape {actual:?} does not fit {expected:?}"))]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    #[snafu(display("result shapes of {body} are not static"))]
    DynamicResult { body: String },
}
