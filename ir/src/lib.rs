//! Intermediate representation for the weld fusion compiler.
//!
//! # Module Organization
//!
//! - [`graph`] - Arena dataflow graph, ports and rewiring
//! - [`op`] - Operation enum with shape/type inference
//! - [`types`] - Element-wise operation kinds
//! - [`constant`] - Constant payloads
//! - [`shape`] - Dimensions, shapes and numpy broadcasting
//! - [`rt_info`] - Per-node metadata (topological order, provenance, subgraph state)
//! - [`lowered`] - Hardware-facing ops (BroadcastLoad, VectorBuffer, Fill)
//! - [`subgraph`] - Fused subgraph op owning an isolated body
//! - [`error`] - Error types and result handling

pub mod constant;
pub mod error;
pub mod graph;
pub mod lowered;
pub mod op;
pub mod rt_info;
pub mod shape;
pub mod subgraph;
pub mod types;


pub use constant::Constant;
pub use error::{Error, Result};
pub use graph::{Graph, Input, Node, NodeId, Output, PortInfo};
pub use lowered::{BroadcastLoad, Fill, LayoutClass, VectorBuffer};
pub use op::{InferInput, Op, Ports};
pub use rt_info::{RtInfo, RtValue, SubgraphState};
pub use shape::{Dim, Shape};
pub use subgraph::Subgraph;
pub use types::{BinaryOp, UnaryOp};

pub use weld_dtype::ElementType;
