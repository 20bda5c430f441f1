//! Shape-dispatching execution of fused subgraphs.
//!
//! A subgraph op carries a fused body. At run time its executor picks, for the
//! current input shapes, the first implementation in a priority list that can
//! serve them: JIT kernels for each hardware profile the host supports, then
//! the reference interpreter.
//!
//! # Module Organization
//!
//! - [`executor`] - Executor and implementation contracts
//! - [`variable`] - Dispatch over an ordered list of implementations
//! - [`subgraph`] - Subgraph attributes and their dispatch table
//! - [`jit`] - Per-shape JIT kernels
//! - [`reference`] - Interpreter over bodies
//! - [`memory`] - Host buffers and execution arguments
//! - [`context`] - Configuration shared by executors
//! - [`error`] - Error types and result handling
//!
//! # Thread Safety
//!
//! `update` takes `&mut self` and must complete before `execute` runs.
//! `execute` takes `&self`; any number of threads may run it concurrently on
//! disjoint output buffers.

pub mod context;
pub mod error;
pub mod executor;
pub mod jit;
pub mod memory;
pub mod reference;
pub mod subgraph;
pub mod variable;

#[cfg(test)]
pub mod test;

pub use context::ExecutorContext;
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorImplementation, ImplementationKind};
pub use jit::{JitExecutor, JitImplementation};
pub use memory::{Buffer, MemoryArgs, Scalar};
pub use reference::{Dense, ReferenceExecutor, ReferenceImplementation, evaluate};
pub use subgraph::{SubgraphAttrs, SubgraphExecutor, result_buffers, subgraph_executor, subgraph_implementations};
pub use variable::VariableExecutor;
