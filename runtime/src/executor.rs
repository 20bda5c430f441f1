//! Executor contracts.

use std::fmt;
use std::sync::Arc;

use weld_codegen::Isa;

use crate::context::ExecutorContext;
use crate::error::Result;
use crate::memory::MemoryArgs;

/// What ultimately runs the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImplementationKind {
    Jit(Isa),
    Reference,
}

impl fmt::Display for ImplementationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImplementationKind::Jit(isa) => write!(f, "jit_{isa}"),
            ImplementationKind::Reference => f.write_str("ref"),
        }
    }
}

/// A prepared computation.
///
/// `update` may mutate internal state and must not race with anything else on
/// the same executor. Once it has settled, `execute` only reads immutable state
/// and may run from many threads at once.
pub trait Executor: Send + Sync {
    /// Prepare for the shapes in `memory`. `Ok(false)` means this executor cannot
    /// serve them.
    fn update(&mut self, memory: &MemoryArgs<'_>) -> Result<bool>;

    fn execute(&self, memory: &mut MemoryArgs<'_>) -> Result<()>;

    fn implementation_kind(&self) -> ImplementationKind;
}

/// Factory for one candidate implementation of an op with attributes `A`.
pub trait ExecutorImplementation<A>: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap predicate over the current shapes, checked before construction.
    fn accepts_shapes(&self, attrs: &A, memory: &MemoryArgs<'_>) -> bool;

    /// Build an executor; `None` when construction fails.
    fn create(&self, attrs: &A, memory: &MemoryArgs<'_>, context: &Arc<ExecutorContext>) -> Option<Box<dyn Executor>>;
}
