//! Execution of one fused subgraph body.
//!
//! The dispatch table lists a JIT candidate per hardware profile, widest
//! first, followed by the reference interpreter. [`VariableExecutor`] walks it
//! on every shape change.

use std::sync::Arc;

use snafu::{OptionExt, ResultExt};
use weld_codegen::Isa;
use weld_ir::Graph;
use weld_ir::shape::to_static;

use crate::context::ExecutorContext;
use crate::error::*;
use crate::executor::ExecutorImplementation;
use crate::jit::JitImplementation;
use crate::memory::{Buffer, MemoryArgs};
use crate::reference::ReferenceImplementation;
use crate::variable::VariableExecutor;

/// Attributes of a subgraph op: its fused body.
#[derive(Debug, Clone)]
pub struct SubgraphAttrs {
    pub body: Graph,
}

impl SubgraphAttrs {
    pub fn new(body: Graph) -> Self {
        Self { body }
    }

    /// Buffers match the body's parameters in count and element type.
    pub fn accepts_inputs(&self, memory: &MemoryArgs<'_>) -> bool {
        let Ok(ports) = self.body.parameter_ports() else { return false };
        ports.len() == memory.srcs.len()
            && ports.iter().zip(&memory.srcs).all(|(port, buffer)| port.element_type == buffer.element_type())
    }
}

pub type SubgraphExecutor = VariableExecutor<SubgraphAttrs>;

/// Candidate implementations in priority order.
pub fn subgraph_implementations(context: &ExecutorContext) -> Vec<Box<dyn ExecutorImplementation<SubgraphAttrs>>> {
    let isas = match context.kernel_config.isa {
        Some(isa) => vec![isa],
        None => Isa::dispatch_table(),
    };
    let mut implementations: Vec<Box<dyn ExecutorImplementation<SubgraphAttrs>>> = Vec::with_capacity(isas.len() + 1);
    for isa in isas {
        implementations.push(Box::new(JitImplementation::new(isa)));
    }
    if !context.disable_reference {
        implementations.push(Box::new(ReferenceImplementation));
    }
    implementations
}

/// Build an executor for `body` and select an implementation for `memory`.
pub fn subgraph_executor(body: Graph, memory: &MemoryArgs<'_>, context: Arc<ExecutorContext>) -> Result<SubgraphExecutor> {
    let implementations = subgraph_implementations(&context);
    VariableExecutor::new(body.name().to_string(), memory, SubgraphAttrs::new(body), context, implementations)
}

/// Zeroed result buffers for `body` evaluated over `srcs`.
pub fn result_buffers(body: &Graph, srcs: &[&Buffer]) -> Result<Vec<Buffer>> {
    let mut body = body.clone();
    let shapes: Vec<_> = srcs.iter().map(|b| b.port_shape()).collect();
    body.reshape_parameters(&shapes).context(IrSnafu)?;
    body.result_ports()
        .context(IrSnafu)?
        .iter()
        .map(|port| {
            let dims = to_static(&port.shape).context(DynamicResultSnafu { body: body.name() })?;
            Ok(Buffer::zeros(port.element_type, &dims))
        })
        .collect()
}
