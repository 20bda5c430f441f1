//! JIT kernel executor for one hardware profile.
//!
//! Kernels are generated per distinct set of input shapes and kept for the
//! executor's lifetime, so shapes that come back reuse their kernel. Shapes a
//! kernel cannot be generated for are remembered too and declined at once.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tracing::debug;
use weld_codegen::kernel::is_jit_element_type;
use weld_codegen::{CompiledKernel, Isa, KernelConfig, compile_for};
use weld_ir::shape::{shape_size, to_static};
use weld_ir::{Graph, Op, PortInfo};

use crate::context::ExecutorContext;
use crate::error::*;
use crate::executor::{Executor, ExecutorImplementation, ImplementationKind};
use crate::memory::{Buffer, MemoryArgs};
use crate::subgraph::SubgraphAttrs;

type ShapeKey = Vec<SmallVec<[usize; 4]>>;

pub struct JitImplementation {
    isa: Isa,
    name: String,
}

impl JitImplementation {
    pub fn new(isa: Isa) -> Self {
        Self { isa, name: ImplementationKind::Jit(isa).to_string() }
    }
}

impl ExecutorImplementation<SubgraphAttrs> for JitImplementation {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_shapes(&self, attrs: &SubgraphAttrs, memory: &MemoryArgs<'_>) -> bool {
        self.isa.is_supported()
            && attrs.accepts_inputs(memory)
            && memory.srcs.iter().all(|b| is_jit_element_type(b.element_type()) && !b.is_empty())
    }

    fn create(
        &self,
        attrs: &SubgraphAttrs,
        _memory: &MemoryArgs<'_>,
        context: &Arc<ExecutorContext>,
    ) -> Option<Box<dyn Executor>> {
        let results = attrs.body.result_ports().ok()?;
        if results.is_empty() || !results.iter().all(|port| is_jit_element_type(port.element_type)) {
            return None;
        }
        let config = KernelConfig { isa: Some(self.isa), ..context.kernel_config };
        Some(Box::new(JitExecutor::new(attrs.body.clone(), self.isa, config)))
    }
}

/// A kernel together with the exact buffer layout it was generated for.
#[derive(Debug)]
struct ShapeKernel {
    kernel: CompiledKernel,
    params: Vec<Port>,
    results: Vec<Port>,
}

#[derive(Debug, Clone, PartialEq)]
struct Port {
    element_type: weld_ir::ElementType,
    dims: SmallVec<[usize; 4]>,
}

impl Port {
    fn from_info(info: &PortInfo) -> Option<Self> {
        Some(Self { element_type: info.element_type, dims: to_static(&info.shape)? })
    }

    fn check(&self, buffer: &Buffer) -> Result<()> {
        ensure!(
            buffer.element_type() == self.element_type,
            ElementTypeMismatchSnafu { expected: self.element_type, actual: buffer.element_type() }
        );
        ensure!(
            buffer.shape() == self.dims.as_slice(),
            BufferSizeSnafu { element_type: self.element_type, shape: self.dims.to_vec(), len: buffer.byte_len() }
        );
        Ok(())
    }
}

pub struct JitExecutor {
    body: Graph,
    isa: Isa,
    config: KernelConfig,
    kernels: HashMap<ShapeKey, Option<Arc<ShapeKernel>>>,
    active: Option<Arc<ShapeKernel>>,
}

impl JitExecutor {
    pub fn new(body: Graph, isa: Isa, config: KernelConfig) -> Self {
        Self { body, isa, config, kernels: HashMap::new(), active: None }
    }

    /// Number of distinct shape sets a kernel was generated for.
    pub fn kernel_count(&self) -> usize {
        self.kernels.values().filter(|k| k.is_some()).count()
    }

    fn prepare(&self, memory: &MemoryArgs<'_>) -> Result<Option<ShapeKernel>> {
        let mut body = self.body.clone();
        body.reshape_parameters(&memory.src_shapes()).context(IrSnafu)?;
        if !broadcast_loads_in_bounds(&body) {
            debug!(body = body.name(), "broadcast load past its source");
            return Ok(None);
        }

        let kernel = match compile_for(&body, self.isa, &self.config) {
            Ok(kernel) => kernel,
            Err(error) => {
                debug!(body = body.name(), isa = %self.isa, %error, "kernel generation declined");
                return Ok(None);
            }
        };
        let ports = |ports: weld_ir::Ports| ports.iter().map(Port::from_info).collect::<Option<Vec<_>>>();
        let (Some(params), Some(results)) =
            (ports(body.parameter_ports().context(IrSnafu)?), ports(body.result_ports().context(IrSnafu)?))
        else {
            return Ok(None);
        };
        Ok(Some(ShapeKernel { kernel, params, results }))
    }
}

/// Every `BroadcastLoad` reads inside its source parameter.
fn broadcast_loads_in_bounds(body: &Graph) -> bool {
    body.nodes().all(|node| {
        let Op::BroadcastLoad(load) = node.op() else { return true };
        let Some(&src) = node.inputs().first() else { return false };
        let Ok(port) = body.output_port(src) else { return false };
        shape_size(&port.shape).is_some_and(|len| load.offset + port.element_type.bytes() <= len * port.element_type.bytes())
    })
}

impl Executor for JitExecutor {
    fn update(&mut self, memory: &MemoryArgs<'_>) -> Result<bool> {
        let key: ShapeKey = memory.srcs.iter().map(|b| SmallVec::from_slice(b.shape())).collect();
        let entry = match self.kernels.get(&key) {
            Some(entry) => entry.clone(),
            None => {
                let entry = self.prepare(memory)?.map(Arc::new);
                self.kernels.insert(key, entry.clone());
                entry
            }
        };
        self.active = entry;
        Ok(self.active.is_some())
    }

    fn execute(&self, memory: &mut MemoryArgs<'_>) -> Result<()> {
        let prepared = self.active.as_ref().ok_or(Error::NotUpdated)?;
        ensure!(
            memory.srcs.len() == prepared.params.len(),
            BufferCountSnafu { what: "input", expected: prepared.params.len(), actual: memory.srcs.len() }
        );
        ensure!(
            memory.dsts.len() == prepared.results.len(),
            BufferCountSnafu { what: "output", expected: prepared.results.len(), actual: memory.dsts.len() }
        );
        for (port, buffer) in prepared.params.iter().zip(&memory.srcs) {
            port.check(buffer)?;
        }
        for (port, buffer) in prepared.results.iter().zip(&memory.dsts) {
            port.check(buffer)?;
        }

        let args: SmallVec<[*mut u8; 8]> = memory
            .srcs
            .iter()
            .map(|b| b.as_ptr().cast_mut())
            .chain(memory.dsts.iter_mut().map(|b| b.as_mut_ptr()))
            .collect();
        // SAFETY: every buffer matches the port layout the kernel was generated
        // for. Inputs are only read. Outputs are distinct `&mut` borrows.
        unsafe { prepared.kernel.execute(&args) }.context(CodegenSnafu)
    }

    fn implementation_kind(&self) -> ImplementationKind {
        ImplementationKind::Jit(self.isa)
    }
}
