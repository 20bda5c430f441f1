//! Body lowering: op selection and register allocation.
//!
//! A body is lowered twice from the same allocation: once for full-width
//! iterations and once for the tail of `work_amount % lanes` elements, where
//! loads and stores touch only the leading lanes and a zero [`Fill`] clears the
//! rest.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

use smallvec::smallvec;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;
use weld_ir::shape::shape_size;
use weld_ir::{ElementType, Fill, Graph, Input, NodeId, Op, Output, PortInfo};

use crate::config::KernelConfig;
use crate::emitter::{
    BinaryEmitter, BroadcastLoadEmitter, ConstantEmitter, ConstantTable, DebugEmitter, EmitArgs, EmitLocation,
    Emitter, FillEmitter, LoadEmitter, StoreEmitter, TraceEmitter, UnaryEmitter, VectorBufferEmitter,
};
use crate::error::*;
use crate::isa::Isa;
use crate::regs::{Gpr, Reg, RegistersPool, VecReg};

/// One emitter bound to its registers.
#[derive(Debug)]
pub struct Step {
    pub node: NodeId,
    pub emitter: Box<dyn Emitter>,
    pub args: EmitArgs,
}

/// Everything the JIT needs to generate one kernel.
#[derive(Debug)]
pub struct KernelProgram {
    pub name: String,
    pub isa: Isa,
    pub work_amount: usize,
    pub lanes: usize,
    /// One per kernel argument: body parameters, then body results.
    pub data_ptrs: Vec<Gpr>,
    /// Bytes each data pointer advances per full iteration.
    pub strides: Vec<i64>,
    pub vec_count: usize,
    pub gpr_count: usize,
    pub main: Vec<Step>,
    pub tail: Vec<Step>,
    pub table: ConstantTable,
    /// Trace slot written by instrumentation when debug capabilities are on.
    pub trace: Option<Box<AtomicU64>>,
    /// `emitter:node` label per trace sequence number, starting at 1.
    pub labels: Vec<String>,
}

impl KernelProgram {
    pub fn iterations(&self) -> usize {
        if self.lanes == 0 { 0 } else { self.work_amount / self.lanes }
    }

    pub fn tail_count(&self) -> usize {
        if self.lanes == 0 { 0 } else { self.work_amount % self.lanes }
    }
}

/// How a body parameter is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Spans the iteration domain; advanced every iteration.
    Stream,
    /// Single element, splat into a register once per iteration.
    Scalar,
    /// Only addressed by explicit broadcast loads.
    Pointer,
}

pub fn is_jit_element_type(element_type: ElementType) -> bool {
    matches!(element_type, ElementType::F32 | ElementType::I32 | ElementType::U32)
}

/// Lower a fused body for `isa`.
#[tracing::instrument(skip_all, fields(body = body.name(), isa = %isa))]
pub fn lower(body: &Graph, isa: Isa, config: &KernelConfig) -> Result<KernelProgram> {
    let lanes = isa.lanes(ElementType::F32);
    let work_amount = work_amount(body)?;
    let access = classify_parameters(body, work_amount)?;
    let order = body.ordered_ops().context(IrSnafu)?;

    let trace = config.debug_caps.then(|| Box::new(AtomicU64::new(0)));
    let lowering = Lowering { body, isa, lanes, access: &access, order: &order };

    let (main, data_ptrs, gpr_count) = lowering.steps(lanes)?;
    let tail_count = work_amount % lanes;
    let tail = if tail_count > 0 { lowering.steps(tail_count)?.0 } else { Vec::new() };

    let mut labels = Vec::new();
    let (main, tail) = match &trace {
        Some(slot) => {
            let main = instrument(body, main, slot, &mut labels);
            let tail = instrument(body, tail, slot, &mut labels);
            (main, tail)
        }
        None => (main, tail),
    };

    let mut table = ConstantTable::new();
    for step in main.iter().chain(&tail) {
        step.emitter.emit_data(&mut table);
    }

    let strides = body
        .parameters()
        .iter()
        .map(|p| access[p])
        .map(|a| if a == Access::Stream { isa.vlen() as i64 } else { 0 })
        .chain(body.results().iter().map(|_| isa.vlen() as i64))
        .collect();

    debug!(
        kernel.name = body.name(),
        work_amount,
        lanes,
        main = main.len(),
        tail = tail.len(),
        constants = table.len(),
        "body lowered"
    );

    Ok(KernelProgram {
        name: body.name().to_string(),
        isa,
        work_amount,
        lanes,
        data_ptrs,
        strides,
        vec_count: isa.vec_reg_count(),
        gpr_count,
        main,
        tail,
        table,
        trace,
        labels,
    })
}

fn check_port(node: NodeId, port: &PortInfo) -> Result<usize> {
    ensure!(is_jit_element_type(port.element_type), UnsupportedElementTypeSnafu { element_type: port.element_type });
    shape_size(&port.shape).context(DynamicShapeSnafu { node })
}

/// Every result must cover the same number of elements.
fn work_amount(body: &Graph) -> Result<usize> {
    let mut work = None;
    for &result in body.results() {
        let source = body.input_value(Input::new(result, 0)).context(IrSnafu)?;
        let size = check_port(result, body.output_port(source).context(IrSnafu)?)?;
        match work {
            None => work = Some(size),
            Some(work_amount) => ensure!(size == work_amount, UnsupportedLayoutSnafu { node: result, size, work_amount }),
        }
    }
    Ok(work.unwrap_or(0))
}

fn classify_parameters(body: &Graph, work_amount: usize) -> Result<HashMap<NodeId, Access>> {
    let mut access = HashMap::new();
    for &param in body.parameters() {
        let size = check_port(param, body.output_port(Output::from(param)).context(IrSnafu)?)?;
        let users = body.users(param);
        let only_broadcast = !users.is_empty()
            && users.iter().all(|&u| body.get(u).is_some_and(|n| matches!(n.op(), Op::BroadcastLoad(_))));
        let kind = if only_broadcast {
            Access::Pointer
        } else if size == work_amount {
            Access::Stream
        } else if size == 1 {
            Access::Scalar
        } else {
            return UnsupportedLayoutSnafu { node: param, size, work_amount }.fail();
        };
        access.insert(param, kind);
    }
    Ok(access)
}

fn instrument(body: &Graph, steps: Vec<Step>, slot: &AtomicU64, labels: &mut Vec<String>) -> Vec<Step> {
    steps
        .into_iter()
        .map(|step| {
            let node_name = body.get(step.node).map_or("?", |n| n.name());
            labels.push(format!("{}:{}", step.emitter.name(), node_name));
            let trace = TraceEmitter::new(slot, labels.len() as u64);
            let emitter = DebugEmitter::new(step.emitter, Box::new(trace), EmitLocation::Before);
            Step { node: step.node, emitter: Box::new(emitter), args: step.args }
        })
        .collect()
}

struct Lowering<'a> {
    body: &'a Graph,
    isa: Isa,
    lanes: usize,
    access: &'a HashMap<NodeId, Access>,
    order: &'a [NodeId],
}

impl Lowering<'_> {
    /// Steps for iterations touching `count` elements, plus the data pointer
    /// registers and the GPR file size.
    fn steps(&self, count: usize) -> Result<(Vec<Step>, Vec<Gpr>, usize)> {
        let body = self.body;
        let mut pool = RegistersPool::for_isa(self.isa);
        let data_ptrs = pool.acquire_gprs(body.parameters().len() + body.results().len())?;
        let ptr_of = |id: NodeId| -> Option<Gpr> {
            body.parameter_index(id)
                .or_else(|| body.result_index(id).map(|i| body.parameters().len() + i))
                .map(|i| data_ptrs[i])
        };

        let mut uses: HashMap<Output, usize> = HashMap::new();
        for node in body.nodes() {
            for &src in node.inputs() {
                *uses.entry(src).or_default() += 1;
            }
        }
        let mut values: HashMap<Output, VecReg> = HashMap::new();
        let mut steps = Vec::new();

        for &id in self.order {
            let node = body.node(id).context(IrSnafu)?;
            let value = |src: &Output| values.get(src).copied().context(UnboundValueSnafu { node: src.node });

            let (emitter, inputs): (Box<dyn Emitter>, smallvec::SmallVec<[Reg; 4]>) = match node.op() {
                Op::Parameter { .. } => {
                    let ptr = ptr_of(id).context(UnboundValueSnafu { node: id })?;
                    match self.access[&id] {
                        Access::Pointer => continue,
                        _ if !uses.contains_key(&Output::from(id)) => continue,
                        Access::Stream => (Box::new(LoadEmitter::new(count)), smallvec![ptr.into()]),
                        Access::Scalar => (Box::new(BroadcastLoadEmitter::new(0)), smallvec![ptr.into()]),
                    }
                }
                Op::Result => {
                    let src = value(&node.inputs()[0])?;
                    let ptr = ptr_of(id).context(UnboundValueSnafu { node: id })?;
                    let args = EmitArgs { inputs: smallvec![src.into()], outputs: smallvec![ptr.into()], ..Default::default() };
                    steps.push(Step { node: id, emitter: Box::new(StoreEmitter::new(count)), args });
                    release_inputs(&mut pool, &mut uses, &values, node.inputs());
                    continue;
                }
                Op::Constant(constant) => {
                    let bits = constant.lane_bits().context(UnsupportedOpSnafu {
                        op: format!("Constant {} of {} elements", constant.element_type(), constant.len()),
                    })?;
                    (Box::new(ConstantEmitter::new(format!("{}#{}", node.name(), id.index()), bits)), smallvec![])
                }
                Op::Unary(op) => {
                    let et = body.output_port(node.inputs()[0]).context(IrSnafu)?.element_type;
                    (Box::new(UnaryEmitter::new(*op, et)?), smallvec![value(&node.inputs()[0])?.into()])
                }
                Op::Binary(op) => {
                    let et = body.output_port(node.inputs()[0]).context(IrSnafu)?.element_type;
                    let (lhs, rhs) = (value(&node.inputs()[0])?, value(&node.inputs()[1])?);
                    (Box::new(BinaryEmitter::new(*op, et)?), smallvec![lhs.into(), rhs.into()])
                }
                Op::BroadcastLoad(load) => {
                    let source = node.inputs()[0].node;
                    let ptr = ptr_of(source)
                        .filter(|_| self.access.get(&source) == Some(&Access::Pointer))
                        .context(UnsupportedOpSnafu { op: "BroadcastLoad of a streamed value".to_string() })?;
                    (Box::new(BroadcastLoadEmitter::from_op(load)), smallvec![ptr.into()])
                }
                Op::VectorBuffer(buffer) => {
                    (Box::new(VectorBufferEmitter { element_type: buffer.element_type }), smallvec![])
                }
                Op::Fill(fill) => (Box::new(FillEmitter::new(*fill)), smallvec![value(&node.inputs()[0])?.into()]),
                other => return UnsupportedOpSnafu { op: other.name().to_string() }.fail(),
            };

            let dst = pool.acquire_vec()?;
            let args = EmitArgs {
                inputs,
                outputs: smallvec![dst.into()],
                aux_vecs: pool.acquire_vecs(emitter.aux_vec_count())?.into_iter().collect(),
                aux_gprs: pool.acquire_gprs(emitter.aux_gpr_count())?.into_iter().collect(),
            };
            release_aux(&mut pool, &args);
            steps.push(Step { node: id, emitter, args });
            values.insert(Output::from(id), dst);

            if count < self.lanes && self.access.get(&id) == Some(&Access::Stream) {
                let fill = FillEmitter::new(Fill::new(count, 0));
                let args = EmitArgs { inputs: smallvec![dst.into()], outputs: smallvec![dst.into()], ..Default::default() };
                steps.push(Step { node: id, emitter: Box::new(fill), args });
            }

            release_inputs(&mut pool, &mut uses, &values, node.inputs());
            if !uses.contains_key(&Output::from(id)) {
                pool.release_vec(dst);
            }
        }

        Ok((steps, data_ptrs, pool.gpr_count()))
    }
}

/// Scratch registers live only for the duration of one emission.
fn release_aux(pool: &mut RegistersPool, args: &EmitArgs) {
    for &reg in &args.aux_vecs {
        pool.release_vec(reg);
    }
    for &reg in &args.aux_gprs {
        pool.release_gpr(reg);
    }
}

fn release_inputs(
    pool: &mut RegistersPool,
    uses: &mut HashMap<Output, usize>,
    values: &HashMap<Output, VecReg>,
    inputs: &[Output],
) {
    for src in inputs {
        let Some(remaining) = uses.get_mut(src) else { continue };
        *remaining -= 1;
        if *remaining == 0 {
            uses.remove(src);
            if let Some(&reg) = values.get(src) {
                pool.release_vec(reg);
            }
        }
    }
}
