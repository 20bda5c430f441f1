//! Reference interpreter for fused bodies.
//!
//! Values are computed in `f64` and rounded to each port's element type after
//! every op, so integer division truncates and `f32` results match a single
//! precision evaluation closely. Shapes are taken from the body's ports, which
//! the caller keeps in sync with the buffers.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;
use weld_ir::shape::{normalize_axis, static_shape, to_static};
use weld_ir::{ElementType, Graph, Node, Op, Output};

use crate::context::ExecutorContext;
use crate::error::*;
use crate::executor::{Executor, ExecutorImplementation, ImplementationKind};
use crate::memory::{Buffer, MemoryArgs};
use crate::subgraph::SubgraphAttrs;

/// Interpreter fallback; accepts any shapes its body can be reshaped to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceImplementation;

impl ExecutorImplementation<SubgraphAttrs> for ReferenceImplementation {
    fn name(&self) -> &str {
        "ref"
    }

    fn accepts_shapes(&self, attrs: &SubgraphAttrs, memory: &MemoryArgs<'_>) -> bool {
        attrs.accepts_inputs(memory)
    }

    fn create(
        &self,
        attrs: &SubgraphAttrs,
        _memory: &MemoryArgs<'_>,
        _context: &Arc<ExecutorContext>,
    ) -> Option<Box<dyn Executor>> {
        Some(Box::new(ReferenceExecutor::new(attrs.body.clone())))
    }
}

pub struct ReferenceExecutor {
    body: Graph,
    /// `body` reshaped to the last accepted input shapes.
    shaped: Option<Graph>,
}

impl ReferenceExecutor {
    pub fn new(body: Graph) -> Self {
        Self { body, shaped: None }
    }
}

impl Executor for ReferenceExecutor {
    fn update(&mut self, memory: &MemoryArgs<'_>) -> Result<bool> {
        self.shaped = None;
        let mut body = self.body.clone();
        if let Err(error) = body.reshape_parameters(&memory.src_shapes()) {
            debug!(body = body.name(), %error, "shapes rejected by the body");
            return Ok(false);
        }
        if let Some(node) = first_unsupported(&body) {
            debug!(body = body.name(), node, "no reference semantics");
            return Ok(false);
        }
        self.shaped = Some(body);
        Ok(true)
    }

    fn execute(&self, memory: &mut MemoryArgs<'_>) -> Result<()> {
        let body = self.shaped.as_ref().ok_or(Error::NotUpdated)?;
        let inputs = memory.srcs.iter().map(|b| Dense::from_buffer(b)).collect::<Result<Vec<_>>>()?;
        let outputs = evaluate(body, &inputs)?;
        ensure!(
            memory.dsts.len() == outputs.len(),
            BufferCountSnafu { what: "output", expected: outputs.len(), actual: memory.dsts.len() }
        );
        for (dst, value) in memory.dsts.iter_mut().zip(outputs) {
            ensure!(
                dst.shape() == value.shape.as_slice(),
                BufferSizeSnafu { element_type: dst.element_type(), shape: value.shape.to_vec(), len: dst.byte_len() }
            );
            dst.write_f64(&value.data)?;
        }
        Ok(())
    }

    fn implementation_kind(&self) -> ImplementationKind {
        ImplementationKind::Reference
    }
}

/// Name of the first node, nested bodies included, the interpreter cannot run.
fn first_unsupported(body: &Graph) -> Option<&str> {
    body.nodes().find_map(|node| match node.op() {
        Op::Fill(_) => Some(node.name()),
        Op::Subgraph(sg) => first_unsupported(sg.body()),
        _ => None,
    })
}

/// Dense row-major values of one port.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub shape: SmallVec<[usize; 4]>,
    pub data: Vec<f64>,
}

impl Dense {
    pub fn new(shape: &[usize], data: Vec<f64>) -> Self {
        Self { shape: shape.into(), data }
    }

    pub fn from_buffer(buffer: &Buffer) -> Result<Self> {
        Ok(Self::new(buffer.shape(), buffer.read_f64()?))
    }
}

/// Evaluate `body` over `inputs` (one per parameter); returns one value per result.
pub fn evaluate(body: &Graph, inputs: &[Dense]) -> Result<Vec<Dense>> {
    ensure!(
        inputs.len() == body.parameters().len(),
        BufferCountSnafu { what: "input", expected: body.parameters().len(), actual: inputs.len() }
    );

    let mut values: HashMap<Output, Dense> = HashMap::new();
    for id in body.ordered_ops().context(IrSnafu)? {
        let node = body.node(id).context(IrSnafu)?;
        let args = node
            .inputs()
            .iter()
            .map(|src| values.get(src).context(UnsupportedReferenceSnafu { op: format!("unbound input of {}", node.name()) }))
            .collect::<Result<Vec<_>>>()?;
        let outputs = match node.op() {
            Op::Parameter { .. } => {
                let index = body.parameter_index(id).context(UnsupportedReferenceSnafu { op: "detached Parameter" })?;
                let input = &inputs[index];
                let expected = port_dims(node, 0)?;
                ensure!(
                    input.shape == expected && input.data.len() == expected.iter().product::<usize>(),
                    ShapeMismatchSnafu { expected: expected.to_vec(), actual: input.shape.to_vec() }
                );
                vec![input.clone()]
            }
            Op::Result => continue,
            _ => eval_node(body, node, &args)?,
        };
        for (index, value) in outputs.into_iter().enumerate() {
            values.insert(Output::new(id, index), value);
        }
    }

    body.result_sources()
        .context(IrSnafu)?
        .into_iter()
        .map(|src| values.remove(&src).context(UnsupportedReferenceSnafu { op: "result without a value" }))
        .collect()
}

fn port_dims(node: &Node, index: usize) -> Result<SmallVec<[usize; 4]>> {
    node.outputs()
        .get(index)
        .and_then(|port| to_static(&port.shape))
        .context(UnsupportedReferenceSnafu { op: format!("dynamic shape at {}", node.name()) })
}

fn port_type(node: &Node, index: usize) -> ElementType {
    node.outputs().get(index).map_or(ElementType::F64, |p| p.element_type)
}

fn eval_node(body: &Graph, node: &Node, args: &[&Dense]) -> Result<Vec<Dense>> {
    let et = port_type(node, 0);
    let single = |data: Vec<f64>| -> Result<Vec<Dense>> {
        let shape = port_dims(node, 0)?;
        Ok(vec![Dense { shape, data: data.into_iter().map(|v| cast(v, et)).collect() }])
    };

    match node.op() {
        Op::Constant(c) => Ok(vec![Dense::new(c.dims(), c.values().to_vec())]),
        Op::Unary(op) => single(args[0].data.iter().map(|&x| op.apply(x)).collect()),
        Op::Binary(op) => {
            let shape = port_dims(node, 0)?;
            let (a, b) = (broadcast(args[0], &shape)?, broadcast(args[1], &shape)?);
            single(a.iter().zip(&b).map(|(&x, &y)| op.apply(x, y)).collect())
        }
        Op::Select => {
            let shape = port_dims(node, 0)?;
            let (c, t, e) = (broadcast(args[0], &shape)?, broadcast(args[1], &shape)?, broadcast(args[2], &shape)?);
            single(c.iter().zip(t.iter().zip(&e)).map(|(&c, (&t, &e))| if c != 0.0 { t } else { e }).collect())
        }
        Op::Convert { .. } => single(args[0].data.clone()),
        Op::FakeQuantize { levels } => {
            let shape = port_dims(node, 0)?;
            let columns = args.iter().map(|a| broadcast(a, &shape)).collect::<Result<Vec<_>>>()?;
            let steps = levels.saturating_sub(1).max(1) as f64;
            let data = (0..columns[0].len())
                .map(|i| {
                    let (x, il, ih, ol, oh) = (columns[0][i], columns[1][i], columns[2][i], columns[3][i], columns[4][i]);
                    if x <= il.min(ih) {
                        ol
                    } else if x > il.max(ih) {
                        oh
                    } else {
                        ((x - il) / (ih - il) * steps).round() / steps * (oh - ol) + ol
                    }
                })
                .collect();
            single(data)
        }
        Op::Transpose => {
            let order = body
                .constant(node.inputs()[1].node)
                .context(UnsupportedReferenceSnafu { op: "Transpose with a computed order" })?
                .as_i64_vec();
            single(transpose(args[0], &order))
        }
        Op::Softmax { axis } => {
            let x = args[0];
            let axis = normalize_axis(*axis, x.shape.len()).context(UnsupportedReferenceSnafu { op: "Softmax axis" })?;
            single(softmax(x, axis))
        }
        Op::MatMul { transpose_a, transpose_b } => {
            let shape = port_dims(node, 0)?;
            single(matmul(args[0], args[1], &shape, *transpose_a, *transpose_b))
        }
        Op::Split { axis, num_splits } => {
            let x = args[0];
            let axis = normalize_axis(*axis, x.shape.len()).context(UnsupportedReferenceSnafu { op: "Split axis" })?;
            (0..*num_splits)
                .map(|part| {
                    let shape = port_dims(node, part)?;
                    let et = port_type(node, part);
                    let data = split_part(x, axis, *num_splits, part).into_iter().map(|v| cast(v, et)).collect();
                    Ok(Dense { shape, data })
                })
                .collect()
        }
        Op::BroadcastLoad(load) => {
            let index = load.offset / et.bytes().max(1);
            let value = args[0].data.get(index).copied().context(UnsupportedReferenceSnafu {
                op: format!("BroadcastLoad offset {} past the input", load.offset),
            })?;
            let len = port_dims(node, 0)?.iter().product();
            single(vec![value; len])
        }
        Op::VectorBuffer(_) => single(vec![0.0]),
        Op::Subgraph(sg) => {
            let inputs: Vec<Dense> = args.iter().map(|&a| a.clone()).collect();
            let shapes: Vec<_> = inputs.iter().map(|d| static_shape(&d.shape)).collect();
            let ports = sg.body().parameter_ports().context(IrSnafu)?;
            if ports.iter().map(|p| &p.shape).eq(shapes.iter()) {
                return evaluate(sg.body(), &inputs);
            }
            let mut body = sg.body().clone();
            body.reshape_parameters(&shapes).context(IrSnafu)?;
            evaluate(&body, &inputs)
        }
        other => UnsupportedReferenceSnafu { op: other.name() }.fail(),
    }
}

/// Round `value` the way storing it as `element_type` would.
pub fn cast(value: f64, element_type: ElementType) -> f64 {
    match element_type {
        ElementType::Boolean => f64::from(value != 0.0),
        ElementType::I8 => value as i8 as f64,
        ElementType::U8 => value as u8 as f64,
        ElementType::I16 => value as i16 as f64,
        ElementType::U16 => value as u16 as f64,
        ElementType::I32 => value as i32 as f64,
        ElementType::U32 => value as u32 as f64,
        ElementType::I64 => value as i64 as f64,
        ElementType::U64 => value as u64 as f64,
        ElementType::F16 | ElementType::BF16 | ElementType::F32 => value as f32 as f64,
        ElementType::F64 => value,
    }
}

/// Numpy-broadcast `src` to `shape`.
pub fn broadcast(src: &Dense, shape: &[usize]) -> Result<Vec<f64>> {
    let fits = src.data.len() == src.shape.iter().product::<usize>()
        && src.shape.len() <= shape.len()
        && src.shape.iter().rev().zip(shape.iter().rev()).all(|(&s, &d)| s == d || s == 1);
    ensure!(fits, ShapeMismatchSnafu { expected: shape.to_vec(), actual: src.shape.to_vec() });
    if src.shape.as_slice() == shape {
        return Ok(src.data.clone());
    }
    let strides = broadcast_strides(&src.shape, shape.len());
    let total: usize = shape.iter().product();
    Ok((0..total).map(|flat| src.data[offset_of(flat, shape, &strides)]).collect())
}

/// Row-major strides of `shape` right-aligned to `rank`, zero on broadcast dims.
fn broadcast_strides(shape: &[usize], rank: usize) -> Vec<usize> {
    let mut strides = vec![0; rank];
    let lead = rank.saturating_sub(shape.len());
    let mut acc = 1;
    for (i, &dim) in shape.iter().enumerate().rev() {
        if let Some(slot) = strides.get_mut(i + lead) {
            *slot = if dim == 1 { 0 } else { acc };
        }
        acc *= dim;
    }
    strides
}

fn offset_of(mut flat: usize, shape: &[usize], strides: &[usize]) -> usize {
    let mut offset = 0;
    for (&dim, &stride) in shape.iter().zip(strides).rev() {
        offset += (flat % dim) * stride;
        flat /= dim;
    }
    offset
}

fn transpose(x: &Dense, order: &[i64]) -> Vec<f64> {
    let rank = x.shape.len();
    let order: Vec<usize> = if order.is_empty() {
        (0..rank).rev().collect()
    } else {
        order.iter().filter_map(|&a| normalize_axis(a, rank)).collect()
    };
    let out_shape: Vec<usize> = order.iter().map(|&a| x.shape[a]).collect();
    let in_strides = broadcast_strides(&x.shape, rank);
    let strides: Vec<usize> = order.iter().map(|&a| in_strides[a]).collect();
    (0..x.data.len()).map(|flat| x.data[offset_of(flat, &out_shape, &strides)]).collect()
}

fn softmax(x: &Dense, axis: usize) -> Vec<f64> {
    let dim = x.shape[axis];
    let inner: usize = x.shape[axis + 1..].iter().product();
    let outer: usize = x.shape[..axis].iter().product();
    let mut out = vec![0.0; x.data.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |d: usize| o * dim * inner + d * inner + i;
            let max = (0..dim).map(|d| x.data[at(d)]).fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = (0..dim).map(|d| (x.data[at(d)] - max).exp()).sum();
            for d in 0..dim {
                out[at(d)] = (x.data[at(d)] - max).exp() / sum;
            }
        }
    }
    out
}

fn matmul(a: &Dense, b: &Dense, out_shape: &[usize], transpose_a: bool, transpose_b: bool) -> Vec<f64> {
    let rank = out_shape.len();
    let (m, n) = (out_shape[rank - 2], out_shape[rank - 1]);
    let (ra, rb) = (a.shape.len(), b.shape.len());
    let k = if transpose_a { a.shape[ra - 2] } else { a.shape[ra - 1] };
    let batch_shape = &out_shape[..rank - 2];
    let a_batch = broadcast_strides(&a.shape[..ra - 2], batch_shape.len());
    let b_batch = broadcast_strides(&b.shape[..rb - 2], batch_shape.len());
    let batches: usize = batch_shape.iter().product();

    let mut out = Vec::with_capacity(batches * m * n);
    for batch in 0..batches {
        let a_base = offset_of(batch, batch_shape, &a_batch) * a.shape[ra - 2] * a.shape[ra - 1];
        let b_base = offset_of(batch, batch_shape, &b_batch) * b.shape[rb - 2] * b.shape[rb - 1];
        for row in 0..m {
            for col in 0..n {
                let dot = (0..k)
                    .map(|i| {
                        let lhs = if transpose_a { a.data[a_base + i * m + row] } else { a.data[a_base + row * k + i] };
                        let rhs = if transpose_b { b.data[b_base + col * k + i] } else { b.data[b_base + i * n + col] };
                        lhs * rhs
                    })
                    .sum();
                out.push(dot);
            }
        }
    }
    out
}

fn split_part(x: &Dense, axis: usize, num_splits: usize, part: usize) -> Vec<f64> {
    let dim = x.shape[axis];
    let chunk = dim / num_splits;
    let inner: usize = x.shape[axis + 1..].iter().product();
    let outer: usize = x.shape[..axis].iter().product();
    let mut out = Vec::with_capacity(outer * chunk * inner);
    for o in 0..outer {
        let start = o * dim * inner + part * chunk * inner;
        out.extend_from_slice(&x.data[start..start + chunk * inner]);
    }
    out
}
