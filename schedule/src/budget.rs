//! Data-pointer budget accounting.
//!
//! Every parameter, result, non-scalar hidden constant and distinct scratch buffer
//! of a fused kernel occupies one general-purpose register holding a data pointer.

use snafu::{OptionExt, ResultExt};
use weld_ir::{ElementType, Graph, Input, NodeId, Op, Output};

use crate::config::TokenizationConfig;
use crate::error::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceEstimate {
    pub parameters: usize,
    pub results: usize,
    pub hidden: usize,
    pub buffers: usize,
}

impl ResourceEstimate {
    pub fn total(&self) -> usize {
        self.parameters + self.results + self.hidden + self.buffers
    }

    pub fn fits(&self, config: &TokenizationConfig) -> bool {
        self.total() <= config.data_ptr_gpr_count
    }
}

/// Estimate for an existing fused node.
pub fn estimate_subgraph(graph: &Graph, id: NodeId) -> Result<ResourceEstimate> {
    let sg = graph.node(id).context(IrSnafu)?.op().as_subgraph().context(NotASubgraphSnafu { id })?;
    let body = sg.body();
    let buffers = if sg.has_domain_sensitive_ops() {
        let order = body.ordered_ops().context(IrSnafu)?;
        estimated_buffer_count(order.iter().map(|&op| (body, op)))
    } else {
        0
    };
    Ok(ResourceEstimate {
        parameters: body.parameters().len(),
        results: body.results().len(),
        hidden: sg.virtual_port_count(),
        buffers,
    })
}

/// Scratch buffers the lowering of `ops` will allocate.
///
/// Transposes need a buffer unless they read a parameter or feed a result; softmax
/// keeps its in-place f32 buffers; every matmul operand and output that is not a
/// boundary gets a unique buffer. Neighbouring buffers of equal element size are
/// shared, except around matmuls.
pub fn estimated_buffer_count<'g>(ops: impl IntoIterator<Item = (&'g Graph, NodeId)>) -> usize {
    fn push_shared(sizes: &mut Vec<usize>, size: usize) {
        if sizes.last() != Some(&size) {
            sizes.push(size);
        }
    }

    let mut sizes: Vec<usize> = Vec::new();

    for (graph, id) in ops {
        let Some(node) = graph.get(id) else { continue };
        match node.op() {
            Op::Transpose => {
                let feeds_result = feeds_result(graph, id);
                let reads_parameter = input_is_parameter(graph, id, 0);
                if !feeds_result && !reads_parameter {
                    push_shared(&mut sizes, node.outputs()[0].element_type.bytes());
                }
            }
            Op::Softmax { .. } => push_shared(&mut sizes, ElementType::F32.bytes()),
            Op::MatMul { .. } => {
                for index in 0..2 {
                    if !input_is_parameter(graph, id, index)
                        && let Ok(src) = graph.input_value(Input::new(id, index))
                        && let Ok(port) = graph.output_port(src)
                    {
                        sizes.push(port.element_type.bytes());
                    }
                }
                if !feeds_result(graph, id) {
                    sizes.push(node.outputs()[0].element_type.bytes());
                }
            }
            _ => {}
        }
    }
    sizes.len()
}

fn feeds_result(graph: &Graph, id: NodeId) -> bool {
    graph.consumers(Output::new(id, 0)).iter().any(|c| graph.get(c.node).is_some_and(|n| n.op().is_result()))
}

fn input_is_parameter(graph: &Graph, id: NodeId, index: usize) -> bool {
    graph
        .input_value(Input::new(id, index))
        .ok()
        .and_then(|src| graph.get(src.node))
        .is_some_and(|n| n.op().is_parameter())
}

/// Non-scalar constants a FakeQuantize decomposition materializes (0..=6).
///
/// The decomposition computes crop bounds, input scale/shift and output
/// scale/shift from the four range inputs. A derived term is non-scalar when its
/// values differ across channels. When the output mapping is the identity on the
/// integer grid (unit scale, integral shift) the output terms are folded away.
/// Non-constant ranges cannot be decomposed ahead of time and count as zero.
pub fn fake_quantize_hidden_count(graph: &Graph, id: NodeId) -> Result<usize> {
    let node = graph.node(id).context(IrSnafu)?;
    let Op::FakeQuantize { levels } = *node.op() else { return Ok(0) };
    if levels < 2 {
        return Ok(0);
    }

    let mut ranges = Vec::with_capacity(4);
    for index in 1..=4 {
        let src = graph.input_value(Input::new(id, index)).context(IrSnafu)?;
        match graph.constant(src.node) {
            Some(c) => ranges.push(c.values().to_vec()),
            None => return Ok(0),
        }
    }
    let steps = (levels - 1) as f64;
    let (il, ih, ol, oh) = (&ranges[0], &ranges[1], &ranges[2], &ranges[3]);

    let input_scale = zip_broadcast(il, ih, |l, h| steps / (h - l));
    let input_shift = zip_broadcast(il, ih, |l, h| -l * steps / (h - l));
    let output_scale = zip_broadcast(ol, oh, |l, h| (h - l) / steps);
    let output_shift = ol.clone();

    let optimized = output_scale.iter().all(|&s| s == 1.0) && output_shift.iter().all(|&s| s.fract() == 0.0);

    let mut count = [il, ih, &input_scale, &input_shift].into_iter().filter(|v| !is_uniform(v)).count();
    if !optimized {
        count += [&output_scale, &output_shift].into_iter().filter(|v| !is_uniform(v)).count();
    }
    Ok(count)
}

fn zip_broadcast(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let len = a.len().max(b.len());
    (0..len).map(|i| f(a[i % a.len()], b[i % b.len()])).collect()
}

fn is_uniform(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}
