use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use weld_ir::{Graph, NodeId, Op, Output, Subgraph};

use super::{remove_orphan_constants, result_name, should_inline_constant};
use crate::budget::fake_quantize_hidden_count;
use crate::error::*;

/// Collapse a pre-selected chain of nodes into one fused node.
///
/// `ops` must be in execution order. Each input read from outside the chain gets
/// its own body parameter; inlinable constants are copied into the body. Only the
/// last node's outputs leave the body. Chain members still read from outside are
/// kept in the graph.
#[tracing::instrument(skip_all, fields(len = ops.len()))]
pub fn tokenize_ordered_nodes(graph: &mut Graph, ops: &[NodeId]) -> Result<NodeId> {
    let (&last, _) = ops.split_last().context(EmptyChainSnafu)?;
    let last_node = graph.node(last).context(IrSnafu)?.clone();

    let mut body = Graph::new(last_node.name());
    let mut external: SmallVec<[Output; 4]> = SmallVec::new();
    let mut copies: HashMap<NodeId, NodeId> = HashMap::new();
    let mut inlined = Vec::new();
    let mut fused_names = String::new();
    let mut hidden = 0;

    for &id in ops {
        let node = graph.node(id).context(IrSnafu)?;
        let mut inputs: SmallVec<[Output; 4]> = SmallVec::new();
        for (index, &src) in node.inputs().iter().enumerate() {
            if let Some(&copy) = copies.get(&src.node) {
                inputs.push(Output::new(copy, src.index));
            } else if should_inline_constant(graph, node.op(), index, src) {
                let constant = graph.node(src.node).context(IrSnafu)?;
                inputs.push(body.insert_node(constant, &[]).context(IrSnafu)?.into());
                inlined.push(src.node);
            } else {
                let port = graph.output_port(src).context(IrSnafu)?;
                inputs.push(body.add_parameter(node.name(), port.element_type, port.shape.clone()).into());
                external.push(src);
            }
        }
        copies.insert(id, body.insert_node(node, &inputs).context(IrSnafu)?);
        fused_names.push_str(node.name());
        fused_names.push(',');
        hidden += fake_quantize_hidden_count(graph, id)?;
    }

    let tail = copies[&last];
    let outputs = body.node(tail).context(IrSnafu)?.outputs().len();
    ensure!(
        outputs == last_node.outputs().len(),
        OutputArityMismatchSnafu { node: last_node.name(), original: last_node.outputs().len(), rebuilt: outputs }
    );
    for index in 0..outputs {
        body.add_result(result_name(last_node.name(), index), Output::new(tail, index)).context(IrSnafu)?;
    }

    let mut subgraph = Subgraph::new(body);
    subgraph.set_virtual_port_count(hidden);
    let sg = graph.add_op(last_node.name(), Op::Subgraph(Box::new(subgraph)), &external).context(IrSnafu)?;
    let rt_info = graph.node_mut(sg).context(IrSnafu)?.rt_info_mut();
    *rt_info = last_node.rt_info().clone();
    rt_info.set_original_layers_names(fused_names);

    graph.replace_node(last, sg).context(IrSnafu)?;
    for &id in ops.iter().rev() {
        if graph.contains(id) && graph.users(id).is_empty() {
            graph.remove_node(id).context(IrSnafu)?;
        }
    }
    remove_orphan_constants(graph, inlined)?;

    tracing::debug!(subgraph = %sg, inputs = external.len(), outputs, "chain tokenized");
    Ok(sg)
}
