use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use weld_ir::{Graph, NodeId, Op, Output, Subgraph};

use super::{inherited_names, remove_orphan_constants, result_name, should_inline_constant};
use crate::budget::fake_quantize_hidden_count;
use crate::error::*;

/// Replace `id` by a subgraph whose body holds only a copy of it.
///
/// Every non-inlined input becomes one body parameter, every output one body
/// result. The new node takes over the name and metadata of `id`. Graph
/// parameters and results are rejected.
pub fn wrap_node(graph: &mut Graph, id: NodeId) -> Result<NodeId> {
    let node = graph.node(id).context(IrSnafu)?.clone();
    ensure!(
        !node.op().is_parameter() && !node.op().is_result(),
        NotWrappableSnafu { node: node.name(), op: node.op().name() }
    );
    let mut body = Graph::new(node.name());
    let mut external: SmallVec<[Output; 4]> = SmallVec::new();
    let mut inputs: SmallVec<[Output; 4]> = SmallVec::new();
    let mut inlined = Vec::new();

    for (index, &src) in node.inputs().iter().enumerate() {
        let producer = graph.node(src.node).context(IrSnafu)?;
        if should_inline_constant(graph, node.op(), index, src) {
            let copy = body.insert_node(producer, &[]).context(IrSnafu)?;
            inputs.push(Output::new(copy, src.index));
            inlined.push(src.node);
        } else {
            let port = graph.output_port(src).context(IrSnafu)?;
            let param = body.add_parameter(producer.name(), port.element_type, port.shape.clone());
            inputs.push(param.into());
            external.push(src);
        }
    }

    let rebuilt = body.insert_node(&node, &inputs).context(IrSnafu)?;
    let rebuilt_outputs = body.node(rebuilt).context(IrSnafu)?.outputs().len();
    ensure!(
        rebuilt_outputs == node.outputs().len(),
        OutputArityMismatchSnafu { node: node.name(), original: node.outputs().len(), rebuilt: rebuilt_outputs }
    );
    for index in 0..rebuilt_outputs {
        body.add_result(result_name(node.name(), index), Output::new(rebuilt, index)).context(IrSnafu)?;
    }

    let mut subgraph = Subgraph::new(body);
    subgraph.set_virtual_port_count(fake_quantize_hidden_count(graph, id)?);

    let sg = graph.add_op(node.name(), Op::Subgraph(Box::new(subgraph)), &external).context(IrSnafu)?;
    let rt_info = graph.node_mut(sg).context(IrSnafu)?.rt_info_mut();
    *rt_info = node.rt_info().clone();
    rt_info.set_original_layers_names(format!("{}{}", inherited_names(&node), node.name()));

    graph.replace_node(id, sg).context(IrSnafu)?;
    graph.remove_node(id).context(IrSnafu)?;
    remove_orphan_constants(graph, inlined)?;
    Ok(sg)
}
