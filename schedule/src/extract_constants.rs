//! Promote large body constants to boundary parameters.
//!
//! Fusion copies every constant it meets into the body. Scalars and constants a
//! consumer must see at compile time stay there; the rest become kernel arguments
//! so their payload is not baked into generated code.

use snafu::{OptionExt, ResultExt};
use weld_ir::{Graph, NodeId, Op, Output};

use crate::error::*;

/// Move qualifying constants of subgraph `id` out of its body. Returns the id of
/// the node now standing for the subgraph, which differs from `id` only when
/// something was extracted.
#[tracing::instrument(skip_all, fields(subgraph = %id))]
pub fn extract_constants(graph: &mut Graph, id: NodeId) -> Result<(NodeId, bool)> {
    let node = graph.node(id).context(IrSnafu)?.clone();
    let mut subgraph = node.op().as_subgraph().context(NotASubgraphSnafu { id })?.clone();
    let body = subgraph.body_mut();

    let mut extracted = Vec::new();
    for cid in body.live_nodes().collect::<Vec<_>>() {
        let Some(constant) = body.constant(cid) else { continue };
        if constant.is_scalar() {
            continue;
        }
        let constant = constant.clone();
        let consumer = *body.consumers(Output::from(cid)).first().context(DanglingConstantSnafu {
            name: body.node(cid).context(IrSnafu)?.name(),
            body: body.name(),
        })?;
        if body.node(consumer.node).context(IrSnafu)?.op().constant_input_should_be_inside_body(consumer.index) {
            continue;
        }

        let name = body.node(cid).context(IrSnafu)?.name().to_string();
        let param = body.add_parameter(name.as_str(), constant.element_type(), constant.shape());
        body.replace_node(cid, param).context(IrSnafu)?;
        body.remove_node(cid).context(IrSnafu)?;
        extracted.push((name, constant));
    }

    if extracted.is_empty() {
        return Ok((id, false));
    }

    let mut inputs = node.inputs().to_vec();
    for (name, constant) in extracted {
        inputs.push(graph.add_constant(name, constant).into());
    }
    let replacement = graph.add_op(node.name(), Op::Subgraph(Box::new(subgraph)), &inputs).context(IrSnafu)?;
    *graph.node_mut(replacement).context(IrSnafu)?.rt_info_mut() = node.rt_info().clone();
    graph.replace_node(id, replacement).context(IrSnafu)?;
    graph.remove_node(id).context(IrSnafu)?;

    tracing::debug!(%replacement, inputs = inputs.len(), "constants extracted");
    Ok((replacement, true))
}
