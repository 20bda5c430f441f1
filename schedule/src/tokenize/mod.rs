//! Tokenization: clustering graph nodes into fused subgraphs.
//!
//! - [`tokenize_node`] folds one node into its open subgraph producers, or wraps
//!   it alone when a merge is unsafe.
//! - [`tokenize_ordered_nodes`] collapses a pre-selected chain into one subgraph.

mod body;
mod node;
mod ordered;
mod workspace;

use snafu::{OptionExt, ResultExt};
use weld_ir::{Graph, Node, NodeId, Op, Output, SubgraphState};

use crate::error::*;

pub use body::wrap_node;
pub use node::{TokenizeKind, TokenizeOutcome, WrapReason, tokenize_node, try_tokenize_node};
pub use ordered::tokenize_ordered_nodes;

/// Number every live node by its position in a topological order.
pub fn enumerate_nodes(graph: &mut Graph) -> Result<()> {
    let order = graph.ordered_ops().context(IrSnafu)?;
    for (position, id) in order.into_iter().enumerate() {
        graph.node_mut(id).context(IrSnafu)?.rt_info_mut().set_topological_order(position as i64);
    }
    Ok(())
}

/// Seal a fused node so later tokenization never merges into it.
pub fn mark_completed(graph: &mut Graph, id: NodeId) -> Result<()> {
    let node = graph.node_mut(id).context(IrSnafu)?;
    node.op().as_subgraph().context(NotASubgraphSnafu { id })?;
    node.rt_info_mut().set_subgraph_state(SubgraphState::Completed);
    Ok(())
}

pub fn is_open_subgraph(node: &Node) -> bool {
    node.op().as_subgraph().is_some() && node.rt_info().subgraph_state() == SubgraphState::Open
}

fn topological_order(node: &Node) -> Result<i64> {
    node.rt_info().topological_order().context(MissingTopologicalOrderSnafu { node: node.name() })
}

/// Provenance inherited from earlier fusions, with a trailing separator.
fn inherited_names(node: &Node) -> String {
    node.rt_info().original_layers_names().map(|names| format!("{names},")).unwrap_or_default()
}

/// Constants that stay inside the body instead of becoming a parameter: single
/// elements always, larger ones only where the consumer needs the payload.
fn should_inline_constant(graph: &Graph, consumer: &Op, index: usize, src: Output) -> bool {
    graph.constant(src.node).is_some_and(|c| c.is_scalar() || consumer.constant_input_should_be_inside_body(index))
}

fn result_children(graph: &Graph, id: NodeId) -> usize {
    graph.users(id).into_iter().filter(|&u| graph.get(u).is_some_and(|n| n.op().is_result())).count()
}

fn remove_orphan_constants(graph: &mut Graph, candidates: impl IntoIterator<Item = NodeId>) -> Result<()> {
    for id in candidates {
        if graph.constant(id).is_some() && graph.users(id).is_empty() {
            graph.remove_node(id).context(IrSnafu)?;
            tracing::trace!(constant = %id, "orphan constant removed");
        }
    }
    Ok(())
}

/// Remove every node in `replaced` once nothing reads it any more. Nodes may
/// feed each other, so removal repeats until no progress is made.
fn remove_replaced(graph: &mut Graph, mut replaced: Vec<NodeId>) -> Result<()> {
    loop {
        let before = replaced.len();
        let mut kept = Vec::with_capacity(before);
        for id in replaced {
            if graph.users(id).is_empty() {
                graph.remove_node(id).context(IrSnafu)?;
            } else {
                kept.push(id);
            }
        }
        replaced = kept;
        if replaced.is_empty() {
            return Ok(());
        }
        if replaced.len() == before {
            let node = graph.node(replaced[0]).context(IrSnafu)?.name().to_string();
            return DanglingNodeSnafu { node }.fail();
        }
    }
}

fn result_name(node: &str, index: usize) -> String {
    format!("{node}/out{index}")
}
