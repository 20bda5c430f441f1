use snafu::ResultExt;
use strum::Display;
use weld_ir::{Graph, NodeId};

use super::body::wrap_node;
use super::workspace::{MergeWorkspace, Plan};
use crate::config::TokenizationConfig;
use crate::error::*;

/// Why a node ended up alone in its own subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WrapReason {
    /// No input is produced by an open subgraph.
    NoOpenInputs,
    /// Every candidate would close a path back into the fused node.
    CyclicDependency,
    /// An input shared by two candidates would close a cycle.
    TernaryCycle,
    /// More than one merged piece is read by a graph result.
    TooManyResultConsumers,
    /// The fused kernel would need more data pointers than configured.
    BudgetExceeded,
    /// Result shapes of the fused body cannot share one iteration domain.
    OutputsNotBroadcastable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeKind {
    /// Folded into `absorbed` producer subgraphs.
    Merged { absorbed: usize },
    Wrapped(WrapReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeOutcome {
    /// The node now standing in for the tokenized one.
    pub subgraph: NodeId,
    pub kind: TokenizeKind,
}

/// Fold `id` into the open subgraphs producing its inputs.
///
/// Merging is all-or-nothing: the plan is built on copies of the producer bodies
/// and the graph is left untouched until it passes every check. A rejected plan
/// wraps `id` alone instead. Errors mean the graph is inconsistent, never that a
/// merge was merely impossible.
#[tracing::instrument(skip_all, fields(node = %id))]
pub fn try_tokenize_node(graph: &mut Graph, id: NodeId, config: &TokenizationConfig) -> Result<TokenizeOutcome> {
    let plan = match MergeWorkspace::new(graph, id)? {
        Some(workspace) => workspace.plan(config)?,
        None => Plan::Abort(WrapReason::NoOpenInputs),
    };

    match plan {
        Plan::Commit(fused) => {
            let absorbed = fused.absorbed();
            let subgraph = fused.commit(graph)?;
            tracing::debug!(%subgraph, absorbed, "node merged into producer subgraphs");
            Ok(TokenizeOutcome { subgraph, kind: TokenizeKind::Merged { absorbed } })
        }
        Plan::Abort(reason) => {
            let name = graph.node(id).context(IrSnafu)?.name().to_string();
            let subgraph = wrap_node(graph, id)?;
            tracing::debug!(node = name, %reason, "starting subgraph");
            Ok(TokenizeOutcome { subgraph, kind: TokenizeKind::Wrapped(reason) })
        }
    }
}

/// Tokenize `id`; the graph always changes, so this reports `true`.
pub fn tokenize_node(graph: &mut Graph, id: NodeId, config: &TokenizationConfig) -> Result<bool> {
    try_tokenize_node(graph, id, config)?;
    Ok(true)
}
