//! Whole-graph tokenization driver.

use snafu::ResultExt;
use weld_ir::{Graph, Op};

use crate::config::TokenizationConfig;
use crate::error::*;
use crate::extract_constants::extract_constants;
use crate::tokenize::{TokenizeKind, enumerate_nodes, try_tokenize_node};

/// Summary of one [`TokenizationPass::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenizationReport {
    /// Fused nodes in the graph after the pass.
    pub subgraphs: usize,
    /// Nodes folded into an existing subgraph.
    pub merged: usize,
    /// Nodes that started a subgraph of their own.
    pub wrapped: usize,
    /// Fused nodes that had constants moved to their boundary.
    pub extracted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TokenizationPass {
    config: TokenizationConfig,
}

impl TokenizationPass {
    pub fn new(config: TokenizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenizationConfig {
        &self.config
    }

    fn supported(&self, op: &Op) -> bool {
        match op {
            Op::Parameter { .. }
            | Op::Result
            | Op::Constant(_)
            | Op::Subgraph(_)
            | Op::MatMul { .. }
            | Op::BroadcastLoad(_)
            | Op::VectorBuffer(_)
            | Op::Fill(_) => false,
            Op::Transpose => self.config.tokenize_transpose,
            _ => true,
        }
    }

    /// Tokenize every supported node of `graph` in topological order, then move
    /// large constants of the resulting fused nodes to their boundaries.
    #[tracing::instrument(skip_all, fields(graph = graph.name()))]
    pub fn run(&self, graph: &mut Graph) -> Result<TokenizationReport> {
        enumerate_nodes(graph)?;
        let order = graph.ordered_ops().context(IrSnafu)?;

        let mut report = TokenizationReport::default();
        for id in order {
            // Merges remove the producers they absorb.
            let Some(node) = graph.get(id) else { continue };
            if !self.supported(node.op()) {
                continue;
            }
            match try_tokenize_node(graph, id, &self.config)?.kind {
                TokenizeKind::Merged { .. } => report.merged += 1,
                TokenizeKind::Wrapped(_) => report.wrapped += 1,
            }
        }

        let subgraphs: Vec<_> = graph.nodes().filter(|n| n.op().as_subgraph().is_some()).map(|n| n.id()).collect();
        report.subgraphs = subgraphs.len();
        for id in subgraphs {
            if extract_constants(graph, id)?.1 {
                report.extracted += 1;
            }
        }

        tracing::debug!(
            subgraphs = report.subgraphs,
            merged = report.merged,
            wrapped = report.wrapped,
            extracted = report.extracted,
            "tokenization finished"
        );
        Ok(report)
    }
}
