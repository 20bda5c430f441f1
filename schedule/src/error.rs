//! Error types for tokenization passes.
//!
//! Rejected merges are not errors: they fall back to a single-node wrap. Everything
//! here signals a broken graph or a bug in the clustering itself.

use snafu::Snafu;
use weld_ir::NodeId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Error from IR layer.
    #[snafu(display("IR error: {source}"))]
    Ir { source: weld_ir::Error },

    /// A node taking part in a merge was never enumerated.
    #[snafu(display("node '{node}' has no topological order"))]
    MissingTopologicalOrder { node: String },

    /// Rebuilding a node inside a body changed its output count.
    #[snafu(display("node '{node}' has {original} outputs but its body copy has {rebuilt}"))]
    OutputArityMismatch { node: String, original: usize, rebuilt: usize },

    /// One external consumer was registered for two body results.
    #[snafu(display("consumer {consumer} of '{node}' wired twice"))]
    DuplicateResultWiring { node: String, consumer: NodeId },

    /// Body results and recorded external consumers disagree.
    #[snafu(display("fused node '{node}' has {results} results but {consumers} consumer groups"))]
    ResultCountMismatch { node: String, results: usize, consumers: usize },

    /// Chain tokenization called with nothing to tokenize.
    #[snafu(display("nothing to be tokenized"))]
    EmptyChain,

    /// Graph parameters and results cannot stand inside a fused body.
    #[snafu(display("node '{node}' ({op}) cannot be wrapped"))]
    NotWrappable { node: String, op: String },

    /// Node expected to be a fused subgraph.
    #[snafu(display("node {id} is not a subgraph"))]
    NotASubgraph { id: NodeId },

    /// Body parameter of a merged subgraph has no source in the fused body.
    #[snafu(display("parameter {index} of subgraph {subgraph} is unbound"))]
    UnboundParameter { subgraph: NodeId, index: usize },

    /// A node replaced by a fused node is still read by someone.
    #[snafu(display("node '{node}' still has consumers after fusion"))]
    DanglingNode { node: String },

    /// Body constant without consumers.
    #[snafu(display("constant '{name}' in body '{body}' has no consumers"))]
    DanglingConstant { name: String, body: String },
}
