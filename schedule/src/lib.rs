//! Tokenization passes for the weld fusion compiler.
//!
//! Tokenization clusters element-wise graph nodes into fused subgraphs, each of
//! which later compiles into one kernel.
//!
//! # Module Organization
//!
//! - [`tokenize`] - Single-node clustering and pre-selected chain collapse
//! - [`budget`] - Data-pointer budget of a fused kernel
//! - [`extract_constants`] - Promotion of large body constants to parameters
//! - [`pass`] - Whole-graph driver
//!
//! Merges are speculative: a node is first planned against copies of its producer
//! bodies and only spliced into the graph once every check passes. A rejected plan
//! degrades to wrapping the node alone, so the graph stays valid after every step.

pub mod budget;
pub mod config;
pub mod error;
pub mod extract_constants;
pub mod pass;
pub mod tokenize;


pub use budget::{ResourceEstimate, estimate_subgraph, estimated_buffer_count, fake_quantize_hidden_count};
pub use config::{DEFAULT_DATA_PTR_GPR_COUNT, TokenizationConfig};
pub use error::{Error, Result};
pub use extract_constants::extract_constants;
pub use pass::{TokenizationPass, TokenizationReport};
pub use tokenize::{
    TokenizeKind, TokenizeOutcome, WrapReason, enumerate_nodes, is_open_subgraph, mark_completed, tokenize_node,
    tokenize_ordered_nodes, try_tokenize_node, wrap_node,
};
