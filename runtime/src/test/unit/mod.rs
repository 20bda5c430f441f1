pub mod memory;
pub mod reference;
pub mod subgraph;
