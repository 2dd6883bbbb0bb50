#[macro_use]
mod node;
mod indexed_graph;
pub(crate) mod preprocess;

pub use indexed_graph::IndexedGraph;
pub use node::{GateKind, SignedIndex};
pub(crate) use node::GateState;
