use crate::error::{Error, Result};
use crate::graph::{GateKind, IndexedGraph};
use std::collections::{BTreeSet, HashMap};

/// Kind of a [SimpleGate]: only positive OR and AND survive preprocessing.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum SimpleKind {
    Or,
    And,
}

/// Positive-only gate in the secondary representation used for cut-set
/// expansion: basic-event indices, module indices and child gates, all
/// unsigned. Complements never appear.
#[derive(Debug)]
pub(crate) struct SimpleGate {
    pub kind: SimpleKind,
    pub basic_events: BTreeSet<i32>,
    pub modules: BTreeSet<i32>,
    pub gates: Vec<usize>,
}

/// Arena of [SimpleGate]s built from a preprocessed graph. Shared gates
/// convert once; children refer to each other by arena id.
#[derive(Debug)]
pub(crate) struct SimpleTree {
    pub gates: Vec<SimpleGate>,
    pub top: usize,
}

impl SimpleTree {
    /// Converts the subgraph under `top` by post-order traversal.
    ///
    /// Any surviving complemented event makes the tree non-coherent, which
    /// this engine refuses; a complemented gate argument at this stage is
    /// an invariant violation.
    pub fn from_graph(graph: &IndexedGraph, top: i32) -> Result<SimpleTree> {
        let mut tree = SimpleTree {
            gates: Vec::new(),
            top: 0,
        };
        let mut converted = HashMap::new();
        tree.top = tree.convert(graph, top, &mut converted)?;
        Ok(tree)
    }

    fn convert(
        &mut self,
        graph: &IndexedGraph,
        index: i32,
        converted: &mut HashMap<i32, usize>,
    ) -> Result<usize> {
        if let Some(&id) = converted.get(&index) {
            return Ok(id);
        }
        let gate = graph.gate(index);
        let kind = match gate.kind {
            GateKind::Or => SimpleKind::Or,
            GateKind::And => SimpleKind::And,
            other => {
                return Err(Error::Internal(format!(
                    "cut-set expansion reached a {} gate",
                    other
                )));
            }
        };
        let mut basic_events = BTreeSet::new();
        for arg in &gate.events {
            if arg.is_complement() {
                return Err(Error::UnsupportedFeature(format!(
                    "non-coherent fault tree: complemented event {} survives preprocessing",
                    arg.index()
                )));
            }
            basic_events.insert(arg.index());
        }
        let mut modules = BTreeSet::new();
        for arg in &gate.modules {
            if arg.is_complement() {
                return Err(Error::UnsupportedFeature(format!(
                    "non-coherent fault tree: complemented module {} survives preprocessing",
                    arg.index()
                )));
            }
            modules.insert(arg.index());
        }
        let mut children = Vec::new();
        for arg in &gate.gates {
            if arg.is_complement() {
                return Err(Error::Internal(format!(
                    "complemented gate argument {} survived complement propagation",
                    arg.index()
                )));
            }
            children.push(self.convert(graph, arg.index(), converted)?);
        }
        let id = self.gates.len();
        self.gates.push(SimpleGate {
            kind,
            basic_events,
            modules,
            gates: children,
        });
        converted.insert(index, id);
        Ok(id)
    }
}
