use super::super::{GateState, IndexedGraph, SignedIndex};
use std::collections::{HashMap, HashSet};

/// Pushes complements on gate edges down to the leaves.
///
/// Every gate referenced through a negative edge is replaced by a cached
/// complement variant: the De Morgan dual kind with every argument sign
/// flipped. A gate shared between positive and negative parents keeps both
/// variants; only the negative parents are rewired. After the pass, signs
/// appear exclusively on event arguments.
pub(crate) fn complement_propagation_pass(graph: &mut IndexedGraph) {
    let mut complements: HashMap<i32, i32> = HashMap::new();
    if graph.negated_top() {
        let complement = complement_of(graph, graph.top_index(), &mut complements);
        graph.set_top(complement);
        graph.set_negated_top(false);
    }
    let top = graph.top_index();
    let mut visited = HashSet::new();
    propagate(graph, top, &mut complements, &mut visited);
    debug_assert!(graph.is_acyclic());
}

fn propagate(
    graph: &mut IndexedGraph,
    index: i32,
    complements: &mut HashMap<i32, i32>,
    visited: &mut HashSet<i32>,
) {
    if !visited.insert(index) {
        return;
    }
    let gate_args: Vec<SignedIndex> = graph.gate(index).gates.iter().copied().collect();
    for arg in gate_args {
        let child = if arg.is_complement() {
            let complement = complement_of(graph, arg.index(), complements);
            graph.replace_arg(index, arg, SignedIndex::new(complement));
            complement
        } else {
            arg.index()
        };
        propagate(graph, child, complements, visited);
    }
}

/// Materialises the complement variant of a gate once and caches it both
/// ways, so complementing twice returns the original.
fn complement_of(
    graph: &mut IndexedGraph,
    index: i32,
    complements: &mut HashMap<i32, i32>,
) -> i32 {
    if let Some(&cached) = complements.get(&index) {
        return cached;
    }
    let (kind, state, events, gates) = {
        let gate = graph.gate(index);
        (
            gate.kind,
            gate.state,
            gate.events.clone(),
            gate.gates.clone(),
        )
    };
    let complement = graph.new_gate(kind.dual());
    for arg in events {
        graph.add_arg(complement, -arg);
    }
    for arg in gates {
        graph.add_arg(complement, -arg);
    }
    match state.constant_value() {
        Some(true) => graph.gate_mut(complement).state = GateState::Null,
        Some(false) => graph.gate_mut(complement).state = GateState::Unity,
        None => {}
    }
    complements.insert(index, complement);
    complements.insert(complement, index);
    complement
}
