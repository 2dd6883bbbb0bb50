use super::super::{GateKind, GateState, IndexedGraph, SignedIndex};
use std::collections::HashSet;

/// Splices same-kind single-parent child gates into their parent, bottom-up.
///
/// Edit order within a gate is ascending by child index, which keeps the
/// transformation deterministic. Returns true if the graph changed.
pub(crate) fn gate_joining_pass(graph: &mut IndexedGraph) -> bool {
    let mut visited = HashSet::new();
    let top = graph.top_index();
    join(graph, top, &mut visited)
}

fn join(graph: &mut IndexedGraph, index: i32, visited: &mut HashSet<i32>) -> bool {
    if !visited.insert(index) {
        return false;
    }
    let mut changed = false;
    let children: Vec<i32> = graph.gate(index).gates.iter().map(|arg| arg.index()).collect();
    for child in children {
        changed |= join(graph, child, visited);
    }
    let kind = graph.kind_of(index);
    if !kind.is_simple() || graph.gate(index).state != GateState::Normal {
        return changed;
    }
    let child_args: Vec<SignedIndex> = graph.gate(index).gates.iter().copied().collect();
    for arg in child_args {
        if arg.is_complement() {
            continue;
        }
        let child = arg.index();
        let joinable = {
            let gate = graph.gate(child);
            gate.kind == kind && gate.state == GateState::Normal && gate.parents.len() == 1
        };
        if !joinable {
            continue;
        }
        let (events, gates): (Vec<SignedIndex>, Vec<SignedIndex>) = {
            let gate = graph.gate(child);
            (
                gate.events.iter().copied().collect(),
                gate.gates.iter().copied().collect(),
            )
        };
        graph.remove_arg(index, arg);
        graph.remove_gate(child);
        for &event in &events {
            graph.add_arg(index, event);
        }
        for &gate_arg in &gates {
            graph.add_arg(index, gate_arg);
        }
        changed = true;
        if graph.gate(index).state != GateState::Normal {
            // A spliced complement pair collapsed the parent.
            break;
        }
    }
    changed
}

/// Marks arity-1 OR/AND gates as transparent NULL gates so null
/// elimination can splice them out. Returns true if the graph changed.
pub(crate) fn mark_null_residuals(graph: &mut IndexedGraph) -> bool {
    let mut changed = false;
    for index in graph.gate_indices() {
        let gate = graph.gate(index);
        if gate.state == GateState::Normal && gate.kind.is_simple() && gate.arg_count() == 1 {
            graph.gate_mut(index).kind = GateKind::Null;
            changed = true;
        }
    }
    changed
}

/// Replaces every NULL child gate in its parents by the NULL gate's single
/// argument, with the edge signs composed. A NULL top gate stays; the
/// cut-set engine resolves it. Returns true if the graph changed.
pub(crate) fn null_elimination_pass(graph: &mut IndexedGraph) -> bool {
    let mut visited = HashSet::new();
    let top = graph.top_index();
    eliminate(graph, top, &mut visited)
}

fn eliminate(graph: &mut IndexedGraph, index: i32, visited: &mut HashSet<i32>) -> bool {
    if !visited.insert(index) {
        return false;
    }
    let mut changed = false;
    let child_args: Vec<SignedIndex> = graph.gate(index).gates.iter().copied().collect();
    for arg in child_args {
        let child = arg.index();
        changed |= eliminate(graph, child, visited);
        let inner = {
            let gate = graph.gate(child);
            if gate.kind != GateKind::Null || gate.state != GateState::Normal {
                continue;
            }
            match gate.single_arg() {
                Some(inner) => inner,
                // An argument-less NULL gate is left for constant folding.
                None => continue,
            }
        };
        graph.replace_arg(index, arg, inner.in_sign_of(arg));
        if graph.gate(child).parents.is_empty() {
            graph.remove_gate(child);
        }
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BasicEvent, GateDef, Model};

    fn model(gates: Vec<GateDef>) -> Model {
        Model {
            basic_events: (1..=4)
                .map(|i| BasicEvent {
                    id: format!("b{}", i),
                    index: i,
                    expression: None,
                })
                .collect(),
            gates,
            ..Model::default()
        }
    }

    fn gate(id: &str, index: i32, kind: GateKind, args: Vec<i32>) -> GateDef {
        GateDef {
            id: id.into(),
            index,
            kind,
            args,
        }
    }

    #[test]
    fn test_same_kind_single_parent_child_is_spliced() {
        let model = model(vec![
            gate("top", 5, GateKind::Or, vec![1, 6]),
            gate("inner", 6, GateKind::Or, vec![2, 3]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        assert!(gate_joining_pass(&mut graph));

        assert_eq!(graph.gate_count(), 1);
        assert_eq!(graph.args_of(5), vec![si!(1), si!(2), si!(3)]);
    }

    #[test]
    fn test_chains_collapse_bottom_up() {
        let model = model(vec![
            gate("top", 5, GateKind::And, vec![1, 6]),
            gate("mid", 6, GateKind::And, vec![2, 7]),
            gate("deep", 7, GateKind::And, vec![3, 4]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        assert!(gate_joining_pass(&mut graph));

        assert_eq!(graph.gate_count(), 1);
        assert_eq!(
            graph.args_of(5),
            vec![si!(1), si!(2), si!(3), si!(4)]
        );
    }

    #[test]
    fn test_shared_child_is_not_spliced() {
        let model = model(vec![
            gate("top", 5, GateKind::Or, vec![6, 7]),
            gate("left", 6, GateKind::Or, vec![1, 8]),
            gate("right", 7, GateKind::Or, vec![2, 8]),
            gate("shared", 8, GateKind::Or, vec![3, 4]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        gate_joining_pass(&mut graph);

        // left and right fold into top, but the shared gate keeps two
        // parents until they merge, after which it becomes joinable.
        assert!(graph.contains_gate(8) || graph.gate_count() == 1);
    }

    #[test]
    fn test_different_kind_child_is_kept() {
        let model = model(vec![
            gate("top", 5, GateKind::Or, vec![1, 6]),
            gate("inner", 6, GateKind::And, vec![2, 3]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        assert!(!gate_joining_pass(&mut graph));
        assert_eq!(graph.gate_count(), 2);
    }

    #[test]
    fn test_null_gate_is_replaced_by_its_argument() {
        let model = model(vec![
            gate("top", 5, GateKind::And, vec![1, 6]),
            gate("pass", 6, GateKind::Null, vec![-2]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        assert!(null_elimination_pass(&mut graph));

        assert_eq!(graph.gate_count(), 1);
        assert_eq!(graph.args_of(5), vec![si!(-2), si!(1)]);
    }

    #[test]
    fn test_null_chain_sign_composition() {
        let model = model(vec![
            gate("top", 5, GateKind::And, vec![1, -6]),
            gate("outer", 6, GateKind::Null, vec![-7]),
            gate("inner", 7, GateKind::Null, vec![2]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        null_elimination_pass(&mut graph);

        // -NULL(-NULL(2)) composes back to +2.
        assert_eq!(graph.args_of(5), vec![si!(1), si!(2)]);
        assert_eq!(graph.gate_count(), 1);
    }

    #[test]
    fn test_arity_one_residual_marked_null() {
        let model = model(vec![
            gate("top", 5, GateKind::Or, vec![1, 6]),
            gate("inner", 6, GateKind::And, vec![2]),
        ]);
        let mut graph = IndexedGraph::from_model(&model, 5).unwrap();
        assert!(mark_null_residuals(&mut graph));
        assert_eq!(graph.kind_of(6), GateKind::Null);
        assert!(null_elimination_pass(&mut graph));
        assert_eq!(graph.args_of(5), vec![si!(1), si!(2)]);
    }
}
