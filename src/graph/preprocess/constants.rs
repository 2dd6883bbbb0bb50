use super::super::{GateKind, GateState, IndexedGraph, SignedIndex};
use std::collections::{BTreeSet, HashSet};

/// Folds house events with fixed truth values through the graph and
/// absorbs null/unity children into their parents, bottom-up.
///
/// A complemented edge inverts the constant before the gate rules apply:
/// TRUE drops an AND argument and unifies an OR; FALSE nulls an AND and
/// drops an OR argument. Arity-1 residuals become transparent NULL gates.
/// Collapsed gates are detached from their remaining arguments so no house
/// event stays referenced. Returns true if the graph changed.
pub(crate) fn constant_propagation_pass(
    graph: &mut IndexedGraph,
    true_house: &BTreeSet<i32>,
    false_house: &BTreeSet<i32>,
) -> bool {
    let mut visited = HashSet::new();
    let mut changed = false;
    let top = graph.top_index();
    propagate(graph, top, true_house, false_house, &mut visited, &mut changed);
    changed
}

fn propagate(
    graph: &mut IndexedGraph,
    index: i32,
    true_house: &BTreeSet<i32>,
    false_house: &BTreeSet<i32>,
    visited: &mut HashSet<i32>,
    changed: &mut bool,
) {
    if !visited.insert(index) {
        return;
    }
    let children: Vec<i32> = graph.gate(index).gates.iter().map(|arg| arg.index()).collect();
    for child in children {
        propagate(graph, child, true_house, false_house, visited, changed);
    }
    process_gate(graph, index, true_house, false_house, changed);
}

fn process_gate(
    graph: &mut IndexedGraph,
    index: i32,
    true_house: &BTreeSet<i32>,
    false_house: &BTreeSet<i32>,
    changed: &mut bool,
) {
    if graph.gate(index).state != GateState::Normal {
        detach_all_args(graph, index, changed);
        return;
    }
    let event_args: Vec<SignedIndex> = graph.gate(index).events.iter().copied().collect();
    for arg in event_args {
        if !graph.is_house_event(arg.index()) {
            continue;
        }
        let value = if true_house.contains(&arg.index()) {
            true
        } else if false_house.contains(&arg.index()) {
            false
        } else {
            continue;
        };
        *changed = true;
        if apply_constant_arg(graph, index, arg, value ^ arg.is_complement()) {
            detach_all_args(graph, index, changed);
            return;
        }
    }
    let gate_args: Vec<SignedIndex> = graph.gate(index).gates.iter().copied().collect();
    for arg in gate_args {
        let child_state = graph.gate(arg.index()).state;
        if let Some(value) = child_state.constant_value() {
            *changed = true;
            if apply_constant_arg(graph, index, arg, value ^ arg.is_complement()) {
                detach_all_args(graph, index, changed);
                return;
            }
        }
    }
    finalize_arity(graph, index, changed);
}

/// Applies one constant argument to a gate. Returns true if the gate
/// itself collapsed into a constant.
fn apply_constant_arg(
    graph: &mut IndexedGraph,
    index: i32,
    arg: SignedIndex,
    value: bool,
) -> bool {
    match graph.kind_of(index) {
        GateKind::And => {
            if value {
                graph.remove_arg(index, arg);
                false
            } else {
                graph.gate_mut(index).state = GateState::Null;
                true
            }
        }
        GateKind::Or => {
            if value {
                graph.gate_mut(index).state = GateState::Unity;
                true
            } else {
                graph.remove_arg(index, arg);
                false
            }
        }
        GateKind::Null => {
            graph.gate_mut(index).state = if value {
                GateState::Unity
            } else {
                GateState::Null
            };
            true
        }
        _ => unreachable!("constant propagation runs on normalized graphs"),
    }
}

/// A gate that lost all arguments is itself a constant: an empty AND is
/// unity, an empty OR is null. An arity-1 residual becomes a transparent
/// NULL gate, elided later.
fn finalize_arity(graph: &mut IndexedGraph, index: i32, changed: &mut bool) {
    let (kind, count) = {
        let gate = graph.gate(index);
        (gate.kind, gate.arg_count())
    };
    match count {
        0 => {
            graph.gate_mut(index).state = match kind {
                GateKind::And => GateState::Unity,
                GateKind::Or | GateKind::Null => GateState::Null,
                _ => unreachable!("constant propagation runs on normalized graphs"),
            };
            *changed = true;
        }
        1 if kind.is_simple() => {
            graph.gate_mut(index).kind = GateKind::Null;
            *changed = true;
        }
        _ => {}
    }
}

fn detach_all_args(graph: &mut IndexedGraph, index: i32, changed: &mut bool) {
    let args: Vec<SignedIndex> = graph.gate(index).args().collect();
    if !args.is_empty() {
        *changed = true;
    }
    for arg in args {
        graph.remove_arg(index, arg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BasicEvent, GateDef, HouseEvent, Model};

    fn model(kind: GateKind) -> Model {
        Model {
            basic_events: vec![BasicEvent {
                id: "a".into(),
                index: 1,
                expression: None,
            }],
            house_events: vec![HouseEvent {
                id: "h".into(),
                index: 2,
                state: true,
            }],
            gates: vec![GateDef {
                id: "top".into(),
                index: 3,
                kind,
                args: vec![2, 1],
            }],
            ..Model::default()
        }
    }

    fn singleton(index: i32) -> BTreeSet<i32> {
        let mut set = BTreeSet::new();
        set.insert(index);
        set
    }

    #[test]
    fn test_true_house_drops_and_argument() {
        let model = model(GateKind::And);
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        constant_propagation_pass(&mut graph, &singleton(2), &BTreeSet::new());
        // AND(h=TRUE, a) leaves the arity-1 residual NULL(a).
        assert_eq!(graph.kind_of(3), GateKind::Null);
        assert_eq!(graph.args_of(3), vec![si!(1)]);
        assert!(graph.no_house_references());
    }

    #[test]
    fn test_false_house_nulls_and_gate() {
        let model = model(GateKind::And);
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        constant_propagation_pass(&mut graph, &BTreeSet::new(), &singleton(2));
        assert_eq!(graph.gate(3).state, GateState::Null);
        assert!(graph.no_house_references());
    }

    #[test]
    fn test_true_house_unifies_or_gate() {
        let model = model(GateKind::Or);
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        constant_propagation_pass(&mut graph, &singleton(2), &BTreeSet::new());
        assert_eq!(graph.gate(3).state, GateState::Unity);
    }

    #[test]
    fn test_complement_edge_inverts_state() {
        let mut model = model(GateKind::And);
        model.gates[0].args = vec![-2, 1];
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        // -h with h=TRUE reads as FALSE and nulls the AND.
        constant_propagation_pass(&mut graph, &singleton(2), &BTreeSet::new());
        assert_eq!(graph.gate(3).state, GateState::Null);
    }

    #[test]
    fn test_constant_child_propagates_upward() {
        let mut model = model(GateKind::Or);
        model.gates[0].args = vec![1, 4];
        model.gates.push(GateDef {
            id: "inner".into(),
            index: 4,
            kind: GateKind::And,
            args: vec![2, 1],
        });
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        // h=FALSE nulls the inner AND, which then drops from the OR.
        constant_propagation_pass(&mut graph, &BTreeSet::new(), &singleton(2));
        assert_eq!(graph.gate(4).state, GateState::Null);
        assert_eq!(graph.kind_of(3), GateKind::Null);
        assert_eq!(graph.args_of(3), vec![si!(1)]);
    }

    #[test]
    fn test_unset_house_events_leave_graph_unchanged() {
        let model = Model {
            basic_events: vec![
                BasicEvent {
                    id: "a".into(),
                    index: 1,
                    expression: None,
                },
                BasicEvent {
                    id: "b".into(),
                    index: 2,
                    expression: None,
                },
            ],
            gates: vec![
                GateDef {
                    id: "top".into(),
                    index: 3,
                    kind: GateKind::Or,
                    args: vec![1, 4],
                },
                GateDef {
                    id: "inner".into(),
                    index: 4,
                    kind: GateKind::And,
                    args: vec![1, 2],
                },
            ],
            ..Model::default()
        };
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        let reference = graph.clone();
        let changed = constant_propagation_pass(&mut graph, &BTreeSet::new(), &BTreeSet::new());
        assert!(!changed);
        assert_eq!(graph, reference);
    }
}
