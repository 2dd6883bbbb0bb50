use super::super::{GateState, IndexedGraph, SignedIndex};
use log::debug;
use std::collections::HashMap;

/// Detects independently analysable modules with one Euler-tour DFS.
///
/// Every gate gets `(enter, exit)` timestamps and every leaf records its
/// first and last visit. A non-top gate with a single parent is a module
/// iff the visit times of everything reachable from it stay within its own
/// `[enter, exit]` window: no leaf below it is shared with the rest of the
/// graph. Flagged gates move from their parent's gate arguments into the
/// module argument set, where the cut-set engine treats them as leaves.
pub(crate) fn module_detection_pass(graph: &mut IndexedGraph) {
    let top = graph.top_index();
    if graph.gate(top).state != GateState::Normal {
        return;
    }
    let mut leaf_times = HashMap::new();
    let mut time = 0;
    assign_timing(graph, top, &mut time, &mut leaf_times);

    let mut memo = HashMap::new();
    let mut promotions = Vec::new();
    for index in graph.gate_indices() {
        if index == top {
            continue;
        }
        let (min, max) = subtree_times(graph, index, &leaf_times, &mut memo);
        let gate = graph.gate(index);
        if gate.parents.len() == 1 && min == gate.visit.enter && max == gate.visit.exit {
            let parent = *gate.parents.iter().next().unwrap();
            promotions.push((parent, index));
        }
    }
    for &(parent, child) in &promotions {
        graph.gate_mut(child).module = true;
        graph.promote_to_module(parent, child);
    }
    debug!("module detection: {} modules flagged", promotions.len());
}

fn assign_timing(
    graph: &mut IndexedGraph,
    index: i32,
    time: &mut i32,
    leaf_times: &mut HashMap<i32, (i32, i32)>,
) {
    if graph.gate(index).visit.entered() {
        *time += 1;
        graph.gate_mut(index).visit.last = *time;
        return;
    }
    *time += 1;
    graph.gate_mut(index).visit.enter = *time;
    let args: Vec<SignedIndex> = graph.gate(index).args().collect();
    for arg in args {
        let child = arg.index();
        if graph.is_event(child) {
            *time += 1;
            let entry = leaf_times.entry(child).or_insert((*time, *time));
            entry.1 = *time;
        } else {
            assign_timing(graph, child, time, leaf_times);
        }
    }
    *time += 1;
    let visit = &mut graph.gate_mut(index).visit;
    visit.exit = *time;
    visit.last = *time;
}

/// Returns the min/max visit time over everything reachable from a gate,
/// including re-visits of the gate itself through other parents.
fn subtree_times(
    graph: &IndexedGraph,
    index: i32,
    leaf_times: &HashMap<i32, (i32, i32)>,
    memo: &mut HashMap<i32, (i32, i32)>,
) -> (i32, i32) {
    if let Some(&cached) = memo.get(&index) {
        return cached;
    }
    let gate = graph.gate(index);
    let mut min = gate.visit.enter;
    let mut max = gate.visit.exit.max(gate.visit.last);
    let events: Vec<i32> = gate.events.iter().map(|arg| arg.index()).collect();
    let children: Vec<i32> = gate.gates.iter().map(|arg| arg.index()).collect();
    for event in events {
        let (first, last) = leaf_times[&event];
        min = min.min(first);
        max = max.max(last);
    }
    for child in children {
        let (child_min, child_max) = subtree_times(graph, child, leaf_times, memo);
        min = min.min(child_min);
        max = max.max(child_max);
    }
    memo.insert(index, (min, max));
    (min, max)
}
