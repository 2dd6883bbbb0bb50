mod complements;
mod constants;
mod modules;
mod normalize;
mod simplify;

pub(crate) use complements::complement_propagation_pass;
pub(crate) use constants::constant_propagation_pass;
pub(crate) use modules::module_detection_pass;
pub(crate) use normalize::normalization_pass;
pub(crate) use simplify::{gate_joining_pass, mark_null_residuals, null_elimination_pass};

use super::IndexedGraph;
use crate::error::Result;
use log::debug;
use std::collections::BTreeSet;

/// Runs the full preprocessing pipeline on a freshly built graph:
/// normalization, house-event constant propagation, complement
/// propagation, structural simplification to a fixpoint, and module
/// detection. Afterwards the graph holds only OR/AND gates (plus a
/// possible NULL or constant top), signs appear only on leaves, and no
/// house event is referenced.
pub(crate) fn run_preprocessing(
    graph: &mut IndexedGraph,
    true_house: &BTreeSet<i32>,
    false_house: &BTreeSet<i32>,
) -> Result<()> {
    normalization_pass(graph)?;
    run_pass(
        graph,
        |g| {
            constant_propagation_pass(g, true_house, false_house);
        },
        "constant propagation",
    );
    graph.sweep_detached();
    run_pass(
        graph,
        |g| complement_propagation_pass(g),
        "complement propagation",
    );
    let unset = BTreeSet::new();
    loop {
        let mut changed = false;
        changed |= gate_joining_pass(graph);
        changed |= mark_null_residuals(graph);
        changed |= null_elimination_pass(graph);
        // Splicing can surface complement collisions as constant states.
        changed |= constant_propagation_pass(graph, &unset, &unset);
        if !changed {
            break;
        }
        graph.sweep_detached();
    }
    graph.sweep_detached();
    debug_assert!(graph.is_acyclic());
    debug_assert!(graph.has_leaf_only_signs());
    debug_assert!(graph.no_house_references());
    run_pass(graph, module_detection_pass, "module detection");
    Ok(())
}

/// Runs a pass and logs the change in graph size.
fn run_pass<F: FnOnce(&mut IndexedGraph)>(graph: &mut IndexedGraph, pass: F, name: &'static str) {
    let old_len = graph.gate_count();
    pass(graph);
    debug!(
        "pass: {}, old size: {}, new size: {}",
        name,
        old_len,
        graph.gate_count()
    );
}
