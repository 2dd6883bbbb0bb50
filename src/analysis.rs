//! Pipeline orchestration: from a validated model to minimal cut sets.
//!
//! [FaultTreeAnalysis] builds the indexed graph for a top gate, runs the
//! preprocessing passes, generates cut sets, analyses every detected
//! module on its own, and substitutes module cut sets back into the parent
//! products so reported top-level cut sets contain basic-event indices
//! only. Event-tree sequences run through the same pipeline after
//! flattening.

use crate::error::{Error, Result};
use crate::event_tree::{flatten, FlattenedSequence};
use crate::graph::preprocess::run_preprocessing;
use crate::graph::IndexedGraph;
use crate::mcs::{merge_cut_sets, minimize, CutSet, CutSetEngine};
use crate::model::{Expression, Model, Warning};
use crate::settings::Settings;
use indexmap::IndexMap;
use log::debug;
use std::collections::{BTreeSet, HashSet};

/// Minimal cut sets for one analysed top gate.
#[derive(Debug, Clone, PartialEq)]
pub struct McsResult {
    /// Minimal cut sets over basic-event indices, ordered by cardinality,
    /// then lexicographically.
    pub cut_sets: Vec<CutSet>,
    /// Cut sets of every detected module, keyed by module index, with
    /// nested modules already substituted.
    pub module_cut_sets: IndexMap<i32, Vec<CutSet>>,
    /// True if the order limit discarded every candidate: no cut set of
    /// size within `limit_order` exists.
    pub order_exceeded: bool,
    /// Non-fatal model diagnostics.
    pub warnings: Vec<Warning>,
}

/// Result of analysing one event-tree sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceAnalysis {
    pub sequence: String,
    pub outcome: SequenceOutcome,
}

/// What a flattened sequence reduced to: a Boolean analysis, a pure
/// probability expression, or certainty.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    CutSets(McsResult),
    Expression(Expression),
    Unity,
}

/// Drives preprocessing and cut-set generation for one model.
pub struct FaultTreeAnalysis<'a> {
    model: &'a Model,
    settings: &'a Settings,
    warnings: Vec<Warning>,
}

impl<'a> FaultTreeAnalysis<'a> {
    /// Validates the model and prepares an analysis over it.
    pub fn new(model: &'a Model, settings: &'a Settings) -> Result<FaultTreeAnalysis<'a>> {
        let warnings = model.validate()?;
        Ok(FaultTreeAnalysis {
            model,
            settings,
            warnings,
        })
    }

    /// Diagnostics gathered during model validation.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Analyses the named fault tree.
    pub fn analyze(&self, fault_tree: &str) -> Result<McsResult> {
        let fault_tree = self.model.fault_tree(fault_tree).ok_or_else(|| {
            Error::InvalidModel(format!("undefined fault tree '{}'", fault_tree))
        })?;
        self.analyze_top(fault_tree.top_gate, &[])
    }

    /// Analyses the fault tree rooted at `top`, with house-event states
    /// overridden by `house_overrides`.
    pub fn analyze_top(&self, top: i32, house_overrides: &[(i32, bool)]) -> Result<McsResult> {
        let graph = IndexedGraph::from_model(self.model, top)?;
        self.run(graph, house_overrides)
    }

    /// Flattens the event tree of an initiating event and analyses every
    /// reachable sequence.
    pub fn analyze_sequences(&self, initiating_event: &str) -> Result<Vec<SequenceAnalysis>> {
        let flattened = flatten(self.model, initiating_event)?;
        let mut results = Vec::new();
        for FlattenedSequence {
            sequence,
            formula,
            expression,
            house_overrides,
        } in flattened
        {
            let outcome = if let Some(formula) = formula {
                let graph = IndexedGraph::from_formula(self.model, &formula)?;
                SequenceOutcome::CutSets(self.run(graph, &house_overrides)?)
            } else if let Some(expression) = expression {
                SequenceOutcome::Expression(expression)
            } else {
                SequenceOutcome::Unity
            };
            results.push(SequenceAnalysis { sequence, outcome });
        }
        Ok(results)
    }

    fn run(&self, mut graph: IndexedGraph, house_overrides: &[(i32, bool)]) -> Result<McsResult> {
        let (true_house, false_house) = self.house_sets(house_overrides);
        run_preprocessing(&mut graph, &true_house, &false_house)?;

        let engine = CutSetEngine::new(self.settings.limit_order());
        let generated = engine.find_cut_sets(&graph, graph.top_index())?;
        let mut pruned = generated.pruned;

        let mut module_cut_sets: IndexMap<i32, Vec<CutSet>> = IndexMap::new();
        for module in collect_modules(&graph) {
            resolve_module(
                &graph,
                &engine,
                module,
                self.settings.limit_order(),
                &mut module_cut_sets,
                &mut pruned,
            )?;
        }
        let substituted = substitute_modules(
            generated.cut_sets,
            &module_cut_sets,
            self.settings.limit_order(),
            &mut pruned,
        );
        let cut_sets = minimize(substituted);
        let order_exceeded = cut_sets.is_empty() && pruned > 0;
        debug!(
            "top {}: {} minimal cut sets, {} modules, order exceeded: {}",
            graph.top_index(),
            cut_sets.len(),
            module_cut_sets.len(),
            order_exceeded
        );
        Ok(McsResult {
            cut_sets,
            module_cut_sets,
            order_exceeded,
            warnings: self.warnings.clone(),
        })
    }

    fn house_sets(&self, overrides: &[(i32, bool)]) -> (BTreeSet<i32>, BTreeSet<i32>) {
        let mut states: IndexMap<i32, bool> = self
            .model
            .house_events
            .iter()
            .map(|house| (house.index, house.state))
            .collect();
        for &(index, state) in overrides {
            states.insert(index, state);
        }
        let mut true_house = BTreeSet::new();
        let mut false_house = BTreeSet::new();
        for (index, state) in states {
            if state {
                true_house.insert(index);
            } else {
                false_house.insert(index);
            }
        }
        (true_house, false_house)
    }
}

/// Gathers every flagged module reachable from the top, nested modules
/// included, in deterministic DFS order.
fn collect_modules(graph: &IndexedGraph) -> Vec<i32> {
    let mut modules = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![graph.top_index()];
    while let Some(index) = stack.pop() {
        if !visited.insert(index) {
            continue;
        }
        let gate = graph.gate(index);
        modules.extend(gate.modules.iter().map(|arg| arg.index()));
        stack.extend(
            gate.gates
                .iter()
                .chain(gate.modules.iter())
                .map(|arg| arg.index()),
        );
    }
    modules
}

/// Generates and caches the cut sets of one module, with any nested
/// modules substituted first.
fn resolve_module(
    graph: &IndexedGraph,
    engine: &CutSetEngine,
    module: i32,
    limit_order: usize,
    resolved: &mut IndexMap<i32, Vec<CutSet>>,
    pruned: &mut usize,
) -> Result<()> {
    if resolved.contains_key(&module) {
        return Ok(());
    }
    let generated = engine.find_cut_sets(graph, module)?;
    *pruned += generated.pruned;
    let mut inner = BTreeSet::new();
    for cut_set in &generated.cut_sets {
        for &index in cut_set {
            if index > graph.num_primary_events() {
                inner.insert(index);
            }
        }
    }
    for index in inner {
        resolve_module(graph, engine, index, limit_order, resolved, pruned)?;
    }
    let substituted = substitute_modules(generated.cut_sets, resolved, limit_order, pruned);
    resolved.insert(module, minimize(substituted));
    Ok(())
}

/// Replaces module indices inside cut sets by the module's own cut sets,
/// crossing products and pruning anything past the order limit.
fn substitute_modules(
    cut_sets: Vec<CutSet>,
    resolved: &IndexMap<i32, Vec<CutSet>>,
    limit_order: usize,
    pruned: &mut usize,
) -> Vec<CutSet> {
    let mut out = Vec::new();
    for cut_set in cut_sets {
        let (modules, basics): (Vec<i32>, Vec<i32>) = cut_set
            .iter()
            .copied()
            .partition(|index| resolved.contains_key(index));
        if modules.is_empty() {
            out.push(cut_set);
            continue;
        }
        let mut products: Vec<CutSet> = vec![basics.into_iter().collect()];
        for module in modules {
            let module_sets = &resolved[&module];
            let mut next = Vec::new();
            for product in &products {
                for module_set in module_sets {
                    match merge_cut_sets(product, module_set, limit_order) {
                        Some(merged) => next.push(merged),
                        None => *pruned += 1,
                    }
                }
            }
            products = next;
            if products.is_empty() {
                break;
            }
        }
        out.extend(products);
    }
    out
}
