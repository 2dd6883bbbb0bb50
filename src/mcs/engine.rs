use super::simple_gate::{SimpleKind, SimpleTree};
use super::CutSet;
use crate::error::{Error, Result};
use crate::graph::{GateKind, IndexedGraph};
use itertools::Itertools;
use log::debug;
use std::collections::{BTreeSet, HashMap};

/// Cut sets generated for one top gate, before minimality against
/// substituted modules is settled by the caller.
#[derive(Debug, Clone)]
pub(crate) struct GeneratedCutSets {
    pub cut_sets: Vec<CutSet>,
    /// Number of candidate products discarded for exceeding the order
    /// limit during expansion.
    pub pruned: usize,
}

/// Expands a preprocessed graph into minimal cut sets by alternating
/// OR/AND layer expansion with early order-bound pruning.
pub(crate) struct CutSetEngine {
    limit_order: usize,
}

impl CutSetEngine {
    pub fn new(limit_order: usize) -> CutSetEngine {
        CutSetEngine { limit_order }
    }

    /// Generates minimal cut sets for the gate at `top`.
    ///
    /// Constant and NULL tops resolve directly: a unity top yields the
    /// single empty cut set, a null top yields none, and a transparent
    /// NULL gate resolves through its argument.
    pub fn find_cut_sets(&self, graph: &IndexedGraph, top: i32) -> Result<GeneratedCutSets> {
        let gate = graph.gate(top);
        match gate.state.constant_value() {
            Some(true) => {
                return Ok(GeneratedCutSets {
                    cut_sets: vec![CutSet::new()],
                    pruned: 0,
                });
            }
            Some(false) => {
                return Ok(GeneratedCutSets {
                    cut_sets: Vec::new(),
                    pruned: 0,
                });
            }
            None => {}
        }
        if gate.kind == GateKind::Null {
            let arg = gate.single_arg().ok_or_else(|| {
                Error::Internal("normal NULL gate without a single argument".into())
            })?;
            if arg.is_complement() {
                return Err(Error::UnsupportedFeature(format!(
                    "non-coherent fault tree: complemented top argument {}",
                    arg.index()
                )));
            }
            if graph.is_event(arg.index()) {
                let mut cut_set = CutSet::new();
                cut_set.push(arg.index());
                return Ok(GeneratedCutSets {
                    cut_sets: vec![cut_set],
                    pruned: 0,
                });
            }
            return self.find_cut_sets(graph, arg.index());
        }
        if gate.arg_count() == 0 {
            // An argument-less AND top is trivially true, an OR trivially
            // false.
            let cut_sets = match gate.kind {
                GateKind::And => vec![CutSet::new()],
                GateKind::Or => Vec::new(),
                other => {
                    return Err(Error::Internal(format!(
                        "cut-set expansion reached a {} top",
                        other
                    )));
                }
            };
            return Ok(GeneratedCutSets {
                cut_sets,
                pruned: 0,
            });
        }

        let tree = SimpleTree::from_graph(graph, top)?;
        let mut memo = HashMap::new();
        let mut pruned = 0;
        let candidates = self.expand(&tree, tree.top, &mut memo, &mut pruned);
        let cut_sets = minimize(candidates);
        debug!(
            "top {}: {} minimal cut sets, {} candidates pruned past order {}",
            top,
            cut_sets.len(),
            pruned,
            self.limit_order
        );
        Ok(GeneratedCutSets { cut_sets, pruned })
    }

    fn expand(
        &self,
        tree: &SimpleTree,
        id: usize,
        memo: &mut HashMap<usize, Vec<CutSet>>,
        pruned: &mut usize,
    ) -> Vec<CutSet> {
        if let Some(cached) = memo.get(&id) {
            return cached.clone();
        }
        let candidates = match tree.gates[id].kind {
            SimpleKind::Or => self.expand_or_layer(tree, id, memo, pruned),
            SimpleKind::And => self.expand_and_layer(tree, id, memo, pruned),
        };
        memo.insert(id, candidates.clone());
        candidates
    }

    /// Every leaf of an OR gate becomes a singleton candidate; child gates
    /// contribute their own candidate sets. The union is deduplicated.
    fn expand_or_layer(
        &self,
        tree: &SimpleTree,
        id: usize,
        memo: &mut HashMap<usize, Vec<CutSet>>,
        pruned: &mut usize,
    ) -> Vec<CutSet> {
        let gate = &tree.gates[id];
        let mut candidates: BTreeSet<CutSet> = BTreeSet::new();
        for &event in gate.basic_events.iter().chain(gate.modules.iter()) {
            let mut cut_set = CutSet::new();
            cut_set.push(event);
            candidates.insert(cut_set);
        }
        for &child in &gate.gates {
            for cut_set in self.expand(tree, child, memo, pruned) {
                candidates.insert(cut_set);
            }
        }
        candidates.into_iter().collect()
    }

    /// An AND gate starts from the product of its own leaves and crosses
    /// it with every child's candidate set, pruning products that exceed
    /// the order limit as soon as they appear.
    fn expand_and_layer(
        &self,
        tree: &SimpleTree,
        id: usize,
        memo: &mut HashMap<usize, Vec<CutSet>>,
        pruned: &mut usize,
    ) -> Vec<CutSet> {
        let gate = &tree.gates[id];
        let mut base = CutSet::new();
        base.extend(gate.basic_events.iter().copied());
        base.extend(gate.modules.iter().copied());
        base.sort_unstable();
        if base.len() > self.limit_order {
            *pruned += 1;
            return Vec::new();
        }
        let mut products = vec![base];
        for &child in &gate.gates {
            let child_candidates = self.expand(tree, child, memo, pruned);
            products = products
                .iter()
                .cartesian_product(child_candidates.iter())
                .filter_map(|(product, candidate)| {
                    match merge_cut_sets(product, candidate, self.limit_order) {
                        Some(merged) => Some(merged),
                        None => {
                            *pruned += 1;
                            None
                        }
                    }
                })
                .collect();
            if products.is_empty() {
                break;
            }
        }
        products
    }
}

/// Sorted-set union of two cut sets; None if the union exceeds the limit.
pub(crate) fn merge_cut_sets(a: &[i32], b: &[i32], limit_order: usize) -> Option<CutSet> {
    let mut merged = CutSet::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            merged.push(a[i]);
            i += 1;
        } else if b[j] < a[i] {
            merged.push(b[j]);
            j += 1;
        } else {
            merged.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    if merged.len() > limit_order {
        None
    } else {
        Some(merged)
    }
}

/// Reduces candidates to minimal cut sets: sorted by cardinality, then
/// lexicographically, a candidate survives iff no accepted set is a subset
/// of it. The sort also makes the output order deterministic.
pub(crate) fn minimize(mut candidates: Vec<CutSet>) -> Vec<CutSet> {
    candidates.sort_unstable_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let mut minimal: Vec<CutSet> = Vec::new();
    'candidates: for candidate in candidates {
        for accepted in &minimal {
            if is_subset(accepted, &candidate) {
                continue 'candidates;
            }
        }
        minimal.push(candidate);
    }
    minimal
}

/// True if sorted slice `a` is a subset of sorted slice `b`.
fn is_subset(a: &[i32], b: &[i32]) -> bool {
    let mut j = 0;
    for &x in a {
        loop {
            if j >= b.len() {
                return false;
            }
            if b[j] == x {
                j += 1;
                break;
            }
            if b[j] > x {
                return false;
            }
            j += 1;
        }
    }
    true
}
