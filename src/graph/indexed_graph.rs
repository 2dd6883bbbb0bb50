use super::node::*;
use crate::error::{Error, Result};
use crate::model::{Formula, GateDef, Model};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

/// Data structure that represents a fault tree as a Boolean DAG of indexed
/// gates, ready to be preprocessed and handed to the cut-set engine.
///
/// Leaves (basic and house events) keep the indices assigned by the model
/// for the life of the graph; gate indices may be minted freshly during
/// preprocessing, always strictly greater than any previously assigned.
/// The arena owns every gate; parents and children refer to each other by
/// index only, so sharing never forms ownership cycles.
///
/// # Examples
/// ```
/// use cutset::graph::{GateKind, IndexedGraph};
/// use cutset::model::{BasicEvent, GateDef, Model};
///
/// let model = Model {
///     basic_events: vec![
///         BasicEvent { id: "pump".into(), index: 1, expression: None },
///         BasicEvent { id: "valve".into(), index: 2, expression: None },
///     ],
///     gates: vec![GateDef {
///         id: "top".into(),
///         index: 3,
///         kind: GateKind::And,
///         args: vec![1, 2],
///     }],
///     ..Model::default()
/// };
/// let graph = IndexedGraph::from_model(&model, 3).unwrap();
/// assert_eq!(graph.top_index(), 3);
/// assert_eq!(graph.kind_of(3), GateKind::And);
/// assert_eq!(graph.args_of(3).len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedGraph {
    gates: IndexMap<i32, IndexedGate>,
    top_index: i32,
    negated_top: bool,
    num_basic_events: i32,
    num_primary_events: i32,
    next_index: i32,
}

impl IndexedGraph {
    fn empty(model: &Model) -> IndexedGraph {
        let max_gate_index = model.gates.iter().map(|g| g.index).max().unwrap_or(0);
        IndexedGraph {
            gates: IndexMap::new(),
            top_index: 0,
            negated_top: false,
            num_basic_events: model.num_basic_events(),
            num_primary_events: model.num_primary_events(),
            next_index: max_gate_index.max(model.num_primary_events()) + 1,
        }
    }

    /// Builds the graph for the fault tree rooted at gate `top`.
    ///
    /// Only gates reachable from `top` are materialized, in DFS order, so
    /// index allocation is deterministic for equal inputs.
    pub fn from_model(model: &Model, top: i32) -> Result<IndexedGraph> {
        let lookup = model.gate_lookup();
        if !lookup.contains_key(&top) {
            return Err(Error::InvalidModel(format!(
                "top gate {} is not defined",
                top
            )));
        }
        let mut graph = IndexedGraph::empty(model);
        let mut in_progress = HashSet::new();
        graph.materialize(&lookup, top, &mut in_progress)?;
        graph.top_index = top;
        debug!("indexed {} gates under top {}", graph.gates.len(), top);
        Ok(graph)
    }

    /// Builds the graph for a synthetic formula, minting fresh gate indices
    /// for every formula node. Model gates referenced by the formula are
    /// materialized with their model indices.
    pub fn from_formula(model: &Model, formula: &Formula) -> Result<IndexedGraph> {
        let lookup = model.gate_lookup();
        let mut graph = IndexedGraph::empty(model);
        let top = graph.materialize_formula(&lookup, formula)?;
        graph.top_index = top;
        Ok(graph)
    }

    fn materialize(
        &mut self,
        lookup: &HashMap<i32, &GateDef>,
        index: i32,
        in_progress: &mut HashSet<i32>,
    ) -> Result<()> {
        if in_progress.contains(&index) {
            return Err(Error::InvalidModel(format!("cycle through gate {}", index)));
        }
        if self.gates.contains_key(&index) {
            return Ok(());
        }
        in_progress.insert(index);
        let def = lookup[&index];
        self.gates.insert(index, IndexedGate::new(def.kind));
        for &raw in &def.args {
            if raw == 0 {
                return Err(Error::InvalidModel(format!(
                    "gate '{}' has a zero argument reference",
                    def.id
                )));
            }
            let arg = SignedIndex::new(raw);
            let child = arg.index();
            if !self.is_event(child) {
                if !lookup.contains_key(&child) {
                    return Err(Error::InvalidModel(format!(
                        "gate '{}' references undefined node {}",
                        def.id, child
                    )));
                }
                self.materialize(lookup, child, in_progress)?;
            }
            self.add_arg(index, arg);
        }
        in_progress.remove(&index);
        Ok(())
    }

    fn materialize_formula(
        &mut self,
        lookup: &HashMap<i32, &GateDef>,
        formula: &Formula,
    ) -> Result<i32> {
        let index = self.new_gate(formula.kind);
        for &raw in &formula.event_args {
            if raw == 0 {
                return Err(Error::InvalidModel(
                    "formula has a zero argument reference".into(),
                ));
            }
            let arg = SignedIndex::new(raw);
            let child = arg.index();
            if !self.is_event(child) {
                if !lookup.contains_key(&child) {
                    return Err(Error::InvalidModel(format!(
                        "formula references undefined node {}",
                        child
                    )));
                }
                let mut in_progress = HashSet::new();
                self.materialize(lookup, child, &mut in_progress)?;
            }
            self.add_arg(index, arg);
        }
        for nested in &formula.formula_args {
            let child = self.materialize_formula(lookup, nested)?;
            self.add_arg(index, SignedIndex::new(child));
        }
        Ok(index)
    }

    /// Mints a fresh gate of the given kind and returns its index.
    ///
    /// Indices are allocated monotonically, strictly greater than any index
    /// assigned before.
    pub fn new_gate(&mut self, kind: GateKind) -> i32 {
        let index = self.next_index;
        self.next_index += 1;
        self.gates.insert(index, IndexedGate::new(kind));
        index
    }

    /// Appends an argument to `parent`, maintaining the child's parent
    /// back-reference.
    ///
    /// If the complement of `arg` is already an argument, the parent
    /// collapses instead: to null for AND, to unity for OR. The argument is
    /// not inserted in that case.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a gate of this graph, or if `arg` refers
    /// to `parent` itself.
    pub fn add_arg(&mut self, parent: i32, arg: SignedIndex) {
        assert!(
            arg.index() != parent,
            "a gate cannot be its own argument"
        );
        let is_event = self.is_event(arg.index());
        let inserted_gate_arg = {
            let gate = self
                .gates
                .get_mut(&parent)
                .expect("add_arg on unknown gate");
            let set = if is_event {
                &mut gate.events
            } else {
                &mut gate.gates
            };
            if gate.kind.is_simple() && set.contains(&-arg) {
                gate.state = match gate.kind {
                    GateKind::And => GateState::Null,
                    GateKind::Or => GateState::Unity,
                    _ => unreachable!(),
                };
                false
            } else {
                set.insert(arg);
                !is_event
            }
        };
        if inserted_gate_arg {
            self.gate_mut(arg.index()).parents.insert(parent);
        }
    }

    /// Removes an argument from `parent`, maintaining parent back-references.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a gate of this graph.
    pub fn remove_arg(&mut self, parent: i32, arg: SignedIndex) {
        let is_event = self.is_event(arg.index());
        let removed_gate_arg = {
            let gate = self
                .gates
                .get_mut(&parent)
                .expect("remove_arg on unknown gate");
            if is_event {
                gate.events.remove(&arg);
                false
            } else {
                gate.gates.remove(&arg) || gate.modules.remove(&arg)
            }
        };
        if removed_gate_arg {
            self.gate_mut(arg.index()).parents.remove(&parent);
        }
    }

    /// Replaces `old` by `new` in the arguments of `parent`.
    ///
    /// Atomic from the perspective of parent-link maintenance: back-links of
    /// both the old and the new child are consistent when this returns.
    pub fn replace_arg(&mut self, parent: i32, old: SignedIndex, new: SignedIndex) {
        self.remove_arg(parent, old);
        self.add_arg(parent, new);
    }

    /// Moves the child gate `child` of `parent` into the parent's module
    /// argument set. The parent back-reference is unaffected.
    pub(crate) fn promote_to_module(&mut self, parent: i32, child: i32) {
        let arg = SignedIndex::new(child);
        let gate = self.gate_mut(parent);
        if gate.gates.remove(&arg) {
            gate.modules.insert(arg);
        }
    }

    /// Removes a gate from the arena, detaching back-references of any
    /// remaining child gates.
    ///
    /// # Panics
    ///
    /// Panics if the gate still has parents.
    pub(crate) fn remove_gate(&mut self, index: i32) {
        let children: Vec<SignedIndex> = {
            let gate = self.gate(index);
            assert!(gate.parents.is_empty(), "cannot remove a referenced gate");
            gate.gates.iter().chain(gate.modules.iter()).copied().collect()
        };
        for child in children {
            self.gate_mut(child.index()).parents.remove(&index);
        }
        self.gates.remove(&index);
    }

    /// Returns the kind of the gate at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a gate of this graph.
    pub fn kind_of(&self, index: i32) -> GateKind {
        self.gate(index).kind
    }

    /// Returns every argument of the gate at `index`, ascending by signed
    /// value within each class: events, then modules, then gates.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a gate of this graph.
    pub fn args_of(&self, index: i32) -> Vec<SignedIndex> {
        self.gate(index).args().collect()
    }

    /// Returns the parents of the node at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a gate of this graph.
    pub fn parents_of(&self, index: i32) -> Vec<i32> {
        self.gate(index).parents.iter().copied().collect()
    }

    pub fn top_index(&self) -> i32 {
        self.top_index
    }

    pub(crate) fn set_top(&mut self, top: i32) {
        self.top_index = top;
    }

    /// True if the graph's top event is the complement of the top gate.
    pub fn negated_top(&self) -> bool {
        self.negated_top
    }

    pub(crate) fn set_negated_top(&mut self, negated: bool) {
        self.negated_top = negated;
    }

    pub(crate) fn toggle_negated_top(&mut self) {
        self.negated_top = !self.negated_top;
    }

    /// True if `index` is a leaf: a basic or house event.
    pub fn is_event(&self, index: i32) -> bool {
        index >= 1 && index <= self.num_primary_events
    }

    pub fn is_basic_event(&self, index: i32) -> bool {
        index >= 1 && index <= self.num_basic_events
    }

    pub fn is_house_event(&self, index: i32) -> bool {
        index > self.num_basic_events && index <= self.num_primary_events
    }

    pub fn num_basic_events(&self) -> i32 {
        self.num_basic_events
    }

    pub fn num_primary_events(&self) -> i32 {
        self.num_primary_events
    }

    /// Returns the number of gates in the graph.
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub(crate) fn contains_gate(&self, index: i32) -> bool {
        self.gates.contains_key(&index)
    }

    #[inline(always)]
    pub(crate) fn gate(&self, index: i32) -> &IndexedGate {
        self.gates.get(&index).expect("unknown gate index")
    }

    #[inline(always)]
    pub(crate) fn gate_mut(&mut self, index: i32) -> &mut IndexedGate {
        self.gates.get_mut(&index).expect("unknown gate index")
    }

    /// Snapshot of the gate indices in arena order.
    pub(crate) fn gate_indices(&self) -> Vec<i32> {
        self.gates.keys().copied().collect()
    }

    /// Drops every gate unreachable from the top and rebuilds parent links
    /// from the surviving argument sets.
    pub(crate) fn sweep_detached(&mut self) {
        let mut reachable = HashSet::new();
        let mut stack = vec![self.top_index];
        while let Some(index) = stack.pop() {
            if !reachable.insert(index) {
                continue;
            }
            let gate = self.gate(index);
            stack.extend(
                gate.gates
                    .iter()
                    .chain(gate.modules.iter())
                    .map(|arg| arg.index()),
            );
        }
        let before = self.gates.len();
        self.gates.retain(|index, _| reachable.contains(index));
        for (_, gate) in self.gates.iter_mut() {
            gate.parents.clear();
        }
        for index in self.gate_indices() {
            let children: Vec<i32> = {
                let gate = self.gate(index);
                gate.gates
                    .iter()
                    .chain(gate.modules.iter())
                    .map(|arg| arg.index())
                    .collect()
            };
            for child in children {
                self.gate_mut(child).parents.insert(index);
            }
        }
        if before != self.gates.len() {
            debug!("sweep: {} gates -> {}", before, self.gates.len());
        }
    }

    /// Checks acyclicity by DFS colouring. Meant for `debug_assert!` use at
    /// stage boundaries; callers must never form a cycle in the first place.
    pub(crate) fn is_acyclic(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            Gray,
            Black,
        }
        fn visit(graph: &IndexedGraph, index: i32, colors: &mut HashMap<i32, Color>) -> bool {
            match colors.get(&index) {
                Some(Color::Black) => return true,
                Some(Color::Gray) => return false,
                None => {}
            }
            colors.insert(index, Color::Gray);
            let gate = graph.gate(index);
            let children: Vec<i32> = gate
                .gates
                .iter()
                .chain(gate.modules.iter())
                .map(|arg| arg.index())
                .collect();
            for child in children {
                if !visit(graph, child, colors) {
                    return false;
                }
            }
            colors.insert(index, Color::Black);
            true
        }
        let mut colors = HashMap::new();
        visit(self, self.top_index, &mut colors)
    }

    /// True if every reachable gate kind is one of `{Or, And, Null}`.
    pub(crate) fn is_normalized(&self) -> bool {
        self.gates.values().all(|gate| {
            matches!(gate.kind, GateKind::Or | GateKind::And | GateKind::Null)
        })
    }

    /// True if complements appear only on event arguments.
    pub(crate) fn has_leaf_only_signs(&self) -> bool {
        !self.negated_top
            && self.gates.values().all(|gate| {
                gate.gates.iter().chain(gate.modules.iter()).all(|arg| !arg.is_complement())
            })
    }

    /// True if no reachable gate references a house event.
    pub(crate) fn no_house_references(&self) -> bool {
        self.gates.values().all(|gate| {
            gate.events
                .iter()
                .all(|arg| !self.is_house_event(arg.index()))
        })
    }

    /// Writes the graph as a DOT document for visual inspection.
    pub fn graphing_instructions<W: Write>(&self, out: &mut W) -> io::Result<()> {
        use petgraph::dot::Dot;
        let mut dot = petgraph::Graph::<String, &str>::new();
        let mut nodes = HashMap::new();
        for (&index, gate) in &self.gates {
            nodes.insert(index, dot.add_node(format!("{}:{}", gate.kind, index)));
        }
        for (&index, gate) in &self.gates {
            for arg in gate.args() {
                let child = arg.index();
                let child_node = if self.is_event(child) {
                    *nodes.entry(child).or_insert_with(|| {
                        let tag = if child <= self.num_basic_events {
                            "B"
                        } else {
                            "H"
                        };
                        dot.add_node(format!("{}{}", tag, child))
                    })
                } else {
                    nodes[&child]
                };
                let label = if arg.is_complement() { "!" } else { "" };
                dot.add_edge(child_node, nodes[&index], label);
            }
        }
        write!(out, "{:?}", Dot::new(&dot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BasicEvent;

    fn two_event_model() -> Model {
        Model {
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
            gates: vec![GateDef {
                id: "top".into(),
                index: 3,
                kind: GateKind::And,
                args: vec![1, 2],
            }],
            ..Model::default()
        }
    }

    #[test]
    fn test_from_model_materializes_reachable_gates() {
        let model = two_event_model();
        let graph = IndexedGraph::from_model(&model, 3).unwrap();
        assert_eq!(graph.gate_count(), 1);
        assert_eq!(graph.kind_of(3), GateKind::And);
        assert_eq!(
            graph.args_of(3),
            vec![SignedIndex::new(1), SignedIndex::new(2)]
        );
    }

    #[test]
    fn test_fresh_indices_are_monotonic() {
        let model = two_event_model();
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        let g1 = graph.new_gate(GateKind::Or);
        let g2 = graph.new_gate(GateKind::And);
        assert!(g1 > 3);
        assert!(g2 > g1);
    }

    #[test]
    fn test_complement_collision_collapses_parent() {
        let model = two_event_model();
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();

        let and = graph.new_gate(GateKind::And);
        graph.add_arg(and, si!(1));
        graph.add_arg(and, si!(-1));
        assert_eq!(graph.gate(and).state, GateState::Null);
        // The colliding argument is not inserted.
        assert_eq!(graph.args_of(and), vec![si!(1)]);

        let or = graph.new_gate(GateKind::Or);
        graph.add_arg(or, si!(2));
        graph.add_arg(or, si!(-2));
        assert_eq!(graph.gate(or).state, GateState::Unity);
    }

    #[test]
    fn test_parent_links_follow_edits() {
        let model = two_event_model();
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        let child = graph.new_gate(GateKind::Or);
        graph.add_arg(child, si!(1));
        graph.add_arg(3, si!(child));
        assert_eq!(graph.parents_of(child), vec![3]);

        let other = graph.new_gate(GateKind::Or);
        graph.add_arg(other, si!(2));
        graph.replace_arg(3, si!(child), si!(other));
        assert_eq!(graph.parents_of(child), Vec::<i32>::new());
        assert_eq!(graph.parents_of(other), vec![3]);
    }

    #[test]
    fn test_sweep_drops_unreachable_gates() {
        let model = two_event_model();
        let mut graph = IndexedGraph::from_model(&model, 3).unwrap();
        let orphan = graph.new_gate(GateKind::Or);
        graph.add_arg(orphan, si!(1));
        assert_eq!(graph.gate_count(), 2);
        graph.sweep_detached();
        assert_eq!(graph.gate_count(), 1);
        assert!(!graph.contains_gate(orphan));
    }

    #[test]
    fn test_acyclicity_check() {
        let model = two_event_model();
        let graph = IndexedGraph::from_model(&model, 3).unwrap();
        assert!(graph.is_acyclic());
    }
}
