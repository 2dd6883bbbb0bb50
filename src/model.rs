//! In-memory model manifest handed to the analysis by an initializer.
//!
//! The manifest is already indexed: basic events occupy `[1, B]`, house
//! events `[B + 1, B + H]` and gates any indices above that. Validation
//! checks the layout, reference integrity and gate arities before any
//! graph is built, and reports non-fatal diagnostics as [Warning]s.

use crate::error::{Error, Result};
use crate::event_tree::{EventTree, InitiatingEvent, Sequence};
use crate::graph::GateKind;
use std::collections::{HashMap, HashSet};

/// A leaf random variable with an optional probability expression.
#[derive(Debug, Clone)]
pub struct BasicEvent {
    pub id: String,
    pub index: i32,
    pub expression: Option<Expression>,
}

/// A leaf variable fixed to a truth value at analysis time.
#[derive(Debug, Clone)]
pub struct HouseEvent {
    pub id: String,
    pub index: i32,
    pub state: bool,
}

/// A named expression that other expressions can refer to.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: String,
    pub expression: Expression,
}

/// A gate definition with signed argument indices.
#[derive(Debug, Clone)]
pub struct GateDef {
    pub id: String,
    pub index: i32,
    pub kind: GateKind,
    pub args: Vec<i32>,
}

/// A fault tree rooted at a top gate.
#[derive(Debug, Clone)]
pub struct FaultTreeDef {
    pub id: String,
    pub top_gate: i32,
}

/// Probability expression tree.
///
/// The core only carries expressions around; numeric evaluation belongs to
/// the excluded probability analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(f64),
    Parameter(String),
    MissionTime,
    Add(Vec<Expression>),
    Mul(Vec<Expression>),
}

impl Expression {
    pub(crate) fn collect_parameters(&self, out: &mut HashSet<String>) {
        match self {
            Expression::Constant(_) | Expression::MissionTime => {}
            Expression::Parameter(id) => {
                out.insert(id.clone());
            }
            Expression::Add(args) | Expression::Mul(args) => {
                for arg in args {
                    arg.collect_parameters(out);
                }
            }
        }
    }
}

/// A Boolean formula over signed node references and nested formulas.
///
/// Formulas appear in event-tree instructions and become synthetic gates
/// when a sequence is handed to the fault-tree core.
#[derive(Debug, Clone)]
pub struct Formula {
    pub kind: GateKind,
    pub event_args: Vec<i32>,
    pub formula_args: Vec<Formula>,
}

impl Formula {
    pub(crate) fn collect_node_refs(&self, out: &mut HashSet<i32>) {
        for &arg in &self.event_args {
            out.insert(arg.abs());
        }
        for arg in &self.formula_args {
            arg.collect_node_refs(out);
        }
    }
}

/// Non-fatal diagnostics returned alongside analysis results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A basic or house event defined in the model but referenced nowhere.
    OrphanPrimaryEvent { id: String },
    /// A parameter no expression refers to.
    UnusedParameter { id: String },
}

/// The complete model manifest.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub basic_events: Vec<BasicEvent>,
    pub house_events: Vec<HouseEvent>,
    pub parameters: Vec<Parameter>,
    pub gates: Vec<GateDef>,
    pub fault_trees: Vec<FaultTreeDef>,
    pub event_trees: Vec<EventTree>,
    pub sequences: Vec<Sequence>,
    pub initiating_events: Vec<InitiatingEvent>,
}

impl Model {
    /// Number of basic events; leaf indices `1..=B` belong to them.
    pub fn num_basic_events(&self) -> i32 {
        self.basic_events.len() as i32
    }

    /// Number of primary events, basic and house together.
    pub fn num_primary_events(&self) -> i32 {
        (self.basic_events.len() + self.house_events.len()) as i32
    }

    pub fn is_basic_event(&self, index: i32) -> bool {
        index >= 1 && index <= self.num_basic_events()
    }

    pub fn is_house_event(&self, index: i32) -> bool {
        index > self.num_basic_events() && index <= self.num_primary_events()
    }

    pub fn fault_tree(&self, id: &str) -> Option<&FaultTreeDef> {
        self.fault_trees.iter().find(|ft| ft.id == id)
    }

    pub fn event_tree(&self, id: &str) -> Option<&EventTree> {
        self.event_trees.iter().find(|et| et.id == id)
    }

    pub fn sequence(&self, id: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.id == id)
    }

    pub fn initiating_event(&self, id: &str) -> Option<&InitiatingEvent> {
        self.initiating_events.iter().find(|ie| ie.id == id)
    }

    pub fn house_event_by_id(&self, id: &str) -> Option<&HouseEvent> {
        self.house_events.iter().find(|h| h.id == id)
    }

    /// Gate definitions keyed by index, for O(1) lookup during construction.
    pub(crate) fn gate_lookup(&self) -> HashMap<i32, &GateDef> {
        self.gates.iter().map(|g| (g.index, g)).collect()
    }

    /// Validates the manifest and returns non-fatal diagnostics.
    ///
    /// Index layout, reference integrity, gate arities and gate acyclicity
    /// are all checked here, before any graph mutation.
    pub fn validate(&self) -> Result<Vec<Warning>> {
        self.check_unique_ids()?;
        self.check_index_layout()?;
        let lookup = self.gate_lookup();
        for gate in &self.gates {
            self.check_gate(gate, &lookup)?;
        }
        self.check_gate_cycles(&lookup)?;
        crate::event_tree::check_event_tree_references(self)?;
        Ok(self.collect_warnings())
    }

    fn check_unique_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let all = self
            .basic_events
            .iter()
            .map(|e| &e.id)
            .chain(self.house_events.iter().map(|e| &e.id))
            .chain(self.parameters.iter().map(|p| &p.id))
            .chain(self.gates.iter().map(|g| &g.id));
        for id in all {
            if !seen.insert(id.as_str()) {
                return Err(Error::InvalidModel(format!("duplicate definition of '{}'", id)));
            }
        }
        Ok(())
    }

    fn check_index_layout(&self) -> Result<()> {
        let b = self.num_basic_events();
        let p = self.num_primary_events();
        let mut basic: Vec<i32> = self.basic_events.iter().map(|e| e.index).collect();
        basic.sort_unstable();
        if basic != (1..=b).collect::<Vec<i32>>() {
            return Err(Error::InvalidModel(
                "basic event indices must cover 1..=B exactly".into(),
            ));
        }
        let mut house: Vec<i32> = self.house_events.iter().map(|e| e.index).collect();
        house.sort_unstable();
        if house != (b + 1..=p).collect::<Vec<i32>>() {
            return Err(Error::InvalidModel(
                "house event indices must cover B+1..=B+H exactly".into(),
            ));
        }
        let mut gates = HashSet::new();
        for gate in &self.gates {
            if gate.index <= p {
                return Err(Error::InvalidModel(format!(
                    "gate '{}' overlaps the primary event index range",
                    gate.id
                )));
            }
            if !gates.insert(gate.index) {
                return Err(Error::InvalidModel(format!(
                    "gate index {} defined twice",
                    gate.index
                )));
            }
        }
        Ok(())
    }

    fn check_gate(&self, gate: &GateDef, lookup: &HashMap<i32, &GateDef>) -> Result<()> {
        match gate.kind {
            GateKind::Not | GateKind::Null => {
                if gate.args.len() != 1 {
                    return Err(Error::InvalidModel(format!(
                        "gate '{}' of kind {} must have exactly one argument",
                        gate.id, gate.kind
                    )));
                }
            }
            GateKind::AtLeast(k) => {
                if k == 0 || k > gate.args.len() {
                    return Err(Error::InvalidModel(format!(
                        "gate '{}' has vote number {} out of range for {} arguments",
                        gate.id,
                        k,
                        gate.args.len()
                    )));
                }
            }
            _ => {}
        }
        for &arg in &gate.args {
            if arg == 0 {
                return Err(Error::InvalidModel(format!(
                    "gate '{}' has a zero argument reference",
                    gate.id
                )));
            }
            let index = arg.abs();
            let defined = self.is_basic_event(index)
                || self.is_house_event(index)
                || lookup.contains_key(&index);
            if !defined {
                return Err(Error::InvalidModel(format!(
                    "gate '{}' references undefined node {}",
                    gate.id, index
                )));
            }
        }
        Ok(())
    }

    fn check_gate_cycles(&self, lookup: &HashMap<i32, &GateDef>) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            Gray,
            Black,
        }
        fn visit(
            index: i32,
            lookup: &HashMap<i32, &GateDef>,
            colors: &mut HashMap<i32, Color>,
        ) -> Result<()> {
            match colors.get(&index) {
                Some(Color::Black) => return Ok(()),
                Some(Color::Gray) => {
                    return Err(Error::InvalidModel(format!(
                        "cycle through gate '{}'",
                        lookup[&index].id
                    )));
                }
                None => {}
            }
            colors.insert(index, Color::Gray);
            for &arg in &lookup[&index].args {
                if lookup.contains_key(&arg.abs()) {
                    visit(arg.abs(), lookup, colors)?;
                }
            }
            colors.insert(index, Color::Black);
            Ok(())
        }

        let mut colors = HashMap::new();
        for gate in &self.gates {
            visit(gate.index, lookup, &mut colors)?;
        }
        Ok(())
    }

    fn collect_warnings(&self) -> Vec<Warning> {
        let mut referenced_nodes = HashSet::new();
        for gate in &self.gates {
            for &arg in &gate.args {
                referenced_nodes.insert(arg.abs());
            }
        }
        let mut referenced_parameters = HashSet::new();
        for event in &self.basic_events {
            if let Some(expression) = &event.expression {
                expression.collect_parameters(&mut referenced_parameters);
            }
        }
        for parameter in &self.parameters {
            parameter
                .expression
                .collect_parameters(&mut referenced_parameters);
        }
        crate::event_tree::collect_references(
            self,
            &mut referenced_nodes,
            &mut referenced_parameters,
        );

        let mut warnings = Vec::new();
        for event in &self.basic_events {
            if !referenced_nodes.contains(&event.index) {
                warnings.push(Warning::OrphanPrimaryEvent {
                    id: event.id.clone(),
                });
            }
        }
        for event in &self.house_events {
            if !referenced_nodes.contains(&event.index) {
                warnings.push(Warning::OrphanPrimaryEvent {
                    id: event.id.clone(),
                });
            }
        }
        for parameter in &self.parameters {
            if !referenced_parameters.contains(&parameter.id) {
                warnings.push(Warning::UnusedParameter {
                    id: parameter.id.clone(),
                });
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: &str, index: i32) -> BasicEvent {
        BasicEvent {
            id: id.into(),
            index,
            expression: None,
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
    fn test_layout_validation() {
        let model = Model {
            basic_events: vec![basic("a", 1), basic("b", 3)],
            ..Model::default()
        };
        assert!(matches!(model.validate(), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn test_undefined_reference() {
        let model = Model {
            basic_events: vec![basic("a", 1)],
            gates: vec![gate("top", 2, GateKind::And, vec![1, 9])],
            ..Model::default()
        };
        assert!(matches!(model.validate(), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn test_gate_cycle_is_rejected() {
        let model = Model {
            basic_events: vec![basic("a", 1)],
            gates: vec![
                gate("g2", 2, GateKind::And, vec![1, 3]),
                gate("g3", 3, GateKind::Or, vec![1, 2]),
            ],
            ..Model::default()
        };
        assert!(matches!(model.validate(), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn test_vote_number_range() {
        let model = Model {
            basic_events: vec![basic("a", 1), basic("b", 2)],
            gates: vec![gate("top", 3, GateKind::AtLeast(3), vec![1, 2])],
            ..Model::default()
        };
        assert!(matches!(model.validate(), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn test_orphan_and_unused_warnings() {
        let model = Model {
            basic_events: vec![basic("a", 1), basic("orphan", 2)],
            parameters: vec![Parameter {
                id: "lambda".into(),
                expression: Expression::Constant(1e-3),
            }],
            gates: vec![gate("top", 3, GateKind::Or, vec![1])],
            ..Model::default()
        };
        let warnings = model.validate().unwrap();
        assert_eq!(
            warnings,
            vec![
                Warning::OrphanPrimaryEvent { id: "orphan".into() },
                Warning::UnusedParameter { id: "lambda".into() },
            ]
        );
    }

    #[test]
    fn test_valid_model_has_no_warnings() {
        let model = Model {
            basic_events: vec![basic("a", 1), basic("b", 2)],
            gates: vec![gate("top", 3, GateKind::And, vec![1, 2])],
            fault_trees: vec![FaultTreeDef {
                id: "ft".into(),
                top_gate: 3,
            }],
            ..Model::default()
        };
        assert_eq!(model.validate().unwrap(), vec![]);
    }
}
