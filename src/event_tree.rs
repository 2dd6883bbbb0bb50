//! Event-tree model and flattening.
//!
//! An event tree is a forest of forks over an initiating event, with named
//! sequences as terminals. Flattening walks every path from the initial
//! state, collecting formulas, expressions and house-event overrides along
//! the way, and folds each reachable sequence into one synthetic top-level
//! formula (OR over paths of AND over collected formulas) or one summed
//! expression, which the fault-tree core then analyses.

use crate::error::{Error, Result};
use crate::graph::GateKind;
use crate::model::{Expression, Formula, GateDef, Model};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// An initiating event bound to the event tree it starts.
#[derive(Debug, Clone)]
pub struct InitiatingEvent {
    pub id: String,
    pub event_tree: String,
}

/// An event tree rooted at its initial state.
#[derive(Debug, Clone)]
pub struct EventTree {
    pub id: String,
    pub initial_state: Branch,
}

/// A named terminal sequence with its own instructions.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub id: String,
    pub instructions: Vec<Instruction>,
}

/// A chain of instructions ending in a fork or a sequence.
#[derive(Debug, Clone)]
pub struct Branch {
    pub instructions: Vec<Instruction>,
    pub target: Target,
}

#[derive(Debug, Clone)]
pub enum Target {
    Sequence(String),
    Fork(Fork),
}

/// A branching point over the states of a functional event.
#[derive(Debug, Clone)]
pub struct Fork {
    pub functional_event: String,
    pub paths: Vec<Path>,
}

/// One fork arm: the functional-event state it represents and the branch
/// it continues into.
#[derive(Debug, Clone)]
pub struct Path {
    pub state: String,
    pub branch: Branch,
}

/// Instructions visited along event-tree paths.
#[derive(Debug, Clone)]
pub enum Instruction {
    SetHouseEvent { id: String, state: bool },
    Link { event_tree: String },
    CollectFormula(Formula),
    CollectExpression(Expression),
}

/// Everything collected along one path from the initial state to a
/// sequence terminal.
#[derive(Debug, Clone, Default)]
struct PathCollector {
    formulas: Vec<Formula>,
    expressions: Vec<Expression>,
    house_overrides: IndexMap<i32, bool>,
}

/// One reachable sequence after flattening: either a synthetic formula or
/// a summed expression, never both, plus the house-event overrides its
/// paths accumulated.
#[derive(Debug, Clone)]
pub struct FlattenedSequence {
    pub sequence: String,
    pub formula: Option<Formula>,
    pub expression: Option<Expression>,
    pub house_overrides: Vec<(i32, bool)>,
}

struct Walker<'a> {
    model: &'a Model,
    sequences: IndexMap<String, Vec<PathCollector>>,
    link_stack: Vec<String>,
}

impl<'a> Walker<'a> {
    fn branch(&mut self, branch: &Branch, mut path: PathCollector) -> Result<()> {
        self.instructions(&branch.instructions, &mut path)?;
        match &branch.target {
            Target::Fork(fork) => {
                for fork_path in &fork.paths {
                    self.branch(&fork_path.branch, path.clone())?;
                }
                Ok(())
            }
            Target::Sequence(name) => {
                let model = self.model;
                let sequence = model.sequence(name).ok_or_else(|| {
                    Error::InvalidModel(format!("undefined sequence '{}'", name))
                })?;
                let mut path = path;
                let linked = self.instructions(&sequence.instructions, &mut path)?;
                if !linked {
                    self.sequences.entry(name.clone()).or_default().push(path);
                }
                Ok(())
            }
        }
    }

    /// Applies a batch of instructions to the current path. Returns true
    /// if the batch transferred control through a Link, in which case the
    /// surrounding sequence must not register.
    fn instructions(
        &mut self,
        instructions: &[Instruction],
        path: &mut PathCollector,
    ) -> Result<bool> {
        let mut linked = false;
        for instruction in instructions {
            match instruction {
                Instruction::SetHouseEvent { id, state } => {
                    let house = self.model.house_event_by_id(id).ok_or_else(|| {
                        Error::InvalidModel(format!("undefined house event '{}'", id))
                    })?;
                    // Later writes along the same path win.
                    path.house_overrides.insert(house.index, *state);
                }
                Instruction::Link { event_tree } => {
                    linked = true;
                    if self.link_stack.iter().any(|id| id == event_tree) {
                        return Err(Error::InvalidModel(format!(
                            "event tree link cycle through '{}'",
                            event_tree
                        )));
                    }
                    let model = self.model;
                    let tree = model.event_tree(event_tree).ok_or_else(|| {
                        Error::InvalidModel(format!("undefined event tree '{}'", event_tree))
                    })?;
                    self.link_stack.push(event_tree.clone());
                    self.branch(&tree.initial_state, path.clone())?;
                    self.link_stack.pop();
                }
                Instruction::CollectFormula(formula) => path.formulas.push(formula.clone()),
                Instruction::CollectExpression(expression) => {
                    path.expressions.push(expression.clone())
                }
            }
        }
        Ok(linked)
    }
}

/// Flattens the event tree of an initiating event into per-sequence
/// synthetic formulas and expressions.
///
/// Fork arms clone the path context, so sibling arms never observe each
/// other's house-event writes; a sequence reached by several paths merges
/// their override maps with later paths winning on conflicts.
pub fn flatten(model: &Model, initiating_event: &str) -> Result<Vec<FlattenedSequence>> {
    let initiating = model.initiating_event(initiating_event).ok_or_else(|| {
        Error::InvalidModel(format!("undefined initiating event '{}'", initiating_event))
    })?;
    let tree = model.event_tree(&initiating.event_tree).ok_or_else(|| {
        Error::InvalidModel(format!(
            "undefined event tree '{}'",
            initiating.event_tree
        ))
    })?;
    let mut walker = Walker {
        model,
        sequences: IndexMap::new(),
        link_stack: vec![tree.id.clone()],
    };
    walker.branch(&tree.initial_state, PathCollector::default())?;

    let mut flattened = Vec::new();
    for (name, paths) in walker.sequences {
        let mut gate_formulas = Vec::new();
        let mut arg_expressions = Vec::new();
        let mut house_overrides: IndexMap<i32, bool> = IndexMap::new();
        for path in paths {
            let PathCollector {
                mut formulas,
                mut expressions,
                house_overrides: overrides,
            } = path;
            match formulas.len() {
                0 => {}
                1 => gate_formulas.push(formulas.pop().unwrap()),
                _ => gate_formulas.push(Formula {
                    kind: GateKind::And,
                    event_args: Vec::new(),
                    formula_args: formulas,
                }),
            }
            match expressions.len() {
                0 => {}
                1 => arg_expressions.push(expressions.pop().unwrap()),
                _ => arg_expressions.push(Expression::Mul(expressions)),
            }
            house_overrides.extend(overrides);
        }
        if !gate_formulas.is_empty() && !arg_expressions.is_empty() {
            return Err(Error::InvalidModel(format!(
                "sequence '{}' collects both formulas and expressions",
                name
            )));
        }
        let formula = match gate_formulas.len() {
            0 => None,
            1 => Some(gate_formulas.pop().unwrap()),
            _ => Some(Formula {
                kind: GateKind::Or,
                event_args: Vec::new(),
                formula_args: gate_formulas,
            }),
        };
        let expression = match arg_expressions.len() {
            0 => None,
            1 => Some(arg_expressions.pop().unwrap()),
            _ => Some(Expression::Add(arg_expressions)),
        };
        flattened.push(FlattenedSequence {
            sequence: name,
            formula,
            expression,
            house_overrides: house_overrides.into_iter().collect(),
        });
    }
    Ok(flattened)
}

/// Records which nodes and parameters event trees refer to, for the
/// orphan/unused diagnostics.
pub(crate) fn collect_references(
    model: &Model,
    nodes: &mut HashSet<i32>,
    parameters: &mut HashSet<String>,
) {
    for tree in &model.event_trees {
        collect_branch(model, &tree.initial_state, nodes, parameters);
    }
    for sequence in &model.sequences {
        collect_instructions(model, &sequence.instructions, nodes, parameters);
    }
}

fn collect_branch(
    model: &Model,
    branch: &Branch,
    nodes: &mut HashSet<i32>,
    parameters: &mut HashSet<String>,
) {
    collect_instructions(model, &branch.instructions, nodes, parameters);
    if let Target::Fork(fork) = &branch.target {
        for path in &fork.paths {
            collect_branch(model, &path.branch, nodes, parameters);
        }
    }
}

fn collect_instructions(
    model: &Model,
    instructions: &[Instruction],
    nodes: &mut HashSet<i32>,
    parameters: &mut HashSet<String>,
) {
    for instruction in instructions {
        match instruction {
            Instruction::SetHouseEvent { id, .. } => {
                if let Some(house) = model.house_event_by_id(id) {
                    nodes.insert(house.index);
                }
            }
            Instruction::Link { .. } => {}
            Instruction::CollectFormula(formula) => formula.collect_node_refs(nodes),
            Instruction::CollectExpression(expression) => {
                expression.collect_parameters(parameters)
            }
        }
    }
}

/// Checks that every reference inside event trees resolves: linked trees,
/// sequences, house events, formula nodes and expression parameters.
pub(crate) fn check_event_tree_references(model: &Model) -> Result<()> {
    let lookup = model.gate_lookup();
    for initiating in &model.initiating_events {
        if model.event_tree(&initiating.event_tree).is_none() {
            return Err(Error::InvalidModel(format!(
                "initiating event '{}' references undefined event tree '{}'",
                initiating.id, initiating.event_tree
            )));
        }
    }
    for tree in &model.event_trees {
        check_branch(model, &lookup, &tree.initial_state)?;
    }
    for sequence in &model.sequences {
        check_instructions(model, &lookup, &sequence.instructions)?;
    }
    Ok(())
}

fn check_branch(
    model: &Model,
    lookup: &HashMap<i32, &GateDef>,
    branch: &Branch,
) -> Result<()> {
    check_instructions(model, lookup, &branch.instructions)?;
    match &branch.target {
        Target::Sequence(name) => {
            if model.sequence(name).is_none() {
                return Err(Error::InvalidModel(format!(
                    "undefined sequence '{}'",
                    name
                )));
            }
        }
        Target::Fork(fork) => {
            for path in &fork.paths {
                check_branch(model, lookup, &path.branch)?;
            }
        }
    }
    Ok(())
}

fn check_instructions(
    model: &Model,
    lookup: &HashMap<i32, &GateDef>,
    instructions: &[Instruction],
) -> Result<()> {
    for instruction in instructions {
        match instruction {
            Instruction::SetHouseEvent { id, .. } => {
                if model.house_event_by_id(id).is_none() {
                    return Err(Error::InvalidModel(format!(
                        "undefined house event '{}'",
                        id
                    )));
                }
            }
            Instruction::Link { event_tree } => {
                if model.event_tree(event_tree).is_none() {
                    return Err(Error::InvalidModel(format!(
                        "undefined event tree '{}'",
                        event_tree
                    )));
                }
            }
            Instruction::CollectFormula(formula) => check_formula(model, lookup, formula)?,
            Instruction::CollectExpression(expression) => {
                let mut referenced = HashSet::new();
                expression.collect_parameters(&mut referenced);
                for parameter in referenced {
                    if !model.parameters.iter().any(|p| p.id == parameter) {
                        return Err(Error::InvalidModel(format!(
                            "undefined parameter '{}'",
                            parameter
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_formula(
    model: &Model,
    lookup: &HashMap<i32, &GateDef>,
    formula: &Formula,
) -> Result<()> {
    let arity = formula.event_args.len() + formula.formula_args.len();
    match formula.kind {
        GateKind::Not | GateKind::Null => {
            if arity != 1 {
                return Err(Error::InvalidModel(format!(
                    "formula of kind {} must have exactly one argument",
                    formula.kind
                )));
            }
        }
        GateKind::AtLeast(k) => {
            if k == 0 || k > arity {
                return Err(Error::InvalidModel(format!(
                    "formula has vote number {} out of range for {} arguments",
                    k, arity
                )));
            }
        }
        _ => {}
    }
    for &arg in &formula.event_args {
        if arg == 0 {
            return Err(Error::InvalidModel(
                "formula has a zero argument reference".into(),
            ));
        }
        let index = arg.abs();
        let defined = model.is_basic_event(index)
            || model.is_house_event(index)
            || lookup.contains_key(&index);
        if !defined {
            return Err(Error::InvalidModel(format!(
                "formula references undefined node {}",
                index
            )));
        }
    }
    for nested in &formula.formula_args {
        check_formula(model, lookup, nested)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BasicEvent, HouseEvent};

    fn collect_event(index: i32) -> Instruction {
        Instruction::CollectFormula(Formula {
            kind: GateKind::Null,
            event_args: vec![index],
            formula_args: Vec::new(),
        })
    }

    fn sequence_branch(instructions: Vec<Instruction>, sequence: &str) -> Branch {
        Branch {
            instructions,
            target: Target::Sequence(sequence.into()),
        }
    }

    fn base_model() -> Model {
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
            house_events: vec![HouseEvent {
                id: "h".into(),
                index: 3,
                state: false,
            }],
            sequences: vec![
                Sequence {
                    id: "S1".into(),
                    instructions: Vec::new(),
                },
                Sequence {
                    id: "S2".into(),
                    instructions: Vec::new(),
                },
            ],
            initiating_events: vec![InitiatingEvent {
                id: "init".into(),
                event_tree: "et".into(),
            }],
            ..Model::default()
        }
    }

    #[test]
    fn test_fork_registers_both_sequences() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: Branch {
                instructions: Vec::new(),
                target: Target::Fork(Fork {
                    functional_event: "fe".into(),
                    paths: vec![
                        Path {
                            state: "success".into(),
                            branch: sequence_branch(vec![collect_event(1)], "S1"),
                        },
                        Path {
                            state: "failure".into(),
                            branch: sequence_branch(vec![collect_event(2)], "S2"),
                        },
                    ],
                }),
            },
        });

        let flattened = flatten(&model, "init").unwrap();
        assert_eq!(flattened.len(), 2);
        assert_eq!(flattened[0].sequence, "S1");
        assert_eq!(flattened[1].sequence, "S2");
        assert_eq!(flattened[0].formula.as_ref().unwrap().event_args, vec![1]);
        assert!(flattened[0].expression.is_none());
    }

    #[test]
    fn test_multiple_paths_fold_into_or_of_ands() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: Branch {
                instructions: Vec::new(),
                target: Target::Fork(Fork {
                    functional_event: "fe".into(),
                    paths: vec![
                        Path {
                            state: "one".into(),
                            branch: sequence_branch(
                                vec![collect_event(1), collect_event(2)],
                                "S1",
                            ),
                        },
                        Path {
                            state: "two".into(),
                            branch: sequence_branch(vec![collect_event(2)], "S1"),
                        },
                    ],
                }),
            },
        });

        let flattened = flatten(&model, "init").unwrap();
        assert_eq!(flattened.len(), 1);
        let formula = flattened[0].formula.as_ref().unwrap();
        // Two paths: OR over (AND of two formulas, single formula).
        assert_eq!(formula.kind, GateKind::Or);
        assert_eq!(formula.formula_args.len(), 2);
        assert_eq!(formula.formula_args[0].kind, GateKind::And);
        assert_eq!(formula.formula_args[0].formula_args.len(), 2);
        assert_eq!(formula.formula_args[1].event_args, vec![2]);
    }

    #[test]
    fn test_link_suppresses_sequence_and_continues_in_target_tree() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: sequence_branch(
                vec![Instruction::Link {
                    event_tree: "other".into(),
                }],
                "S1",
            ),
        });
        model.event_trees.push(EventTree {
            id: "other".into(),
            initial_state: sequence_branch(vec![collect_event(2)], "S2"),
        });

        let flattened = flatten(&model, "init").unwrap();
        assert_eq!(flattened.len(), 1);
        assert_eq!(flattened[0].sequence, "S2");
    }

    #[test]
    fn test_link_cycle_is_rejected() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: sequence_branch(
                vec![Instruction::Link {
                    event_tree: "et".into(),
                }],
                "S1",
            ),
        });
        assert!(matches!(
            flatten(&model, "init"),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn test_expression_paths_fold_into_add_of_muls() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: Branch {
                instructions: Vec::new(),
                target: Target::Fork(Fork {
                    functional_event: "fe".into(),
                    paths: vec![
                        Path {
                            state: "one".into(),
                            branch: sequence_branch(
                                vec![
                                    Instruction::CollectExpression(Expression::Constant(0.1)),
                                    Instruction::CollectExpression(Expression::Constant(0.2)),
                                ],
                                "S1",
                            ),
                        },
                        Path {
                            state: "two".into(),
                            branch: sequence_branch(
                                vec![Instruction::CollectExpression(Expression::Constant(
                                    0.7,
                                ))],
                                "S1",
                            ),
                        },
                    ],
                }),
            },
        });

        let flattened = flatten(&model, "init").unwrap();
        assert_eq!(flattened.len(), 1);
        assert!(flattened[0].formula.is_none());
        assert_eq!(
            flattened[0].expression,
            Some(Expression::Add(vec![
                Expression::Mul(vec![
                    Expression::Constant(0.1),
                    Expression::Constant(0.2),
                ]),
                Expression::Constant(0.7),
            ]))
        );
    }

    #[test]
    fn test_mixed_formula_and_expression_sequence_is_rejected() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: sequence_branch(
                vec![
                    collect_event(1),
                    Instruction::CollectExpression(Expression::Constant(0.5)),
                ],
                "S1",
            ),
        });
        assert!(matches!(
            flatten(&model, "init"),
            Err(Error::InvalidModel(_))
        ));
    }

    #[test]
    fn test_house_overrides_stay_per_path() {
        let mut model = base_model();
        model.event_trees.push(EventTree {
            id: "et".into(),
            initial_state: Branch {
                instructions: vec![Instruction::SetHouseEvent {
                    id: "h".into(),
                    state: false,
                }],
                target: Target::Fork(Fork {
                    functional_event: "fe".into(),
                    paths: vec![
                        Path {
                            state: "override".into(),
                            branch: sequence_branch(
                                vec![
                                    Instruction::SetHouseEvent {
                                        id: "h".into(),
                                        state: true,
                                    },
                                    collect_event(1),
                                ],
                                "S1",
                            ),
                        },
                        Path {
                            state: "default".into(),
                            branch: sequence_branch(vec![collect_event(2)], "S2"),
                        },
                    ],
                }),
            },
        });

        let flattened = flatten(&model, "init").unwrap();
        // The override in the first arm wins over the branch-level write;
        // the sibling arm keeps the branch-level value.
        assert_eq!(flattened[0].house_overrides, vec![(3, true)]);
        assert_eq!(flattened[1].house_overrides, vec![(3, false)]);
    }
}
