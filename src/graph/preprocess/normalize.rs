use super::super::{GateKind, IndexedGraph, SignedIndex};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Reduces the gate kind set to `{Or, And, Null}`.
///
/// Kind unification first rewrites complemented-form kinds in place: NOR
/// and NAND drop their outer negation into every parent edge and become OR
/// and AND; NOT becomes a transparent NULL the same way; the top gate flips
/// the graph's top sign instead. XOR and ATLEAST gates are then unrolled
/// into fresh OR/AND compositions. Leaf indices never change.
pub(crate) fn normalization_pass(graph: &mut IndexedGraph) -> Result<()> {
    unify_kinds(graph);
    unroll_complex(graph)?;
    debug_assert!(graph.is_acyclic());
    debug_assert!(graph.is_normalized());
    Ok(())
}

/// Rewrites NOR/NAND/NOT into OR/AND/NULL, flipping parent edge signs.
/// Touches each gate at most once, top-down.
fn unify_kinds(graph: &mut IndexedGraph) {
    let mut visited = HashSet::new();
    let mut stack = vec![graph.top_index()];
    while let Some(index) = stack.pop() {
        if !visited.insert(index) {
            continue;
        }
        if let Some(positive) = graph.kind_of(index).positive_form() {
            graph.gate_mut(index).kind = positive;
            flip_in_parents(graph, index);
            // NAND(a, -a) has just become AND(a, -a).
            graph.gate_mut(index).absorb_complement_pairs();
        }
        stack.extend(graph.gate(index).gates.iter().map(|arg| arg.index()));
    }
}

/// Flips the sign of every parent edge referencing `index`. The top gate
/// has no parents; its outer negation toggles the graph's top sign.
fn flip_in_parents(graph: &mut IndexedGraph, index: i32) {
    if index == graph.top_index() {
        graph.toggle_negated_top();
        return;
    }
    let positive = SignedIndex::new(index);
    for parent in graph.parents_of(index) {
        if graph.gate(parent).gates.contains(&positive) {
            graph.replace_arg(parent, positive, -positive);
        } else {
            graph.replace_arg(parent, -positive, positive);
        }
    }
}

type AtLeastMemo = HashMap<(usize, Vec<SignedIndex>), i32>;

/// Unrolls XOR and ATLEAST gates into OR/AND compositions, minting fresh
/// gate indices. Shared ATLEAST subterms are memoised on `(k, rest)`.
fn unroll_complex(graph: &mut IndexedGraph) -> Result<()> {
    let mut memo = AtLeastMemo::new();
    let mut visited = HashSet::new();
    let mut stack = vec![graph.top_index()];
    while let Some(index) = stack.pop() {
        if !visited.insert(index) {
            continue;
        }
        match graph.kind_of(index) {
            GateKind::Xor => unroll_xor(graph, index)?,
            GateKind::AtLeast(k) => unroll_atleast(graph, index, k, &mut memo)?,
            _ => {}
        }
        stack.extend(graph.gate(index).gates.iter().map(|arg| arg.index()));
    }
    Ok(())
}

/// XOR(a, b) becomes OR(AND(a, -b), AND(-a, b)). Higher arity is refused.
fn unroll_xor(graph: &mut IndexedGraph, index: i32) -> Result<()> {
    let args: Vec<SignedIndex> = graph.gate(index).args().collect();
    if args.len() != 2 {
        return Err(Error::UnsupportedFeature(format!(
            "XOR gate with {} distinct arguments (only binary XOR unrolls)",
            args.len()
        )));
    }
    let (a, b) = (args[0], args[1]);
    for &arg in &args {
        graph.remove_arg(index, arg);
    }
    graph.gate_mut(index).kind = GateKind::Or;
    let left = graph.new_gate(GateKind::And);
    graph.add_arg(left, a);
    graph.add_arg(left, -b);
    let right = graph.new_gate(GateKind::And);
    graph.add_arg(right, -a);
    graph.add_arg(right, b);
    graph.add_arg(index, SignedIndex::new(left));
    graph.add_arg(index, SignedIndex::new(right));
    Ok(())
}

/// ATLEAST(k; x, rest...) becomes
/// OR(AND(x, ATLEAST(k-1; rest...)), ATLEAST(k; rest...)).
fn unroll_atleast(
    graph: &mut IndexedGraph,
    index: i32,
    k: usize,
    memo: &mut AtLeastMemo,
) -> Result<()> {
    let args: Vec<SignedIndex> = graph.gate(index).args().collect();
    let n = args.len();
    if k == 0 || k > n {
        return Err(Error::InvalidModel(format!(
            "vote number {} out of range for {} distinct arguments",
            k, n
        )));
    }
    if k == 1 {
        graph.gate_mut(index).kind = GateKind::Or;
        return Ok(());
    }
    if k == n {
        graph.gate_mut(index).kind = GateKind::And;
        return Ok(());
    }
    let first = args[0];
    let rest = args[1..].to_vec();
    for &arg in &args {
        graph.remove_arg(index, arg);
    }
    graph.gate_mut(index).kind = GateKind::Or;
    let with_first = graph.new_gate(GateKind::And);
    graph.add_arg(with_first, first);
    let sub = atleast_gate(graph, k - 1, &rest, memo);
    graph.add_arg(with_first, SignedIndex::new(sub));
    let without_first = atleast_gate(graph, k, &rest, memo);
    graph.add_arg(index, SignedIndex::new(with_first));
    graph.add_arg(index, SignedIndex::new(without_first));
    Ok(())
}

/// Returns a gate computing ATLEAST(k) over `args`, reusing memoised
/// subterms. Callers guarantee `1 <= k <= args.len()`.
fn atleast_gate(
    graph: &mut IndexedGraph,
    k: usize,
    args: &[SignedIndex],
    memo: &mut AtLeastMemo,
) -> i32 {
    let key = (k, args.to_vec());
    if let Some(&existing) = memo.get(&key) {
        return existing;
    }
    let n = args.len();
    let index = if k == 1 {
        let or = graph.new_gate(GateKind::Or);
        for &arg in args {
            graph.add_arg(or, arg);
        }
        or
    } else if k == n {
        let and = graph.new_gate(GateKind::And);
        for &arg in args {
            graph.add_arg(and, arg);
        }
        and
    } else {
        let or = graph.new_gate(GateKind::Or);
        let first = args[0];
        let rest = &args[1..];
        let with_first = graph.new_gate(GateKind::And);
        graph.add_arg(with_first, first);
        let sub = atleast_gate(graph, k - 1, rest, memo);
        graph.add_arg(with_first, SignedIndex::new(sub));
        let without_first = atleast_gate(graph, k, rest, memo);
        graph.add_arg(or, SignedIndex::new(with_first));
        graph.add_arg(or, SignedIndex::new(without_first));
        or
    };
    memo.insert(key, index);
    index
}
