use indexmap::IndexSet;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::ops::Neg;

/// Signed reference to a node in an [IndexedGraph](super::IndexedGraph).
///
/// The magnitude is the node index; the sign encodes polarity. `+i` refers
/// to node `i`, `-i` to its complement. Zero is not a valid reference.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub struct SignedIndex {
    idx: i32,
}

/// Returns a new SignedIndex from a provided i32.
macro_rules! si {
    ( $x:expr ) => {{
        SignedIndex::new($x)
    }};
}

impl SignedIndex {
    /// Returns a new SignedIndex from a provided i32.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is zero.
    pub const fn new(idx: i32) -> SignedIndex {
        assert!(idx != 0, "node references must be non-zero");
        SignedIndex { idx }
    }

    /// Returns the positive index of the referenced node.
    #[inline(always)]
    pub fn index(self) -> i32 {
        self.idx.abs()
    }

    /// Returns the raw signed value.
    #[inline(always)]
    pub fn signed(self) -> i32 {
        self.idx
    }

    /// Returns true if this reference points at the complement of the node.
    #[inline(always)]
    pub fn is_complement(self) -> bool {
        self.idx < 0
    }

    /// Composes this reference with an outer sign.
    ///
    /// A complemented outer edge flips the polarity of the inner reference.
    pub fn in_sign_of(self, outer: SignedIndex) -> SignedIndex {
        if outer.is_complement() {
            -self
        } else {
            self
        }
    }
}

impl Neg for SignedIndex {
    type Output = SignedIndex;

    fn neg(self) -> SignedIndex {
        SignedIndex { idx: -self.idx }
    }
}

impl Display for SignedIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.idx)
    }
}

/// Enum representing the different kinds of gates in an indexed graph.
///
/// Normalization reduces the set to `{Or, And, Null}`; simplification then
/// leaves only `{Or, And}`, with `Null` present transiently.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GateKind {
    Or,
    And,
    /// K-of-N combination gate; holds the vote number.
    AtLeast(usize),
    Xor,
    Nor,
    Nand,
    Not,
    /// Transparent single-argument pass-through.
    Null,
}
use GateKind::*;

impl GateKind {
    /// Returns the positive kind a complemented-form gate rewrites to,
    /// or None if the kind is already positive.
    ///
    /// NOR and NAND drop their outer negation into the parent edge and
    /// become OR and AND; NOT becomes a transparent NULL the same way.
    pub fn positive_form(self) -> Option<GateKind> {
        match self {
            Nor => Some(Or),
            Nand => Some(And),
            Not => Some(Null),
            _ => None,
        }
    }

    /// Returns the De Morgan dual used when a complement is pushed through.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not one of the normalized kinds `{Or, And, Null}`.
    pub fn dual(self) -> GateKind {
        match self {
            Or => And,
            And => Or,
            Null => Null,
            AtLeast(_) | Xor | Nor | Nand | Not => {
                unreachable!("complements propagate only through normalized gates")
            }
        }
    }

    /// Returns true if `self` is one of the two final kinds `{Or, And}`.
    pub fn is_simple(self) -> bool {
        matches!(self, Or | And)
    }
}

impl Display for GateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Or => write!(f, "OR"),
            And => write!(f, "AND"),
            AtLeast(k) => write!(f, "ATLEAST({})", k),
            Xor => write!(f, "XOR"),
            Nor => write!(f, "NOR"),
            Nand => write!(f, "NAND"),
            Not => write!(f, "NOT"),
            Null => write!(f, "NULL"),
        }
    }
}

/// Constant state a gate can collapse into during preprocessing.
///
/// Distinct from [GateKind::Null]: the state marks a gate whose value is
/// known, while the NULL kind marks a transparent single-argument gate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateState {
    Normal,
    /// Constant false.
    Null,
    /// Constant true.
    Unity,
}

impl GateState {
    /// Returns the constant truth value of the state, if any.
    pub fn constant_value(self) -> Option<bool> {
        match self {
            GateState::Normal => None,
            GateState::Null => Some(false),
            GateState::Unity => Some(true),
        }
    }
}

/// Euler-tour visit times assigned by module detection.
///
/// `enter` and `exit` bracket the single DFS descent into the node;
/// `last` additionally tracks re-visits through other parents.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct VisitTimes {
    pub enter: i32,
    pub exit: i32,
    pub last: i32,
}

impl VisitTimes {
    pub fn entered(&self) -> bool {
        self.enter != 0
    }
}

/// A gate node with signed argument sets and parent back-references.
///
/// Arguments are split into leaf references (`events`), gate references
/// (`gates`) and, after module detection, module references (`modules`).
/// All three iterate ascending by signed index. Parents are kept as a
/// lookup-by-index set, never ownership, so sharing cannot form ownership
/// cycles.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexedGate {
    pub kind: GateKind,
    pub state: GateState,
    pub events: BTreeSet<SignedIndex>,
    pub gates: BTreeSet<SignedIndex>,
    pub modules: BTreeSet<SignedIndex>,
    pub parents: IndexSet<i32>,
    pub module: bool,
    pub visit: VisitTimes,
}

impl IndexedGate {
    pub fn new(kind: GateKind) -> IndexedGate {
        IndexedGate {
            kind,
            state: GateState::Normal,
            events: BTreeSet::new(),
            gates: BTreeSet::new(),
            modules: BTreeSet::new(),
            parents: IndexSet::new(),
            module: false,
            visit: VisitTimes::default(),
        }
    }

    /// Returns the total number of arguments across all three sets.
    pub fn arg_count(&self) -> usize {
        self.events.len() + self.gates.len() + self.modules.len()
    }

    /// Returns the only argument of the gate, if there is exactly one.
    pub fn single_arg(&self) -> Option<SignedIndex> {
        if self.arg_count() != 1 {
            return None;
        }
        self.args().next()
    }

    /// Iterates over every argument: events, then modules, then gates,
    /// each ascending by signed index.
    pub fn args(&self) -> impl Iterator<Item = SignedIndex> + '_ {
        self.events
            .iter()
            .chain(self.modules.iter())
            .chain(self.gates.iter())
            .copied()
    }

    /// Collapses the gate into a constant if any argument set contains a
    /// reference together with its complement: null for AND, unity for OR.
    pub fn absorb_complement_pairs(&mut self) {
        if self.state != GateState::Normal || !self.kind.is_simple() {
            return;
        }
        let collision = has_complement_pair(&self.events)
            || has_complement_pair(&self.gates)
            || has_complement_pair(&self.modules);
        if collision {
            self.state = match self.kind {
                And => GateState::Null,
                Or => GateState::Unity,
                _ => unreachable!(),
            };
        }
    }
}

fn has_complement_pair(set: &BTreeSet<SignedIndex>) -> bool {
    set.iter().any(|arg| arg.is_complement() && set.contains(&-*arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_index_polarity() {
        let a = si!(3);
        assert_eq!(a.index(), 3);
        assert!(!a.is_complement());
        assert_eq!((-a).signed(), -3);
        assert!((-a).is_complement());
        assert_eq!((-a).index(), 3);
    }

    #[test]
    fn test_sign_composition() {
        let inner = si!(-2);
        assert_eq!(inner.in_sign_of(si!(5)), si!(-2));
        assert_eq!(inner.in_sign_of(si!(-5)), si!(2));
    }

    #[test]
    fn test_ordering_is_by_signed_value() {
        let mut set = BTreeSet::new();
        set.insert(si!(4));
        set.insert(si!(-7));
        set.insert(si!(1));
        let order: Vec<i32> = set.iter().map(|s| s.signed()).collect();
        assert_eq!(order, vec![-7, 1, 4]);
    }

    #[test]
    fn test_complement_pair_collapses_gate() {
        let mut and = IndexedGate::new(GateKind::And);
        and.events.insert(si!(1));
        and.events.insert(si!(-1));
        and.absorb_complement_pairs();
        assert_eq!(and.state, GateState::Null);

        let mut or = IndexedGate::new(GateKind::Or);
        or.events.insert(si!(2));
        or.events.insert(si!(-2));
        or.absorb_complement_pairs();
        assert_eq!(or.state, GateState::Unity);
    }
}
