mod engine;
mod simple_gate;

pub(crate) use engine::{merge_cut_sets, minimize, CutSetEngine, GeneratedCutSets};

use smallvec::SmallVec;

/// Number of event indices kept inline before a cut set spills to the heap.
/// Cut sets are bounded by `limit_order` and usually tiny.
pub const CUT_SET_INLINE_SIZE: usize = 8;

/// One cut set: positive basic-event indices (and, before module
/// substitution, module indices), sorted ascending.
pub type CutSet = SmallVec<[i32; CUT_SET_INLINE_SIZE]>;
