//! Scopes introduced by operation arguments.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use rexl_types::DType;

/// How a scope's value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    None,
    /// The value of its own argument.
    With,
    /// The non-null value of its argument; nested evaluation is skipped on null.
    Guard,
    /// An item of a sequence argument.
    SeqItem,
    /// An item of a tensor argument.
    TenItem,
    /// An iteration counter.
    Iter,
    /// A value of a numeric range.
    Range,
    /// The position of a sequence item.
    SeqIndex,
}

impl ScopeKind {
    /// Whether values of this scope change per repetition of a loop body.
    pub fn is_loop_scope(self) -> bool {
        matches!(
            self,
            ScopeKind::SeqItem
                | ScopeKind::TenItem
                | ScopeKind::SeqIndex
                | ScopeKind::Iter
                | ScopeKind::Range
        )
    }

    /// Whether a scope of this kind may carry an index scope.
    pub fn is_indexable(self) -> bool {
        matches!(self, ScopeKind::SeqItem | ScopeKind::Range)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::None => "none",
            ScopeKind::With => "with",
            ScopeKind::Guard => "guard",
            ScopeKind::SeqItem => "seq_item",
            ScopeKind::TenItem => "ten_item",
            ScopeKind::Iter => "iter",
            ScopeKind::Range => "range",
            ScopeKind::SeqIndex => "seq_index",
        }
    }
}

/// The index scope assigned to an indexable scope slot.
///
/// `iidx` values are assigned while scanning slots left to right; several
/// scope slots share one index when they are iterated in parallel, in which
/// case only the first of them has `first` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeIndex {
    pub iidx: usize,
    pub first: bool,
}

static GLOBAL_SCOPE_ID: AtomicU32 = AtomicU32::new(0);

/// Identity of a bound scope.
///
/// Ids are drawn from one process-wide counter so trees built by different
/// binders or by reduction can be combined without renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn fresh() -> Self {
        Self(GLOBAL_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A scope bound for one scope slot of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgScope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    /// Type of the scope value, not of the argument that produced it.
    pub ty: DType,
    /// Index scope, when the slot carries one.
    pub index: Option<ScopeId>,
}

impl ArgScope {
    pub fn new(kind: ScopeKind, ty: DType) -> Self {
        assert!(kind != ScopeKind::None, "a bound scope needs a kind");
        Self {
            id: ScopeId::fresh(),
            kind,
            ty,
            index: None,
        }
    }

    pub fn with_index(mut self, index: ScopeId) -> Self {
        self.index = Some(index);
        self
    }

    /// Scope value type produced by an argument of type `arg` for `kind`.
    ///
    /// Returns `None` when the argument cannot produce such a scope.
    pub fn value_type(kind: ScopeKind, arg: &DType) -> Option<DType> {
        match kind {
            ScopeKind::None => None,
            ScopeKind::With => Some(arg.clone()),
            ScopeKind::Guard => Some(arg.to_req()),
            ScopeKind::SeqItem => arg.seq_item().cloned(),
            ScopeKind::TenItem => arg.ten_item().cloned(),
            ScopeKind::Iter | ScopeKind::Range | ScopeKind::SeqIndex => Some(DType::I64),
        }
    }
}
