//! Traits for operations that iterate leading sequence arguments.
//!
//! - Zip: a run of sequence slots iterated in parallel, sharing one index,
//!   with an optional run of plain slots before them and after the nested
//!   run. `ForEach(a: xs, b: ys, a + b)` is the canonical user.
//! - Join: exactly two sequences iterated independently (one index each);
//!   every nested slot declares which of the two items it may see.

use std::ops::Range;

use super::layout::IndexDecl;
use super::{ArgShape, ArgTraits};
use crate::oper::OperId;
use crate::scope::ScopeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipShape {
    /// Plain slots before the first sequence.
    pub leading: usize,
    /// Sequence slots, each introducing a `SeqItem` scope.
    pub seqs: usize,
    /// Slots nested under every sequence scope. Remaining slots are plain.
    pub nested: usize,
    /// Whether the sequence scopes carry a (shared) index scope.
    pub indexed: bool,
    pub eager: bool,
}

impl ZipShape {
    pub(crate) fn seq_range(&self) -> Range<usize> {
        self.leading..self.leading + self.seqs
    }

    pub(crate) fn nested_range(&self) -> Range<usize> {
        let start = self.leading + self.seqs;
        start..start + self.nested
    }

    pub(crate) fn scope_kind(&self, slot: usize) -> ScopeKind {
        if self.seq_range().contains(&slot) {
            ScopeKind::SeqItem
        } else {
            ScopeKind::None
        }
    }

    pub(crate) fn is_nested(&self, slot: usize) -> bool {
        self.nested_range().contains(&slot)
    }

    pub(crate) fn index_decl(&self, slot: usize) -> IndexDecl {
        if self.indexed && self.seq_range().contains(&slot) {
            IndexDecl::Shared
        } else {
            IndexDecl::None
        }
    }
}

/// Which join item a nested slot may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinVis {
    Left,
    Right,
    Both,
}

impl JoinVis {
    fn sees_left(self) -> bool {
        matches!(self, JoinVis::Left | JoinVis::Both)
    }

    fn sees_right(self) -> bool {
        matches!(self, JoinVis::Right | JoinVis::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinShape {
    /// Visibility per nested slot; nested slots start at slot 2.
    pub visibility: Vec<JoinVis>,
    pub indexed: bool,
    pub eager: bool,
}

impl JoinShape {
    pub(crate) fn scope_kind(&self, slot: usize) -> ScopeKind {
        if slot < 2 {
            ScopeKind::SeqItem
        } else {
            ScopeKind::None
        }
    }

    pub(crate) fn is_nested(&self, slot: usize) -> bool {
        slot >= 2 && slot - 2 < self.visibility.len()
    }

    pub(crate) fn sees_scope(&self, slot: usize, up_count: usize) -> bool {
        let Some(vis) = slot.checked_sub(2).and_then(|i| self.visibility.get(i)) else {
            return false;
        };
        // The right sequence was pushed last, so it is the innermost scope.
        match up_count {
            0 => vis.sees_right(),
            1 => vis.sees_left(),
            _ => false,
        }
    }

    pub(crate) fn index_decl(&self, slot: usize) -> IndexDecl {
        if self.indexed && slot < 2 {
            IndexDecl::Own
        } else {
            IndexDecl::None
        }
    }
}

impl ArgTraits {
    pub fn zip(oper: OperId, slot_count: usize, zip: ZipShape) -> Self {
        assert!(zip.seqs >= 1, "zip traits need at least one sequence slot");
        assert!(zip.nested >= 1, "zip traits need at least one nested slot");
        assert!(
            zip.leading + zip.seqs + zip.nested <= slot_count,
            "zip layout exceeds {slot_count} slots"
        );
        Self::finish(oper, slot_count, ArgShape::Zip(zip))
    }

    /// Leading sequence slots followed only by nested slots.
    pub fn seq(oper: OperId, slot_count: usize, seqs: usize, indexed: bool, eager: bool) -> Self {
        assert!(seqs < slot_count, "seq traits need a nested slot");
        Self::zip(
            oper,
            slot_count,
            ZipShape {
                leading: 0,
                seqs,
                nested: slot_count - seqs,
                indexed,
                eager,
            },
        )
    }

    pub fn join(
        oper: OperId,
        slot_count: usize,
        visibility: Vec<JoinVis>,
        indexed: bool,
        eager: bool,
    ) -> Self {
        assert!(!visibility.is_empty(), "join traits need a nested slot");
        assert!(
            2 + visibility.len() <= slot_count,
            "join layout exceeds {slot_count} slots"
        );
        Self::finish(
            oper,
            slot_count,
            ArgShape::Join(JoinShape {
                visibility,
                indexed,
                eager,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeIndex;

    #[test]
    fn zip_layout() {
        // F(plain, xs, ys, body1, body2, plain)
        let t = ArgTraits::zip(
            OperId::fresh(),
            6,
            ZipShape {
                leading: 1,
                seqs: 2,
                nested: 2,
                indexed: true,
                eager: false,
            },
        );
        assert_eq!(t.scope_count(), 2);
        assert_eq!(t.nested_count(), 2);
        assert!(!t.is_scope(0));
        assert_eq!(t.scope_kind(1), ScopeKind::SeqItem);
        assert!(t.is_nested(3) && t.is_nested(4));
        assert!(!t.is_nested(5));
        assert!(!t.is_nested_tail(3));
        assert!(t.is_nested_tail(4));
        assert_eq!(t.scopes_pushed(3), 2);
        assert!(t.is_scope_active(4, 1));
        assert!(!t.is_scope_active(4, 2));
        assert_eq!(t.scope_slot(3, 0), Some(2));
        assert_eq!(t.scope_slot(3, 1), Some(1));

        // Parallel iteration shares one index.
        assert_eq!(t.scope_index(1), Some(ScopeIndex { iidx: 0, first: true }));
        assert_eq!(t.scope_index(2), Some(ScopeIndex { iidx: 0, first: false }));
        assert_eq!(t.scope_index(0), None);

        assert!(!t.is_eager_seq(1));
        assert!(t.is_eager_seq(0));
        assert!(t.is_repeated(3));
        assert!(!t.is_repeated(5));
        assert!(t.supports_name(1));
        assert!(!t.supports_name(3));
    }

    #[test]
    fn seq_is_zip_without_plain_slots() {
        let id = OperId::fresh();
        let t = ArgTraits::seq(id, 2, 1, false, true);
        assert!(t.is_scope(0));
        assert!(t.is_nested(1));
        assert!(t.is_nested_tail(1));
        assert_eq!(t.scope_index(0), None);
        assert!(t.are_equivalent(&ArgTraits::zip(
            id,
            2,
            ZipShape {
                leading: 0,
                seqs: 1,
                nested: 1,
                indexed: false,
                eager: true,
            }
        )));
    }

    #[test]
    fn join_visibility() {
        // Join(left, right, key_left, key_right, select, extra)
        let t = ArgTraits::join(
            OperId::fresh(),
            6,
            vec![JoinVis::Left, JoinVis::Right, JoinVis::Both],
            true,
            true,
        );
        assert_eq!(t.scope_count(), 2);
        assert!(t.is_scope_active(2, 1));
        assert!(!t.is_scope_active(2, 0));
        assert!(t.is_scope_active(3, 0));
        assert!(!t.is_scope_active(3, 1));
        assert!(t.is_scope_active(4, 0) && t.is_scope_active(4, 1));
        assert!(t.is_nested_tail(4));
        assert!(!t.is_nested(5));

        // Nested iteration: one index per sequence.
        assert_eq!(t.scope_index(0), Some(ScopeIndex { iidx: 0, first: true }));
        assert_eq!(t.scope_index(1), Some(ScopeIndex { iidx: 1, first: true }));

        // The left-only slot still repeats: its innermost visible loop is one level out.
        assert_eq!(t.innermost_loop_scope(2), Some(1));
        assert_eq!(t.innermost_loop_scope(3), Some(0));
    }
}
