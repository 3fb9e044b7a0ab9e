//! Per-slot facts derived from a shape by a single left-to-right scan.
//!
//! The binder pushes a scope after binding its scope slot and pops every
//! pushed scope after binding a nested tail. Replaying that protocol once at
//! construction gives each nested slot its visible scope stack, its index
//! scope assignment and its innermost loop scope.

use super::ArgShape;
use crate::scope::{ScopeIndex, ScopeKind};
use crate::slot_set::SlotSet;

/// How a shape wants index scopes assigned to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexDecl {
    None,
    /// Share one index with every other `Shared` slot (parallel iteration).
    Shared,
    /// A fresh index for this slot (nested iteration).
    Own,
}

#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub scope_count: usize,
    pub nested_count: usize,
    /// Scopes pushed when each slot is bound; zero for non-nested slots.
    pub pushed: Vec<usize>,
    /// For nested slots, the scope slots pushed, innermost first.
    pub stacks: Vec<Vec<usize>>,
    pub tails: SlotSet,
    pub index: Vec<Option<ScopeIndex>>,
    /// `up_count` of the innermost active loop scope per slot.
    pub innermost_loop: Vec<Option<usize>>,
}

impl Layout {
    pub fn compute(shape: &ArgShape, slot_count: usize) -> Self {
        let scope_count = (0..slot_count)
            .filter(|&slot| shape.scope_kind(slot) != ScopeKind::None)
            .count();

        let mut layout = Layout {
            scope_count,
            nested_count: 0,
            pushed: vec![0; slot_count],
            stacks: vec![Vec::new(); slot_count],
            tails: SlotSet::new(),
            index: vec![None; slot_count],
            innermost_loop: vec![None; slot_count],
        };

        let mut stack: Vec<usize> = Vec::new();
        let mut next_iidx = 0;
        let mut shared_iidx: Option<usize> = None;

        for slot in 0..slot_count {
            let nested = shape.is_nested(slot);
            if nested {
                layout.nested_count += 1;
                layout.pushed[slot] = stack.len();
                layout.stacks[slot] = stack.iter().rev().copied().collect();
                layout.innermost_loop[slot] = layout.stacks[slot]
                    .iter()
                    .enumerate()
                    .find(|&(up, &scope_slot)| {
                        shape.sees_scope(slot, up, scope_count)
                            && shape.scope_kind(scope_slot).is_loop_scope()
                    })
                    .map(|(up, _)| up);
                if slot + 1 == slot_count || !shape.is_nested(slot + 1) {
                    layout.tails.insert(slot);
                    stack.clear();
                }
            }

            let kind = shape.scope_kind(slot);
            if kind == ScopeKind::None {
                continue;
            }
            stack.push(slot);
            layout.index[slot] = match shape.index_decl(slot) {
                IndexDecl::None => None,
                IndexDecl::Own => {
                    next_iidx += 1;
                    Some(ScopeIndex {
                        iidx: next_iidx - 1,
                        first: true,
                    })
                }
                IndexDecl::Shared => match shared_iidx {
                    Some(iidx) => Some(ScopeIndex { iidx, first: false }),
                    None => {
                        shared_iidx = Some(next_iidx);
                        next_iidx += 1;
                        Some(ScopeIndex {
                            iidx: next_iidx - 1,
                            first: true,
                        })
                    }
                },
            };
        }

        layout
    }
}
