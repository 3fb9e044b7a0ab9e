//! Fully parametric traits driven by caller-supplied masks.
//!
//! `General` can express any layout the other variants can, plus
//! per-slot scope visibility exceptions: by default a nested slot sees every
//! scope pushed before it, and `scope_inactive` blinds it to specific ones.
//! Bit `(slot - 1) * scope_count + up_count` of `scope_inactive` hides the
//! scope `up_count` levels out from `slot`.
//!
//! Construction validates every structural invariant up front and rejects
//! inconsistent masks with a [`TraitsError`].

use super::layout::{IndexDecl, Layout};
use super::{ArgShape, ArgTraits, LiftMasks, NameMasks};
use crate::oper::OperId;
use crate::scope::ScopeKind;
use crate::slot_set::SlotSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneralShape {
    pub scope: SlotSet,
    /// Kind of each scope slot, in slot order.
    pub kinds: Vec<ScopeKind>,
    pub nested: SlotSet,
    pub scope_inactive: SlotSet,
    pub names: NameMasks,
    pub lift: LiftMasks,
    /// Scope slots carrying an index scope.
    pub indexed: SlotSet,
    /// Indexed slots share one index rather than getting one each.
    pub shared_index: bool,
    /// Sequence slots known not to be fully consumed.
    pub lazy: SlotSet,
}

impl GeneralShape {
    pub(crate) fn scope_kind(&self, slot: usize) -> ScopeKind {
        if !self.scope.contains(slot) {
            return ScopeKind::None;
        }
        let ordinal = self.scope.iter().take_while(|&s| s < slot).count();
        self.kinds.get(ordinal).copied().unwrap_or(ScopeKind::None)
    }

    pub(crate) fn sees_scope(&self, slot: usize, up_count: usize, scope_count: usize) -> bool {
        match slot.checked_sub(1) {
            Some(prev) => !self
                .scope_inactive
                .contains(prev * scope_count + up_count),
            None => false,
        }
    }

    pub(crate) fn index_decl(&self, slot: usize) -> IndexDecl {
        match (self.indexed.contains(slot), self.shared_index) {
            (false, _) => IndexDecl::None,
            (true, true) => IndexDecl::Shared,
            (true, false) => IndexDecl::Own,
        }
    }
}

/// Rejected parameter combination for general traits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraitsError {
    #[error("{kinds} scope kinds given for {scopes} scope slots")]
    KindCount { kinds: usize, scopes: usize },
    #[error("scope slot {slot} has kind None")]
    NoneKind { slot: usize },
    #[error("{mask} mask names slot {slot}, beyond {slot_count} slots")]
    MaskOutOfRange {
        mask: &'static str,
        slot: usize,
        slot_count: usize,
    },
    #[error("nested slot {slot} has no pushed scope")]
    NestedWithoutScope { slot: usize },
    #[error("nested slot {slot} sees none of its pushed scopes")]
    NestedBlind { slot: usize },
    #[error("inactive-scope bit {bit} does not address a pushed scope of a nested slot")]
    InactiveOutOfRange { bit: usize },
    #[error("scope slot {slot} is also a nested tail")]
    ScopeAtNestedTail { slot: usize },
    #[error("{mask} name mask is not a subset of the name mask")]
    NameMaskNotSubset { mask: &'static str },
    #[error("slot {slot} is indexed but is not an indexable scope")]
    IndexOnNonIndexable { slot: usize },
    #[error("guard scope slot {slot} also lifts over opt")]
    GuardLiftsOpt { slot: usize },
    #[error("item scope slot {slot} lifts over its own container kind")]
    ItemLiftsContainer { slot: usize },
}

impl ArgTraits {
    /// General traits from explicit masks, validated.
    pub fn general(
        oper: OperId,
        slot_count: usize,
        shape: GeneralShape,
    ) -> Result<Self, TraitsError> {
        validate_masks(&shape, slot_count)?;
        let wrapped = ArgShape::General(shape);
        let layout = Layout::compute(&wrapped, slot_count);
        let ArgShape::General(shape) = &wrapped else {
            unreachable!("shape was wrapped as General above");
        };
        validate_layout(shape, slot_count, &layout)?;
        Ok(Self::finish(oper, slot_count, wrapped))
    }
}

fn validate_masks(shape: &GeneralShape, slot_count: usize) -> Result<(), TraitsError> {
    let scopes = shape.scope.count();
    if shape.kinds.len() != scopes {
        return Err(TraitsError::KindCount {
            kinds: shape.kinds.len(),
            scopes,
        });
    }
    if let Some((slot, _)) = shape
        .scope
        .iter()
        .zip(&shape.kinds)
        .find(|(_, kind)| **kind == ScopeKind::None)
    {
        return Err(TraitsError::NoneKind { slot });
    }

    let masks: [(&'static str, &SlotSet); 10] = [
        ("scope", &shape.scope),
        ("nested", &shape.nested),
        ("name", &shape.names.name),
        ("explicit", &shape.names.explicit),
        ("required", &shape.names.required),
        ("lift_seq", &shape.lift.seq),
        ("lift_ten", &shape.lift.ten),
        ("lift_opt", &shape.lift.opt),
        ("indexed", &shape.indexed),
        ("lazy", &shape.lazy),
    ];
    for (mask, set) in masks {
        if let Some(slot) = set.max_slot().filter(|&max| max >= slot_count) {
            return Err(TraitsError::MaskOutOfRange {
                mask,
                slot,
                slot_count,
            });
        }
    }

    if !shape.names.explicit.is_subset(&shape.names.name) {
        return Err(TraitsError::NameMaskNotSubset { mask: "explicit" });
    }
    if !shape.names.required.is_subset(&shape.names.name) {
        return Err(TraitsError::NameMaskNotSubset { mask: "required" });
    }

    for slot in shape.indexed.iter() {
        if !shape.scope_kind(slot).is_indexable() {
            return Err(TraitsError::IndexOnNonIndexable { slot });
        }
    }

    for slot in shape.scope.iter() {
        let kind = shape.scope_kind(slot);
        if kind == ScopeKind::Guard && shape.lift.opt.contains(slot) {
            return Err(TraitsError::GuardLiftsOpt { slot });
        }
        if (kind == ScopeKind::SeqItem && shape.lift.seq.contains(slot))
            || (kind == ScopeKind::TenItem && shape.lift.ten.contains(slot))
        {
            return Err(TraitsError::ItemLiftsContainer { slot });
        }
    }
    Ok(())
}

fn validate_layout(
    shape: &GeneralShape,
    slot_count: usize,
    layout: &Layout,
) -> Result<(), TraitsError> {
    let scope_count = layout.scope_count;

    for bit in shape.scope_inactive.iter() {
        let addressed = (scope_count > 0)
            .then(|| (bit / scope_count + 1, bit % scope_count))
            .filter(|&(slot, up)| {
                slot < slot_count && shape.nested.contains(slot) && up < layout.pushed[slot]
            });
        if addressed.is_none() {
            return Err(TraitsError::InactiveOutOfRange { bit });
        }
    }

    for slot in shape.nested.iter() {
        let pushed = layout.pushed[slot];
        if pushed == 0 {
            return Err(TraitsError::NestedWithoutScope { slot });
        }
        if !(0..pushed).any(|up| shape.sees_scope(slot, up, scope_count)) {
            return Err(TraitsError::NestedBlind { slot });
        }
        if layout.tails.contains(slot) && shape.scope.contains(slot) {
            return Err(TraitsError::ScopeAtNestedTail { slot });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeIndex;

    fn join_like() -> GeneralShape {
        // Join(left, right, key_left, key_right) built generically: slot 2
        // sees only the left item, slot 3 only the right one.
        GeneralShape {
            scope: SlotSet::range(0, 2),
            kinds: vec![ScopeKind::SeqItem, ScopeKind::SeqItem],
            nested: SlotSet::range(2, 4),
            // slot 2, up 0 (right) and slot 3, up 1 (left) are hidden.
            scope_inactive: [2, 2 * 2 + 1].into_iter().collect(),
            names: NameMasks::all(SlotSet::range(0, 4)),
            indexed: SlotSet::range(0, 2),
            ..GeneralShape::default()
        }
    }

    #[test]
    fn per_slot_visibility() {
        let t = ArgTraits::general(OperId::fresh(), 4, join_like()).expect("valid masks");
        assert!(!t.is_scope_active(2, 0));
        assert!(t.is_scope_active(2, 1));
        assert!(t.is_scope_active(3, 0));
        assert!(!t.is_scope_active(3, 1));
        assert!(t.is_nested_tail(3));
        assert_eq!(t.scope_index(1), Some(ScopeIndex { iidx: 1, first: true }));
        assert_eq!(t.innermost_loop_scope(2), Some(1));
    }

    #[test]
    fn shared_index_is_assigned_once() {
        let shape = GeneralShape {
            shared_index: true,
            ..join_like()
        };
        let t = ArgTraits::general(OperId::fresh(), 4, shape).expect("valid masks");
        assert_eq!(t.scope_index(0), Some(ScopeIndex { iidx: 0, first: true }));
        assert_eq!(t.scope_index(1), Some(ScopeIndex { iidx: 0, first: false }));
    }

    #[test]
    fn rejects_blind_nested_slot() {
        let mut shape = join_like();
        shape.scope_inactive.insert(2 + 1);
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 4, shape).unwrap_err(),
            TraitsError::NestedBlind { slot: 2 }
        );
    }

    #[test]
    fn rejects_nested_without_scope() {
        let shape = GeneralShape {
            nested: SlotSet::single(1),
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 2, shape).unwrap_err(),
            TraitsError::NestedWithoutScope { slot: 1 }
        );
    }

    #[test]
    fn rejects_inactive_bits_for_unpushed_scopes() {
        let shape = GeneralShape {
            scope: SlotSet::single(0),
            kinds: vec![ScopeKind::With],
            nested: SlotSet::single(1),
            // slot 2 is not nested.
            scope_inactive: SlotSet::single(1),
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 3, shape).unwrap_err(),
            TraitsError::InactiveOutOfRange { bit: 1 }
        );
    }

    #[test]
    fn rejects_kind_and_lift_conflicts() {
        let guard = GeneralShape {
            scope: SlotSet::single(0),
            kinds: vec![ScopeKind::Guard],
            nested: SlotSet::single(1),
            lift: LiftMasks {
                opt: SlotSet::single(0),
                ..LiftMasks::none()
            },
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 2, guard).unwrap_err(),
            TraitsError::GuardLiftsOpt { slot: 0 }
        );

        let item = GeneralShape {
            scope: SlotSet::single(0),
            kinds: vec![ScopeKind::SeqItem],
            nested: SlotSet::single(1),
            lift: LiftMasks::seq(SlotSet::single(0)),
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 2, item).unwrap_err(),
            TraitsError::ItemLiftsContainer { slot: 0 }
        );
    }

    #[test]
    fn rejects_mask_shape_errors() {
        let kinds = GeneralShape {
            scope: SlotSet::single(0),
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 2, kinds).unwrap_err(),
            TraitsError::KindCount { kinds: 0, scopes: 1 }
        );

        let range = GeneralShape {
            lazy: SlotSet::single(5),
            ..GeneralShape::default()
        };
        assert!(matches!(
            ArgTraits::general(OperId::fresh(), 2, range),
            Err(TraitsError::MaskOutOfRange { mask: "lazy", slot: 5, .. })
        ));

        let index = GeneralShape {
            scope: SlotSet::single(0),
            kinds: vec![ScopeKind::With],
            nested: SlotSet::single(1),
            indexed: SlotSet::single(0),
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 2, index).unwrap_err(),
            TraitsError::IndexOnNonIndexable { slot: 0 }
        );

        let tail = GeneralShape {
            scope: SlotSet::range(0, 2),
            kinds: vec![ScopeKind::With, ScopeKind::With],
            nested: SlotSet::single(1),
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 3, tail).unwrap_err(),
            TraitsError::ScopeAtNestedTail { slot: 1 }
        );
    }

    #[test]
    fn names_must_be_consistent() {
        let shape = GeneralShape {
            names: NameMasks {
                name: SlotSet::single(0),
                required: SlotSet::single(1),
                ..NameMasks::none()
            },
            ..GeneralShape::default()
        };
        assert_eq!(
            ArgTraits::general(OperId::fresh(), 2, shape).unwrap_err(),
            TraitsError::NameMaskNotSubset { mask: "required" }
        );
    }
}
