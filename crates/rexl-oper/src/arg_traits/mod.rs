//! Structural description of an operation's argument slots.
//!
//! An [`ArgTraits`] answers, for one call shape of one operation, which slots
//! introduce scopes, which slots are evaluated inside those scopes, which
//! slots may be lifted over sequences/tensors/optionals, and which slots
//! accept names. The binder queries it heavily while binding nested
//! arguments, so every query is O(1): anything that would need a scan is
//! computed once at construction into a [`Layout`].
//!
//! The variant payloads trade generality for compactness. `General` can
//! express every other variant; the rest exist because most operations have
//! a simple shape and equivalence checks on them are cheap.

mod general;
mod layout;
mod seq;
mod with;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use general::{GeneralShape, TraitsError};
pub use seq::{JoinShape, JoinVis, ZipShape};
pub use with::WithShape;

use crate::oper::OperId;
use crate::scope::{ScopeIndex, ScopeKind};
use crate::slot_set::SlotSet;
use layout::{IndexDecl, Layout};

// ---------------------------------------------------------------------------
// Mask bundles
// ---------------------------------------------------------------------------

/// Slots that may be implicitly broadcast over a container kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiftMasks {
    pub seq: SlotSet,
    pub ten: SlotSet,
    pub opt: SlotSet,
}

impl LiftMasks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn seq(seq: SlotSet) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty() && self.ten.is_empty() && self.opt.is_empty()
    }

    fn is_below(&self, limit: usize) -> bool {
        self.seq.is_below(limit) && self.ten.is_below(limit) && self.opt.is_below(limit)
    }
}

/// Which slots accept names.
///
/// `explicit` marks slots whose name must be written out (an implicit name
/// derived from the argument expression is not accepted); `required` marks
/// slots that must be named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMasks {
    pub name: SlotSet,
    pub explicit: SlotSet,
    pub required: SlotSet,
    /// The operation accepts implicit names taken from the last part of a
    /// dotted path (`x.A` names its slot `A`).
    pub dotted: bool,
}

impl NameMasks {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every slot in `name` accepts explicit and implicit names.
    pub fn all(name: SlotSet) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn is_consistent(&self) -> bool {
        self.explicit.is_subset(&self.name) && self.required.is_subset(&self.name)
    }

    fn is_below(&self, limit: usize) -> bool {
        self.name.is_below(limit)
    }
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// The variant payload of an [`ArgTraits`].
///
/// Equality compares exactly the parameters that affect query answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgShape {
    /// No scopes, no names.
    Simple { eager: bool },
    /// No scopes or names; some slots lift.
    Lifting { lift: LiftMasks, eager: bool },
    /// Lifting plus per-slot name acceptance.
    Named {
        lift: LiftMasks,
        names: NameMasks,
        eager: bool,
    },
    Zip(ZipShape),
    Join(JoinShape),
    With(WithShape),
    General(GeneralShape),
}

impl ArgShape {
    fn scope_kind(&self, slot: usize) -> ScopeKind {
        match self {
            ArgShape::Simple { .. } | ArgShape::Lifting { .. } | ArgShape::Named { .. } => {
                ScopeKind::None
            }
            ArgShape::Zip(zip) => zip.scope_kind(slot),
            ArgShape::Join(join) => join.scope_kind(slot),
            ArgShape::With(with) => with.scope_kind(slot),
            ArgShape::General(general) => general.scope_kind(slot),
        }
    }

    fn is_nested(&self, slot: usize) -> bool {
        match self {
            ArgShape::Simple { .. } | ArgShape::Lifting { .. } | ArgShape::Named { .. } => false,
            ArgShape::Zip(zip) => zip.is_nested(slot),
            ArgShape::Join(join) => join.is_nested(slot),
            ArgShape::With(with) => with.is_nested(slot),
            ArgShape::General(general) => general.nested.contains(slot),
        }
    }

    /// Shape-specific visibility of a pushed scope. Only consulted for
    /// `up_count` values below the number of pushed scopes.
    fn sees_scope(&self, slot: usize, up_count: usize, scope_count: usize) -> bool {
        match self {
            ArgShape::Join(join) => join.sees_scope(slot, up_count),
            ArgShape::General(general) => general.sees_scope(slot, up_count, scope_count),
            _ => true,
        }
    }

    fn index_decl(&self, slot: usize) -> IndexDecl {
        match self {
            ArgShape::Zip(zip) => zip.index_decl(slot),
            ArgShape::Join(join) => join.index_decl(slot),
            ArgShape::General(general) => general.index_decl(slot),
            _ => IndexDecl::None,
        }
    }

    fn lifts(&self) -> Option<&LiftMasks> {
        match self {
            ArgShape::Lifting { lift, .. } | ArgShape::Named { lift, .. } => Some(lift),
            ArgShape::General(general) => Some(&general.lift),
            _ => None,
        }
    }

    fn names(&self) -> Option<&NameMasks> {
        match self {
            ArgShape::Named { names, .. } => Some(names),
            ArgShape::General(general) => Some(&general.names),
            _ => None,
        }
    }

    fn is_eager_seq(&self, slot: usize) -> bool {
        match self {
            ArgShape::Simple { eager }
            | ArgShape::Lifting { eager, .. }
            | ArgShape::Named { eager, .. } => *eager,
            ArgShape::Zip(zip) => !zip.seq_range().contains(&slot) || zip.eager,
            ArgShape::Join(join) => slot >= 2 || join.eager,
            ArgShape::With(_) => true,
            ArgShape::General(general) => !general.lazy.contains(slot),
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            ArgShape::Simple { .. } => "simple",
            ArgShape::Lifting { .. } => "lifting",
            ArgShape::Named { .. } => "named",
            ArgShape::Zip(_) => "zip",
            ArgShape::Join(_) => "join",
            ArgShape::With(_) => "with",
            ArgShape::General(_) => "general",
        }
    }
}

// ---------------------------------------------------------------------------
// ArgTraits
// ---------------------------------------------------------------------------

/// Immutable per-call-shape descriptor of an operation's argument slots.
///
/// Created once per distinct shape and shared (`Arc`) across binds.
pub struct ArgTraits {
    oper: OperId,
    slot_count: usize,
    shape: ArgShape,
    owner_key: usize,
    owner: Option<Arc<dyn Any + Send + Sync>>,
    layout: Layout,
}

impl ArgTraits {
    /// No scopes, no names, no lifting.
    pub fn simple(oper: OperId, slot_count: usize, eager: bool) -> Self {
        Self::finish(oper, slot_count, ArgShape::Simple { eager })
    }

    /// Lifting traits. Falls back to [`ArgTraits::simple`] when nothing lifts.
    pub fn lifting(oper: OperId, slot_count: usize, lift: LiftMasks, eager: bool) -> Self {
        assert!(
            lift.is_below(slot_count),
            "lift mask names a slot beyond {slot_count} slots"
        );
        if lift.is_empty() {
            return Self::simple(oper, slot_count, eager);
        }
        Self::finish(oper, slot_count, ArgShape::Lifting { lift, eager })
    }

    /// Named traits. Falls back to [`ArgTraits::lifting`] when no slot accepts a name.
    pub fn named(
        oper: OperId,
        slot_count: usize,
        lift: LiftMasks,
        names: NameMasks,
        eager: bool,
    ) -> Self {
        assert!(
            names.is_consistent(),
            "explicit and required name masks must be subsets of the name mask"
        );
        assert!(
            names.is_below(slot_count) && lift.is_below(slot_count),
            "mask names a slot beyond {slot_count} slots"
        );
        if names.name.is_empty() {
            return Self::lifting(oper, slot_count, lift, eager);
        }
        Self::finish(oper, slot_count, ArgShape::Named { lift, names, eager })
    }

    fn finish(oper: OperId, slot_count: usize, shape: ArgShape) -> Self {
        let layout = Layout::compute(&shape, slot_count);
        let traits = Self {
            oper,
            slot_count,
            shape,
            owner_key: 0,
            owner: None,
            layout,
        };
        if cfg!(debug_assertions)
            && let Err(err) = crate::audit::audit(&traits)
        {
            panic!("inconsistent {} traits: {err}", traits.shape.variant_name());
        }
        traits
    }

    /// Attach operation-private data.
    ///
    /// `key` distinguishes shapes that have identical masks but mean
    /// different things to the owner; it takes part in
    /// [`ArgTraits::are_equivalent`]. The payload does not.
    pub fn with_owner(mut self, key: usize, data: Arc<dyn Any + Send + Sync>) -> Self {
        self.owner_key = key;
        self.owner = Some(data);
        self
    }

    pub fn owner_key(&self) -> usize {
        self.owner_key
    }

    pub fn owner_data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.owner.as_deref().and_then(|data| data.downcast_ref::<T>())
    }

    pub fn oper(&self) -> OperId {
        self.oper
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn shape(&self) -> &ArgShape {
        &self.shape
    }

    pub fn scope_count(&self) -> usize {
        self.layout.scope_count
    }

    pub fn nested_count(&self) -> usize {
        self.layout.nested_count
    }

    fn check(&self, slot: usize) {
        assert!(
            slot < self.slot_count,
            "slot {slot} out of range for {} slots",
            self.slot_count
        );
    }

    // -- Scopes --

    pub fn is_scope(&self, slot: usize) -> bool {
        self.scope_kind(slot) != ScopeKind::None
    }

    pub fn scope_kind(&self, slot: usize) -> ScopeKind {
        self.check(slot);
        self.shape.scope_kind(slot)
    }

    /// Index scope carried by a scope slot, if any.
    pub fn scope_index(&self, slot: usize) -> Option<ScopeIndex> {
        self.check(slot);
        self.layout.index[slot]
    }

    pub fn is_nested(&self, slot: usize) -> bool {
        self.check(slot);
        self.shape.is_nested(slot)
    }

    /// Number of scopes pushed when a nested slot is bound. Zero for
    /// slots that are not nested.
    pub fn scopes_pushed(&self, slot: usize) -> usize {
        self.check(slot);
        self.layout.pushed[slot]
    }

    /// Whether nested `slot` sees the pushed scope `up_count` levels out
    /// (0 is the innermost).
    pub fn is_scope_active(&self, slot: usize, up_count: usize) -> bool {
        self.check(slot);
        up_count < self.layout.pushed[slot]
            && self
                .shape
                .sees_scope(slot, up_count, self.layout.scope_count)
    }

    /// Slot that introduced the scope `up_count` levels out from nested `slot`.
    pub fn scope_slot(&self, slot: usize, up_count: usize) -> Option<usize> {
        self.check(slot);
        self.layout.stacks[slot].get(up_count).copied()
    }

    /// Nested slot after which all pushed scopes are popped.
    pub fn is_nested_tail(&self, slot: usize) -> bool {
        self.check(slot);
        self.layout.tails.contains(slot)
    }

    /// Whether `slot` is evaluated once per repetition of an enclosing loop.
    pub fn is_repeated(&self, slot: usize) -> bool {
        self.innermost_loop_scope(slot).is_some()
    }

    /// `up_count` of the innermost active loop scope seen by `slot`.
    pub fn innermost_loop_scope(&self, slot: usize) -> Option<usize> {
        self.check(slot);
        self.layout.innermost_loop[slot]
    }

    // -- Lifting --

    pub fn lifts_over_seq(&self, slot: usize) -> bool {
        self.check(slot);
        self.shape.lifts().is_some_and(|l| l.seq.contains(slot))
    }

    pub fn lifts_over_ten(&self, slot: usize) -> bool {
        self.check(slot);
        self.shape.lifts().is_some_and(|l| l.ten.contains(slot))
    }

    pub fn lifts_over_opt(&self, slot: usize) -> bool {
        self.check(slot);
        self.shape.lifts().is_some_and(|l| l.opt.contains(slot))
    }

    pub fn lift_masks(&self) -> Option<&LiftMasks> {
        self.shape.lifts()
    }

    // -- Names --

    pub fn supports_name(&self, slot: usize) -> bool {
        self.check(slot);
        match self.shape.names() {
            Some(names) => names.name.contains(slot),
            // Scope slots of the fixed-layout variants accept a scope name.
            None => self.shape.scope_kind(slot) != ScopeKind::None,
        }
    }

    pub fn supports_implicit_name(&self, slot: usize) -> bool {
        self.check(slot);
        match self.shape.names() {
            Some(names) => names.name.contains(slot) && !names.explicit.contains(slot),
            None => self.shape.scope_kind(slot) != ScopeKind::None,
        }
    }

    pub fn requires_name(&self, slot: usize) -> bool {
        self.check(slot);
        self.shape
            .names()
            .is_some_and(|names| names.required.contains(slot))
    }

    /// Whether an implicit name may come from the last part of a dotted path.
    pub fn supports_implicit_dotted_name(&self) -> bool {
        self.shape.names().is_some_and(|names| {
            names.dotted && !names.name.difference(&names.explicit).is_empty()
        })
    }

    // -- Evaluation --

    /// Whether a sequence argument in `slot` must be fully consumed.
    ///
    /// Defaults to eager unless the shape proves otherwise.
    pub fn is_eager_seq(&self, slot: usize) -> bool {
        self.check(slot);
        self.shape.is_eager_seq(slot)
    }

    /// Whether two traits describe the same shape of the same operation.
    pub fn are_equivalent(&self, other: &ArgTraits) -> bool {
        self.oper == other.oper
            && self.slot_count == other.slot_count
            && self.owner_key == other.owner_key
            && self.shape == other.shape
    }

    /// Slots that introduce scopes, in slot order.
    pub fn scope_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.slot_count).filter(|&slot| self.is_scope(slot))
    }
}

impl fmt::Debug for ArgTraits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgTraits")
            .field("oper", &self.oper)
            .field("slot_count", &self.slot_count)
            .field("shape", &self.shape)
            .field("owner_key", &self.owner_key)
            .finish_non_exhaustive()
    }
}
