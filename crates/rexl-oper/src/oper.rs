//! The contract every operation implements.
//!
//! Binding a call runs four phases in order:
//!
//! 1. [`RexlOper::arg_traits`] describes the call shape from arity, names
//!    and directives alone.
//! 2. [`RexlOper::specialize_types`] sees the bound arguments and fixes the
//!    result type and the type each argument converts to. It may instead ask
//!    the binder to retry with different traits.
//! 3. [`RexlOper::certify`] re-validates the finished call node.
//! 4. [`RexlOper::reduce`] rewrites a certified call into simpler calls.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rexl_diag::DiagnosticSink;
use rexl_types::{DName, DType};

use crate::arg_traits::ArgTraits;
use crate::bound::{BoundNode, CallNode};
use crate::directive::Directive;
use crate::invocation::InvocationInfo;
use crate::reduce::Reducer;
use crate::slot_set::SlotSet;

static NEXT_OPER_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of an operation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperId(pub u32);

impl OperId {
    pub fn fresh() -> Self {
        Self(NEXT_OPER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Outcome of type specialization.
#[derive(Debug, Clone)]
pub struct Specialization {
    pub result: DType,
    /// Type each argument converts to, one per slot.
    pub args: Vec<DType>,
    /// Use superset (`true`) or subset (`false`) record acceptance when
    /// converting arguments.
    pub union: bool,
    /// Retry binding with these traits instead.
    pub traits_change: Option<Arc<ArgTraits>>,
}

impl Specialization {
    /// Accept the arguments as bound.
    pub fn as_bound(info: &InvocationInfo<'_>, result: DType) -> Self {
        Self {
            result,
            args: info.arg_types().cloned().collect(),
            union: true,
            traits_change: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Certification {
    pub ok: bool,
    /// Valid as a code generation target without further reduction.
    pub full: bool,
}

impl Certification {
    pub const FULL: Self = Self {
        ok: true,
        full: true,
    };
    pub const PARTIAL: Self = Self {
        ok: true,
        full: false,
    };
    pub const FAILED: Self = Self {
        ok: false,
        full: false,
    };
}

/// Slots whose `With`/`Guard` wrapper may be hoisted above the call:
/// `F(.., With(w: e, v), ..)` becomes `With(w: e, F(.., v, ..))`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullWithFlags {
    pub with: SlotSet,
    pub guard: SlotSet,
}

pub trait RexlOper: Send + Sync + fmt::Debug {
    fn id(&self) -> OperId;

    fn name(&self) -> &DName;

    /// Procedures have side effects; their calls are never short-circuited.
    fn is_proc(&self) -> bool {
        false
    }

    fn arity_min(&self) -> usize;

    fn arity_max(&self) -> usize;

    fn arg_traits(
        &self,
        arity: usize,
        names: &[Option<DName>],
        implicit_names: &SlotSet,
        dirs: &[Directive],
    ) -> Arc<ArgTraits>;

    fn specialize_types(
        &self,
        info: &InvocationInfo<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Specialization;

    /// Whether `dir` is legal on `slot` for this call shape.
    fn supports_directive(&self, _traits: &ArgTraits, _slot: usize, dir: Directive) -> bool {
        dir.is_none()
    }

    /// Upper bound on `traits_change` requests for one call.
    fn max_rebinds(&self) -> usize {
        0
    }

    /// Whether `call.traits` is a shape this operation could have produced
    /// for the call. The default re-derives the traits and compares.
    fn accepts_traits(&self, call: &CallNode) -> bool {
        let derived = self.arg_traits(
            call.arity(),
            &call.names,
            &call.implicit_names,
            &call.dirs,
        );
        derived.are_equivalent(&call.traits)
    }

    /// Standard structural checks followed by [`RexlOper::certify_core`].
    fn certify(&self, call: &CallNode) -> Certification {
        if call.oper.id() != self.id() || !certify_standard(call) || !self.accepts_traits(call) {
            return Certification::FAILED;
        }
        self.certify_core(call)
    }

    /// Operation-specific certification.
    fn certify_core(&self, _call: &CallNode) -> Certification {
        Certification::FULL
    }

    /// Rewrite a certified call. `None` leaves it as is.
    fn reduce(&self, _reducer: &mut dyn Reducer, _call: &CallNode) -> Option<BoundNode> {
        None
    }

    fn pull_with_flags(&self, traits: &ArgTraits) -> PullWithFlags {
        default_pull_with_flags(self.is_proc(), traits)
    }
}

/// Hoisting is legal for arguments evaluated unconditionally exactly once:
/// not nested and not repeated. A `Guard` wrapper additionally needs the
/// slot to lift over opt, so the null short-circuit is already implied.
pub fn default_pull_with_flags(is_proc: bool, traits: &ArgTraits) -> PullWithFlags {
    let mut flags = PullWithFlags::default();
    if is_proc {
        return flags;
    }
    for slot in 0..traits.slot_count() {
        if traits.is_nested(slot) || traits.is_repeated(slot) {
            continue;
        }
        flags.with.insert(slot);
        if traits.lifts_over_opt(slot) {
            flags.guard.insert(slot);
        }
    }
    flags
}

/// Arity, scope, name and directive legality of a built call.
pub fn certify_standard(call: &CallNode) -> bool {
    let oper = call.oper.as_ref();
    let traits = call.traits.as_ref();
    let arity = call.arity();

    if arity < oper.arity_min() || arity > oper.arity_max() {
        return false;
    }
    if traits.oper() != oper.id()
        || traits.slot_count() != arity
        || call.names.len() != arity
        || call.dirs.len() != arity
        || !call.implicit_names.is_below(arity)
    {
        return false;
    }

    let scope_slots: Vec<usize> = traits.scope_slots().collect();
    if scope_slots.len() != call.scopes.len() {
        return false;
    }
    for (&slot, scope) in scope_slots.iter().zip(&call.scopes) {
        if scope.kind != traits.scope_kind(slot)
            || scope.index.is_some() != traits.scope_index(slot).is_some()
        {
            return false;
        }
    }

    (0..arity).all(|slot| {
        let named = call.names[slot].is_some();
        let implicit = call.implicit_names.contains(slot);
        (!named || traits.supports_name(slot))
            && (!implicit || (named && traits.supports_implicit_name(slot)))
            && (named || !traits.requires_name(slot))
            && oper.supports_directive(traits, slot, call.dirs[slot])
    })
}
