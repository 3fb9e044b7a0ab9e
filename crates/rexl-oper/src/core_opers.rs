//! Built-in scope operations that rewrites target.
//!
//! - `ForEach(x: xs, .., body)` maps `body` over one or more sequences
//!   iterated in parallel, with an index scope per item.
//! - `With(w: e, .., body)` binds values once for use in `body`.
//! - `Guard(g: e, .., body)` binds non-null values and yields null without
//!   evaluating `body` when any of them is null.

use std::sync::{Arc, LazyLock};

use rexl_diag::{Category, Diagnostic, DiagnosticSink};
use rexl_types::{DName, DType};

use crate::arg_traits::ArgTraits;
use crate::directive::Directive;
use crate::invocation::InvocationInfo;
use crate::oper::{OperId, RexlOper, Specialization};
use crate::scope::ScopeKind;
use crate::slot_set::SlotSet;

static FOR_EACH: LazyLock<Arc<dyn RexlOper>> = LazyLock::new(|| Arc::new(ForEachOper::new()));
static WITH: LazyLock<Arc<dyn RexlOper>> =
    LazyLock::new(|| Arc::new(WithOper::new(ScopeKind::With)));
static GUARD: LazyLock<Arc<dyn RexlOper>> =
    LazyLock::new(|| Arc::new(WithOper::new(ScopeKind::Guard)));

pub fn for_each() -> &'static Arc<dyn RexlOper> {
    &FOR_EACH
}

pub fn with() -> &'static Arc<dyn RexlOper> {
    &WITH
}

pub fn guard() -> &'static Arc<dyn RexlOper> {
    &GUARD
}

// ---------------------------------------------------------------------------
// ForEach
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ForEachOper {
    id: OperId,
    name: DName,
}

impl ForEachOper {
    pub fn new() -> Self {
        Self {
            id: OperId::fresh(),
            name: DName::from("ForEach"),
        }
    }
}

impl Default for ForEachOper {
    fn default() -> Self {
        Self::new()
    }
}

impl RexlOper for ForEachOper {
    fn id(&self) -> OperId {
        self.id
    }

    fn name(&self) -> &DName {
        &self.name
    }

    fn arity_min(&self) -> usize {
        2
    }

    fn arity_max(&self) -> usize {
        usize::MAX
    }

    fn arg_traits(
        &self,
        arity: usize,
        _names: &[Option<DName>],
        _implicit_names: &SlotSet,
        _dirs: &[Directive],
    ) -> Arc<ArgTraits> {
        Arc::new(ArgTraits::seq(self.id, arity, arity - 1, true, true))
    }

    fn specialize_types(
        &self,
        info: &InvocationInfo<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Specialization {
        let body = info.arity() - 1;
        for slot in 0..body {
            if !info.arg_type(slot).is_seq() {
                sink.post(
                    Diagnostic::error(
                        Category::TypeMismatch,
                        format!("ForEach needs a sequence, got {}", info.arg_type(slot)),
                    )
                    .at(info.location(slot))
                    .for_slot(slot),
                );
            }
        }
        Specialization::as_bound(info, DType::seq(info.arg_type(body).clone()))
    }
}

// ---------------------------------------------------------------------------
// With / Guard
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct WithOper {
    id: OperId,
    name: DName,
    kind: ScopeKind,
}

impl WithOper {
    pub fn new(kind: ScopeKind) -> Self {
        let name = match kind {
            ScopeKind::With => "With",
            ScopeKind::Guard => "Guard",
            other => panic!("WithOper binds With or Guard scopes, not {other:?}"),
        };
        Self {
            id: OperId::fresh(),
            name: DName::from(name),
            kind,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }
}

impl RexlOper for WithOper {
    fn id(&self) -> OperId {
        self.id
    }

    fn name(&self) -> &DName {
        &self.name
    }

    fn arity_min(&self) -> usize {
        2
    }

    fn arity_max(&self) -> usize {
        usize::MAX
    }

    fn arg_traits(
        &self,
        arity: usize,
        _names: &[Option<DName>],
        _implicit_names: &SlotSet,
        _dirs: &[Directive],
    ) -> Arc<ArgTraits> {
        Arc::new(ArgTraits::with(self.id, arity, self.kind, arity - 1))
    }

    fn specialize_types(
        &self,
        info: &InvocationInfo<'_>,
        _sink: &mut dyn DiagnosticSink,
    ) -> Specialization {
        let body = info.arg_type(info.arity() - 1);
        let result = match self.kind {
            ScopeKind::Guard if !body.is_nullable() => body.clone().opt(),
            _ => body.clone(),
        };
        Specialization::as_bound(info, result)
    }
}
