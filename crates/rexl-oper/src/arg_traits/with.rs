//! Traits for `With`/`Guard`-style operations.
//!
//! The first `scopes` slots each bind a value; every slot after the first is
//! nested, so a later binding may refer to an earlier one and the final
//! body sees all of them: `With(a: 3, b: a + 1, a * b)`.

use super::{ArgShape, ArgTraits};
use crate::oper::OperId;
use crate::scope::ScopeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithShape {
    /// `With` or `Guard`.
    pub kind: ScopeKind,
    pub scopes: usize,
}

impl WithShape {
    pub(crate) fn scope_kind(&self, slot: usize) -> ScopeKind {
        if slot < self.scopes {
            self.kind
        } else {
            ScopeKind::None
        }
    }

    pub(crate) fn is_nested(&self, slot: usize) -> bool {
        slot >= 1
    }
}

impl ArgTraits {
    pub fn with(oper: OperId, slot_count: usize, kind: ScopeKind, scopes: usize) -> Self {
        assert!(
            matches!(kind, ScopeKind::With | ScopeKind::Guard),
            "with traits bind With or Guard scopes, not {kind:?}"
        );
        assert!(
            scopes >= 1 && scopes < slot_count,
            "with traits need at least one scope and a body"
        );
        Self::finish(oper, slot_count, ArgShape::With(WithShape { kind, scopes }))
    }
}
