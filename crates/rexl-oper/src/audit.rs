//! Consistency checks over a constructed [`ArgTraits`].
//!
//! The auditor only uses the public query surface, so it checks what callers
//! observe rather than how a shape stores its masks. Constructors run it in
//! debug builds; the binder runs it according to [`crate::AuditPolicy`].

use crate::arg_traits::ArgTraits;
use crate::scope::ScopeKind;

/// First inconsistency found in a set of traits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("scope slot count {counted} disagrees with reported {reported}")]
    ScopeCount { counted: usize, reported: usize },
    #[error("nested slot count {counted} disagrees with reported {reported}")]
    NestedCount { counted: usize, reported: usize },
    #[error("slot {slot}: {reason}")]
    Scope { slot: usize, reason: &'static str },
    #[error("index scopes are not contiguous: expected iidx {expected}, found {found} at slot {slot}")]
    IndexGap {
        slot: usize,
        expected: usize,
        found: usize,
    },
    #[error("nested slot {slot}: {reason}")]
    Nested { slot: usize, reason: &'static str },
    #[error("slot {slot}: {reason}")]
    Lift { slot: usize, reason: &'static str },
    #[error("slot {slot}: {reason}")]
    Name { slot: usize, reason: &'static str },
    #[error("slot {slot}: cached repetition disagrees with a scan of its scopes")]
    Repeated { slot: usize },
    #[error("traits are not equivalent to themselves")]
    NotReflexive,
}

/// Check every structural invariant of `traits`.
pub fn audit(traits: &ArgTraits) -> Result<(), AuditError> {
    audit_counts(traits)?;
    audit_indices(traits)?;
    audit_nesting(traits)?;
    audit_lifts(traits)?;
    audit_names(traits)?;
    if !traits.are_equivalent(traits) {
        return Err(AuditError::NotReflexive);
    }
    Ok(())
}

fn audit_counts(traits: &ArgTraits) -> Result<(), AuditError> {
    let n = traits.slot_count();
    let scopes = (0..n).filter(|&s| traits.is_scope(s)).count();
    if scopes != traits.scope_count() {
        return Err(AuditError::ScopeCount {
            counted: scopes,
            reported: traits.scope_count(),
        });
    }
    let nested = (0..n).filter(|&s| traits.is_nested(s)).count();
    if nested != traits.nested_count() {
        return Err(AuditError::NestedCount {
            counted: nested,
            reported: traits.nested_count(),
        });
    }
    Ok(())
}

fn audit_indices(traits: &ArgTraits) -> Result<(), AuditError> {
    let mut assigned = 0;
    for slot in 0..traits.slot_count() {
        let Some(index) = traits.scope_index(slot) else {
            continue;
        };
        let kind = traits.scope_kind(slot);
        if !kind.is_indexable() {
            return Err(AuditError::Scope {
                slot,
                reason: "index scope on a kind that cannot carry one",
            });
        }
        // A new index takes the next free number and is the only one marked
        // first; a shared index reuses an earlier number.
        let expected = assigned;
        if index.iidx > expected || (index.iidx == expected) != index.first {
            return Err(AuditError::IndexGap {
                slot,
                expected,
                found: index.iidx,
            });
        }
        if index.first {
            assigned += 1;
        }
    }
    Ok(())
}

fn audit_nesting(traits: &ArgTraits) -> Result<(), AuditError> {
    let n = traits.slot_count();
    for slot in 0..n {
        if !traits.is_nested(slot) {
            if traits.scopes_pushed(slot) != 0 || traits.is_nested_tail(slot) {
                return Err(AuditError::Scope {
                    slot,
                    reason: "scope stack reported for a slot that is not nested",
                });
            }
            continue;
        }

        let pushed = traits.scopes_pushed(slot);
        if pushed == 0 {
            return Err(AuditError::Nested {
                slot,
                reason: "no scope is pushed",
            });
        }
        if !(0..pushed).any(|up| traits.is_scope_active(slot, up)) {
            return Err(AuditError::Nested {
                slot,
                reason: "no pushed scope is active",
            });
        }
        if (pushed..pushed + traits.scope_count() + 1).any(|up| traits.is_scope_active(slot, up)) {
            return Err(AuditError::Nested {
                slot,
                reason: "a scope beyond the pushed ones is active",
            });
        }
        for up in 0..pushed {
            let introduced = traits.scope_slot(slot, up);
            if !introduced.is_some_and(|s| s < slot && traits.is_scope(s)) {
                return Err(AuditError::Nested {
                    slot,
                    reason: "pushed scope was not introduced by an earlier scope slot",
                });
            }
        }

        let tail = slot + 1 == n || !traits.is_nested(slot + 1);
        if tail != traits.is_nested_tail(slot) {
            return Err(AuditError::Nested {
                slot,
                reason: "tail flag disagrees with the following slot",
            });
        }
        if tail && traits.is_scope(slot) {
            return Err(AuditError::Nested {
                slot,
                reason: "a nested tail cannot introduce a scope",
            });
        }

        let scanned = (0..pushed).any(|up| {
            traits.is_scope_active(slot, up)
                && traits
                    .scope_slot(slot, up)
                    .is_some_and(|s| traits.scope_kind(s).is_loop_scope())
        });
        if scanned != traits.is_repeated(slot) {
            return Err(AuditError::Repeated { slot });
        }
    }
    Ok(())
}

fn audit_lifts(traits: &ArgTraits) -> Result<(), AuditError> {
    let Some(lift) = traits.lift_masks() else {
        return Ok(());
    };
    let n = traits.slot_count();
    if !(lift.seq.is_below(n) && lift.ten.is_below(n) && lift.opt.is_below(n)) {
        return Err(AuditError::Lift {
            slot: n,
            reason: "lift mask names a slot past the end",
        });
    }
    for slot in 0..n {
        let conflict = match traits.scope_kind(slot) {
            ScopeKind::Guard => traits.lifts_over_opt(slot),
            ScopeKind::SeqItem => traits.lifts_over_seq(slot),
            ScopeKind::TenItem => traits.lifts_over_ten(slot),
            _ => false,
        };
        if conflict {
            return Err(AuditError::Lift {
                slot,
                reason: "scope slot lifts over the container it unwraps",
            });
        }
    }
    Ok(())
}

fn audit_names(traits: &ArgTraits) -> Result<(), AuditError> {
    for slot in 0..traits.slot_count() {
        let named = traits.supports_name(slot);
        if traits.requires_name(slot) && !named {
            return Err(AuditError::Name {
                slot,
                reason: "name required but not supported",
            });
        }
        if traits.supports_implicit_name(slot) && !named {
            return Err(AuditError::Name {
                slot,
                reason: "implicit name supported but names are not",
            });
        }
    }
    if traits.supports_implicit_dotted_name()
        && !(0..traits.slot_count()).any(|s| traits.supports_implicit_name(s))
    {
        return Err(AuditError::Name {
            slot: 0,
            reason: "dotted names allowed with no slot taking implicit names",
        });
    }
    Ok(())
}
