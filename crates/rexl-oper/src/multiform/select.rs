//! Choosing the forms a call's arity, names and directives fit.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use rexl_diag::{Category, Diagnostic, DiagnosticSink};
use rexl_types::DName;
use tracing::debug;

use super::form::InvocationForm;
use crate::directive::Directive;
use crate::invocation::InvocationInfo;
use crate::slot_set::SlotSet;

/// How one call binds to one form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormMatch {
    /// Index of the form in its operation.
    pub form: usize,
    /// Field bound by each slot; `None` for the source slot.
    pub slot_fields: Vec<Option<usize>>,
    /// Selector slots, which follow the source directly.
    pub selectors: usize,
    /// Selector fields in effect; a `Top` directive drops the rest.
    pub selector_cut: usize,
}

impl FormMatch {
    pub fn selector_slots(&self) -> std::ops::Range<usize> {
        1..1 + self.selectors
    }
}

/// Ordered candidates for a call, remembered on its traits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormChoice {
    pub candidates: Arc<[FormMatch]>,
    pub current: usize,
    /// No form fit; `candidates` holds the closest one so specialization
    /// can explain what is wrong.
    pub parse_error: bool,
}

impl FormChoice {
    pub fn current(&self) -> &FormMatch {
        &self.candidates[self.current]
    }

    pub fn has_next(&self) -> bool {
        self.current + 1 < self.candidates.len()
    }

    pub fn advanced(&self) -> Self {
        Self {
            current: self.current + 1,
            ..self.clone()
        }
    }
}

/// Candidate forms in the order they are tried: more selectors first, then
/// narrower arity range, then smaller maximum arity, then registration
/// order.
pub fn select<C>(
    forms: &[Arc<InvocationForm<C>>],
    arity: usize,
    names: &[Option<DName>],
    implicit: &SlotSet,
    dirs: &[Directive],
) -> FormChoice {
    let mut candidates: Vec<FormMatch> = forms
        .iter()
        .enumerate()
        .filter(|(_, form)| form.supports_arity(arity))
        .filter_map(|(idx, form)| match_form(idx, form, arity, names, implicit, dirs))
        .collect();
    candidates.sort_by_key(|m| {
        let form = &forms[m.form];
        (
            Reverse(form.selector_count()),
            form.arity_max() - form.arity_min(),
            form.arity_max(),
        )
    });

    if !candidates.is_empty() {
        debug!(arity, candidates = candidates.len(), "selected forms");
        return FormChoice {
            candidates: candidates.into(),
            current: 0,
            parse_error: false,
        };
    }

    let closest = closest_form(forms, arity);
    debug!(arity, form = %forms[closest].name(), "no form matches; keeping the closest");
    FormChoice {
        candidates: vec![loose_match(closest, &forms[closest], arity)].into(),
        current: 0,
        parse_error: true,
    }
}

/// Bind slots to fields, or `None` if the call cannot fit the form.
pub fn match_form<C>(
    idx: usize,
    form: &InvocationForm<C>,
    arity: usize,
    names: &[Option<DName>],
    implicit: &SlotSet,
    dirs: &[Directive],
) -> Option<FormMatch> {
    let offset = usize::from(form.has_mis());
    if arity < offset {
        return None;
    }
    let fields = form.fields();
    let selector_total = form.selector_count();
    let mut cut = selector_total;
    let mut slot_fields = vec![None; arity];
    let mut used = vec![false; fields.len()];
    let mut next = 0;
    let mut positional = true;

    for slot in offset..arity {
        if next >= cut && next < selector_total {
            next = selector_total;
        }
        let name = names[slot].as_ref();
        let field = match name {
            Some(name) if !implicit.contains(slot) => {
                let field = form.field_index(name)?;
                if field != next {
                    positional = false;
                }
                field
            }
            _ if positional => next,
            // Past an out-of-order name only names bind, implicit ones included.
            _ => form.field_index(name?)?,
        };
        if field >= fields.len() || used[field] || (field < selector_total && field >= cut) {
            return None;
        }
        used[field] = true;
        slot_fields[slot] = Some(field);
        if positional {
            next = field + 1;
        }
        if dirs[slot] == Directive::Top && field < selector_total {
            cut = cut.min(field + 1);
        }
    }

    // A `Top` seen late may have cut selectors bound earlier.
    if slot_fields
        .iter()
        .flatten()
        .any(|&f| f < selector_total && f >= cut)
    {
        return None;
    }
    let dropped = |f: usize| f < selector_total && f >= cut;
    if fields
        .iter()
        .enumerate()
        .any(|(f, field)| !used[f] && !dropped(f) && field.default.is_required())
    {
        return None;
    }

    let is_selector = |slot: usize| slot_fields[slot].is_some_and(|f| f < selector_total);
    let selectors = (offset..arity).take_while(|&slot| is_selector(slot)).count();
    if (offset + selectors..arity).any(is_selector) {
        return None;
    }
    if form.has_mis() && selectors == 0 {
        return None;
    }

    Some(FormMatch {
        form: idx,
        slot_fields,
        selectors,
        selector_cut: cut,
    })
}

fn closest_form<C>(forms: &[Arc<InvocationForm<C>>], arity: usize) -> usize {
    let distance = |form: &InvocationForm<C>| {
        if arity < form.arity_min() {
            form.arity_min() - arity
        } else {
            arity.saturating_sub(form.arity_max())
        }
    };
    forms
        .iter()
        .enumerate()
        .min_by_key(|(_, form)| distance(form))
        .map(|(idx, _)| idx)
        .unwrap_or_else(|| panic!("multi-form operation without forms"))
}

/// Positional binding that ignores names, for explaining a failed match.
fn loose_match<C>(idx: usize, form: &InvocationForm<C>, arity: usize) -> FormMatch {
    let offset = usize::from(form.has_mis()).min(arity);
    let selector_total = form.selector_count();
    let slot_fields: Vec<Option<usize>> = (0..arity)
        .map(|slot| {
            slot.checked_sub(offset)
                .filter(|&f| slot >= offset && f < form.fields().len())
        })
        .collect();
    let selectors = if form.has_mis() {
        (offset..arity)
            .take_while(|&slot| slot_fields[slot].is_some_and(|f| f < selector_total))
            .count()
    } else {
        0
    };
    FormMatch {
        form: idx,
        slot_fields,
        selectors,
        selector_cut: selector_total,
    }
}

/// Post the diagnostics explaining why no form fit, against the closest one.
pub fn explain<C>(
    oper: &DName,
    form: &InvocationForm<C>,
    info: &InvocationInfo<'_>,
    sink: &mut dyn DiagnosticSink,
) {
    let arity = info.arity();
    sink.post(
        Diagnostic::error(
            Category::NoMatchingForm,
            format!("no form of {oper} accepts this call"),
        )
        .at(info.call_location())
        .with_help(format!("closest form: {}", form.signature())),
    );

    let offset = usize::from(form.has_mis()).min(arity);
    let mut seen: HashSet<&DName> = HashSet::new();
    let mut bound: HashSet<usize> = HashSet::new();
    for slot in offset..arity {
        match info.explicit_name(slot) {
            Some(name) => {
                if !seen.insert(name) {
                    sink.post(
                        Diagnostic::error(
                            Category::DuplicateName,
                            format!("`{name}` is given more than once"),
                        )
                        .at(info.location(slot))
                        .for_slot(slot),
                    );
                }
                match form.field_index(name) {
                    Some(field) => {
                        bound.insert(field);
                    }
                    None => sink.post(
                        Diagnostic::error(
                            Category::BadFieldName,
                            format!("{} has no parameter named `{name}`", form.name()),
                        )
                        .at(info.location(slot))
                        .for_slot(slot)
                        .with_help(format!("expected {}", form.signature())),
                    ),
                }
            }
            None => {
                bound.insert(slot - offset);
            }
        }
    }

    for (field, spec) in form.fields().iter().enumerate() {
        if spec.default.is_required() && !bound.contains(&field) {
            sink.post(
                Diagnostic::error(
                    Category::MissingRequired,
                    format!("missing required argument `{}` of {}", spec.name, form.name()),
                )
                .at(info.call_location()),
            );
        }
    }
    if arity < form.arity_min() || arity > form.arity_max() {
        sink.post(
            Diagnostic::error(
                Category::ArityMismatch,
                format!(
                    "{} takes {} to {} arguments, got {arity}",
                    form.name(),
                    form.arity_min(),
                    form.arity_max()
                ),
            )
            .at(info.call_location()),
        );
    }
}
