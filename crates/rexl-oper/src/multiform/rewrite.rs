//! Reduction of multi-form calls into executor calls.
//!
//! | form                        | rewrite                                        |
//! |-----------------------------|------------------------------------------------|
//! | no source                   | `Exec(a)` or `Exec({A: a, B: b})`              |
//! | source, no merge            | `Exec(ForEach(x: src, sel), {..})`             |
//! | merge                       | `Exec(w: src, ForEach(x: w, sel), w, {..})`    |
//! | merge, function, no wrapper | `Guard(g: src, Exec(w: g, ForEach(x: w, sel), w, {..}))` |
//!
//! `{..}` stands for the plain fields after the selectors, present only when
//! the form has any. A merging executor binds the source to its own `With`
//! scope, so the source is evaluated once even though the executor reads it
//! twice. The `Guard` variant also skips the executor for a null source.

use std::collections::HashMap;
use std::sync::Arc;

use rexl_types::{DName, DType};
use tracing::debug;

use super::{Cookie, ExecKey, FormMatch, MultiFormOper};
use crate::bind::{ArgSpec, ScopeView};
use crate::bound::{BoundNode, CallNode};
use crate::core_opers;
use crate::oper::RexlOper;
use crate::reduce::Reducer;
use crate::scope::{ArgScope, ScopeId};

pub(super) fn reduce<C: Cookie>(
    oper: &MultiFormOper<C>,
    reducer: &mut dyn Reducer,
    call: &CallNode,
    m: &FormMatch,
) -> BoundNode {
    let form = &oper.forms[m.form];
    let fields = form.fields();
    let selector_total = form.selector_count();

    // Field values in field order: given, defaulted, or dropped by `Top`.
    let mut values: Vec<Option<BoundNode>> = vec![None; fields.len()];
    for (slot, field) in m.slot_fields.iter().enumerate() {
        if let Some(field) = field {
            values[*field] = Some(call.args[slot].clone());
        }
    }
    for (f, field) in fields.iter().enumerate() {
        let dropped = f < selector_total && f >= m.selector_cut;
        if values[f].is_none() && !dropped {
            values[f] = Some(field.default.to_node(&field.ty).unwrap_or_else(|| {
                panic!("required field {} of {} is unbound", field.name, form.name())
            }));
        }
    }
    let pack = |range: std::ops::Range<usize>| -> Vec<(DName, BoundNode)> {
        range
            .filter_map(|f| values[f].clone().map(|v| (fields[f].name.clone(), v)))
            .collect()
    };

    if !form.has_mis() {
        let mut packed = pack(0..fields.len());
        let input = if fields.len() == 1 {
            packed.remove(0).1
        } else {
            BoundNode::record(packed)
        };
        let exec: Arc<dyn RexlOper> = oper.exec_oper(ExecKey {
            form: m.form,
            inputs: vec![input.ty.clone()],
            source: None,
        });
        debug!(oper = %oper.name(), form = %form.name(), "direct rewrite");
        return reducer.synthesize(&exec, vec![ArgSpec::node(input)]);
    }

    let source = call.args[0].clone();
    let item = call
        .scope_for(0)
        .unwrap_or_else(|| panic!("{} call has no source scope", oper.name()))
        .clone();

    let mut selectors = pack(0..selector_total);
    let selector = if selectors.len() == 1 {
        selectors.remove(0).1
    } else {
        BoundNode::record(selectors)
    };
    let trailing = pack(selector_total..fields.len());
    let trailing = (!trailing.is_empty()).then(|| BoundNode::record(trailing));

    let mapped_ty = DType::seq(selector.ty.clone());
    let mut inputs = Vec::new();
    if form.has_merge() {
        inputs.push(source.ty.clone());
    }
    inputs.push(mapped_ty);
    if form.has_merge() {
        inputs.push(source.ty.clone());
    }
    inputs.extend(trailing.iter().map(|t| t.ty.clone()));
    let key = ExecKey {
        form: m.form,
        inputs,
        source: form.has_merge().then(|| source.ty.clone()),
    };
    let exec = oper.exec_oper(key);
    let pure_guard = !oper.is_proc()
        && exec
            .merge()
            .is_some_and(|info| info.type_mrg == info.type_dst);
    let exec: Arc<dyn RexlOper> = exec;

    if !form.has_merge() {
        let mapped = reducer.synthesize(core_opers::for_each(), map_args(source, &item, &selector));
        let mut args = vec![ArgSpec::node(mapped)];
        args.extend(trailing.map(ArgSpec::node));
        debug!(oper = %oper.name(), form = %form.name(), "mapped rewrite");
        return reducer.synthesize(&exec, args);
    }

    debug!(oper = %oper.name(), form = %form.name(), guard = pure_guard, "merge rewrite");
    if !pure_guard {
        return reducer.synthesize(&exec, merge_args(source, &item, &selector, trailing));
    }
    reducer.synthesize(
        core_opers::guard(),
        vec![
            ArgSpec::node(source),
            ArgSpec::nested(move |binder, view| {
                let guarded = view
                    .get(0)
                    .unwrap_or_else(|| panic!("merge rewrite lost its guard scope"));
                binder.synthesize_call(&exec, merge_args(guarded, &item, &selector, trailing.clone()))
            }),
        ],
    )
}

/// `H(x: source, ForEach(y: x, selector), x, trailing)` arguments for a
/// merging executor.
fn merge_args(
    source: BoundNode,
    item: &ArgScope,
    selector: &BoundNode,
    trailing: Option<BoundNode>,
) -> Vec<ArgSpec> {
    let item = item.clone();
    let selector = selector.clone();
    let mut args = vec![
        ArgSpec::node(source),
        ArgSpec::nested(move |binder, view| {
            let bound = bound_source(view);
            binder.synthesize_call(core_opers::for_each(), map_args(bound, &item, &selector))
        }),
        ArgSpec::nested(|_, view| bound_source(view)),
    ];
    args.extend(trailing.map(ArgSpec::node));
    args
}

fn bound_source(view: &ScopeView<'_>) -> BoundNode {
    view.get(0)
        .unwrap_or_else(|| panic!("merge executor lost its source scope"))
}

/// `ForEach(x: source, selector)` with the original item and index scopes
/// of `selector` redirected to the new loop's.
fn map_args(source: BoundNode, item: &ArgScope, selector: &BoundNode) -> Vec<ArgSpec> {
    let item_id = item.id;
    let index_id = item.index;
    let selector = selector.clone();
    vec![
        ArgSpec::node(source),
        ArgSpec::nested(move |_, view| selector.substitute(&scope_map(item_id, index_id, view))),
    ]
}

fn scope_map(
    item: ScopeId,
    index: Option<ScopeId>,
    view: &ScopeView<'_>,
) -> HashMap<ScopeId, BoundNode> {
    let mut map = HashMap::new();
    if let Some(node) = view.get(0) {
        map.insert(item, node);
    }
    if let (Some(index), Some(node)) = (index, view.index(0)) {
        map.insert(index, node);
    }
    map
}
