//! Property tests for traits construction, merging and form selection.
//!
//! Properties:
//!
//! 1. Any mask combination `ArgTraits::general` accepts passes the auditor
//!    and is equivalent to itself
//! 2. Merged item types keep every source field and give every output field
//!    a distinct name
//! 3. Form selection is deterministic and orders candidates by selector count
//! 4. Binding a multi-form call terminates within the form count, whatever
//!    the argument types
//! 5. Reducing a bound multi-form call keeps its type and ends in an
//!    executor call or the scope wrapper around one

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use rexl_types::{DName, DType, RecordType};

use crate::arg_traits::{ArgTraits, GeneralShape, LiftMasks, NameMasks};
use crate::audit::audit;
use crate::bind::{ArgSpec, Binder};
use crate::bound::{BoundNode, Literal};
use crate::config::EngineConfig;
use crate::directive::Directive;
use crate::multiform::{FormField, FormOutput, InvocationForm, MergeInfo, MultiFormOper, SlotDefault};
use crate::oper::{OperId, RexlOper};
use crate::reduce::{Reducer, StandardReducer};
use crate::scope::ScopeKind;
use crate::slot_set::SlotSet;
use crate::trace::TraceEvent;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const MAX_SLOTS: usize = 7;

fn arb_slot_set(slots: usize) -> impl Strategy<Value = SlotSet> {
    prop::collection::vec(any::<bool>(), slots).prop_map(|bits| {
        bits.iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(slot, _)| slot)
            .collect()
    })
}

fn arb_scope_kind() -> impl Strategy<Value = ScopeKind> {
    prop_oneof![
        Just(ScopeKind::With),
        Just(ScopeKind::Guard),
        Just(ScopeKind::SeqItem),
        Just(ScopeKind::TenItem),
        Just(ScopeKind::Iter),
        Just(ScopeKind::Range),
        Just(ScopeKind::SeqIndex),
    ]
}

fn arb_lift(slots: usize) -> impl Strategy<Value = LiftMasks> {
    (arb_slot_set(slots), arb_slot_set(slots), arb_slot_set(slots))
        .prop_map(|(seq, ten, opt)| LiftMasks { seq, ten, opt })
}

fn arb_names(slots: usize) -> impl Strategy<Value = NameMasks> {
    (arb_slot_set(slots), arb_slot_set(slots), arb_slot_set(slots), any::<bool>()).prop_map(
        |(name, explicit, required, dotted)| NameMasks {
            explicit: explicit.intersection(&name),
            required: required.intersection(&name),
            name,
            dotted,
        },
    )
}

/// Masks over `1..=MAX_SLOTS` slots. Most are rejected by validation; the
/// rest cover every layout the constructor can produce.
fn arb_general() -> impl Strategy<Value = (usize, GeneralShape)> {
    (1..=MAX_SLOTS).prop_flat_map(|slots| {
        let masks = (
            arb_slot_set(slots),
            arb_slot_set(slots),
            arb_slot_set(slots),
            arb_slot_set(slots),
            any::<bool>(),
        );
        (
            Just(slots),
            masks,
            prop::collection::vec(arb_scope_kind(), slots),
            arb_slot_set(slots * slots),
            arb_names(slots),
            arb_lift(slots),
        )
            .prop_map(
                |(slots, (scope, nested, indexed, lazy, shared_index), kinds, inactive, names, lift)| {
                    let kinds: Vec<ScopeKind> = kinds.into_iter().take(scope.count()).collect();
                    // Index only what can carry one, so more shapes survive.
                    let indexed = indexed
                        .iter()
                        .filter(|&slot| {
                            scope.contains(slot)
                                && kinds
                                    .get(scope.iter().take_while(|&s| s < slot).count())
                                    .is_some_and(|k| k.is_indexable())
                        })
                        .collect();
                    let shape = GeneralShape {
                        scope,
                        kinds,
                        nested,
                        scope_inactive: inactive,
                        names,
                        lift,
                        indexed,
                        shared_index,
                        lazy,
                    };
                    (slots, shape)
                },
            )
    })
}

const NAME_POOL: &[&str] = &["A", "B", "Key", "Key1", "Key2", "Name", "Rank"];

fn arb_leaf_type() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::Bool),
        Just(DType::I32),
        Just(DType::I64),
        Just(DType::F64),
        Just(DType::Text),
        Just(DType::I64.opt()),
    ]
}

fn arb_record() -> impl Strategy<Value = RecordType> {
    prop::collection::btree_map(prop::sample::select(NAME_POOL), arb_leaf_type(), 1..=4).prop_map(
        |fields: BTreeMap<&str, DType>| {
            RecordType::closed(
                fields
                    .into_iter()
                    .map(|(name, ty)| (DName::from(name), ty))
                    .collect(),
            )
        },
    )
}

fn arb_arg_type() -> impl Strategy<Value = DType> {
    prop_oneof![
        3 => arb_leaf_type(),
        2 => arb_leaf_type().prop_map(DType::seq),
        1 => arb_record().prop_map(|r| DType::seq(DType::Record(r))),
    ]
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `Stat(xs, Pred)`, `Stat(xs, Value, [Scale])` and `Stat(values)`.
fn stat_forms() -> Vec<InvocationForm<()>> {
    vec![
        InvocationForm::builder("count", ())
            .source()
            .field(FormField::selector("Pred", DType::Bool))
            .output(FormOutput::Single(DType::I64))
            .build()
            .unwrap(),
        InvocationForm::builder("sum", ())
            .source()
            .field(FormField::selector("Value", DType::F64))
            .field(FormField::new("Scale", DType::F64).or(SlotDefault::Float(1.0)))
            .output(FormOutput::Single(DType::F64))
            .build()
            .unwrap(),
        InvocationForm::builder("total", ())
            .field(FormField::new("Values", DType::seq(DType::F64)))
            .output(FormOutput::Single(DType::F64))
            .build()
            .unwrap(),
    ]
}

/// `Rank(rows, Key, [Then], [Limit])`, merging a `Rank` column into each row.
fn rank_oper(key: DType, dst_field: bool, procedure: bool) -> Arc<dyn RexlOper> {
    let builder = InvocationForm::builder("ranked", ())
        .source()
        .field(FormField::selector("Key", key))
        .field(FormField::selector("Then", DType::I64.opt()).or(SlotDefault::Null))
        .field(FormField::new("Limit", DType::I64).or(SlotDefault::Int(10)))
        .output(FormOutput::Seq {
            item: DType::record(vec![(DName::from("Rank"), DType::I64)]),
            merge: true,
        });
    let builder = if dst_field { builder.dst_field("Rows") } else { builder };
    let oper = MultiFormOper::new("Rank", vec![builder.build().unwrap()]);
    if procedure {
        Arc::new(oper.procedure())
    } else {
        Arc::new(oper)
    }
}

/// Reduce `bound` and check the result against it.
fn check_reduction(bound: BoundNode, exec_prefix: &str) -> Result<(), TestCaseError> {
    let reduced = StandardReducer::new(EngineConfig::default()).reduce(bound.clone());
    prop_assert_eq!(&reduced.ty, &bound.ty);
    let root = reduced.as_call().map(|call| call.oper.name().to_string());
    prop_assert!(
        root.as_deref()
            .is_some_and(|name| name.starts_with(exec_prefix) || name == "With" || name == "Guard"),
        "unexpected reduced root {:?}",
        root
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn accepted_general_traits_pass_audit((slots, shape) in arb_general()) {
        if let Ok(traits) = ArgTraits::general(OperId(1), slots, shape) {
            prop_assert_eq!(audit(&traits), Ok(()));
            prop_assert!(traits.are_equivalent(&traits));
            prop_assert_eq!(traits.scope_slots().count(), traits.scope_count());
        }
    }

    #[test]
    fn equal_masks_give_equivalent_traits((slots, shape) in arb_general()) {
        let first = ArgTraits::general(OperId(1), slots, shape.clone());
        let second = ArgTraits::general(OperId(1), slots, shape);
        match (first, second) {
            (Ok(a), Ok(b)) => prop_assert!(a.are_equivalent(&b)),
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "validation is not deterministic"),
        }
    }

    #[test]
    fn merge_keeps_sources_and_separates_outputs(src in arb_record(), out in arb_record()) {
        let info = MergeInfo::standard(&src, &out, None);
        let item = info.type_mrg.seq_item().and_then(DType::as_record).unwrap();

        for (name, ty) in &src.fields {
            prop_assert_eq!(item.get(name), Some(ty));
        }
        let merged: BTreeSet<&DName> = out.names().map(|n| info.merged_name(n)).collect();
        prop_assert_eq!(merged.len(), out.len());
        for (name, ty) in &out.fields {
            let merged = info.merged_name(name);
            prop_assert_eq!(item.get(merged), Some(ty));
            prop_assert!(merged == name || !src.has(merged));
        }
        prop_assert_eq!(item.len(), src.len() + out.len());
    }

    #[test]
    fn selection_is_deterministic_and_ordered(
        arity in 1usize..=3,
        named in prop::collection::vec(prop::option::of(prop::sample::select(&["Value", "Scale", "Pred", "Nope"][..])), 3),
    ) {
        let oper = MultiFormOper::new("Stat", stat_forms());
        let names: Vec<Option<DName>> = named[..arity]
            .iter()
            .enumerate()
            .map(|(slot, name)| name.filter(|_| slot > 0).map(DName::from))
            .collect();
        let dirs = vec![Directive::None; arity];
        let first = oper.choose(arity, &names, &SlotSet::new(), &dirs);
        let second = oper.choose(arity, &names, &SlotSet::new(), &dirs);
        prop_assert_eq!(&first, &second);

        let counts: Vec<usize> = first
            .candidates
            .iter()
            .map(|m| oper.forms()[m.form].selector_count())
            .collect();
        prop_assert!(counts.windows(2).all(|pair| pair[0] >= pair[1]));
        if !first.parse_error {
            for m in first.candidates.iter() {
                prop_assert!(oper.forms()[m.form].supports_arity(arity));
            }
        }
    }

    #[test]
    fn rebinding_stays_within_form_count(types in prop::collection::vec(arb_arg_type(), 1..=3)) {
        let oper: Arc<dyn RexlOper> = Arc::new(MultiFormOper::new("Stat", stat_forms()));
        let mut binder = Binder::new(EngineConfig { trace: true, ..EngineConfig::default() });
        let args = types
            .iter()
            .enumerate()
            .map(|(i, ty)| ArgSpec::node(BoundNode::global(format!("a{i}"), ty.clone())))
            .collect();

        let result = binder.bind_call(&oper, args, None);
        let rebinds = binder
            .trace()
            .events()
            .iter()
            .filter(|e| matches!(e, TraceEvent::Rebind(_)))
            .count();
        prop_assert!(rebinds < oper.max_rebinds());
        if let Ok(node) = result {
            prop_assert!(node.ty == DType::I64 || node.ty == DType::F64);
        }
    }

    #[test]
    fn reducing_stat_calls_keeps_their_type(types in prop::collection::vec(arb_arg_type(), 1..=3)) {
        let oper: Arc<dyn RexlOper> = Arc::new(MultiFormOper::new("Stat", stat_forms()));
        let args = types
            .iter()
            .enumerate()
            .map(|(i, ty)| ArgSpec::node(BoundNode::global(format!("a{i}"), ty.clone())))
            .collect();
        if let Ok(bound) = Binder::default().bind_call(&oper, args, None) {
            check_reduction(bound, "Stat.")?;
        }
    }

    #[test]
    fn reducing_merges_keeps_their_type(
        row in arb_record(),
        key in any::<prop::sample::Index>(),
        top in any::<bool>(),
        then in any::<bool>(),
        limit in any::<bool>(),
        dst_field in any::<bool>(),
        procedure in any::<bool>(),
    ) {
        let (field, key_ty) = row
            .fields
            .iter()
            .nth(key.index(row.len()))
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .unwrap();
        let oper = rank_oper(key_ty, dst_field, procedure);

        let rows = BoundNode::global("rows", DType::seq(DType::Record(row)));
        let mut selector = ArgSpec::nested(move |_, view| {
            BoundNode::get_field(view.get(0).expect("row scope"), field.clone())
        });
        if top {
            selector = selector.with_dir(Directive::Top);
        }
        let mut args = vec![ArgSpec::node(rows), selector];
        if then && !top {
            args.push(ArgSpec::node(BoundNode::constant(Literal::Int(1))));
        }
        if limit {
            args.push(ArgSpec::node(BoundNode::constant(Literal::Int(3))).named("Limit"));
        }

        let bound = Binder::default()
            .bind_call(&oper, args, None)
            .unwrap_or_else(|err| panic!("rank call failed to bind: {err}"));
        check_reduction(bound, "Rank.")?;
    }
}
