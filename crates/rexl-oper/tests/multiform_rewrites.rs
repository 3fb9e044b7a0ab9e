use std::sync::{Arc, Barrier};
use std::thread;

use insta::assert_snapshot;
use rexl_oper::{
    ArgSpec, Binder, BoundNode, Category, Directive, EngineConfig, FormField, FormOutput,
    InvocationForm, Literal, MultiFormOper, Reducer, RexlOper, ScopeKind, SourceLocation,
    StandardReducer, TraceEvent, render,
};
use rexl_types::{DName, DType};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn stat() -> Arc<MultiFormOper<&'static str>> {
    Arc::new(MultiFormOper::new(
        "Stat",
        vec![
            InvocationForm::builder("count", "stat_count")
                .source()
                .field(FormField::selector("Pred", DType::Bool))
                .output(FormOutput::Single(DType::I64))
                .build()
                .unwrap(),
            InvocationForm::builder("sum", "stat_sum")
                .source()
                .field(FormField::selector("Value", DType::F64))
                .field(FormField::new("Scale", DType::F64).or(rexl_oper::SlotDefault::Float(1.0)))
                .output(FormOutput::Single(DType::F64))
                .build()
                .unwrap(),
            InvocationForm::builder("total", "stat_total")
                .field(FormField::new("Values", DType::seq(DType::F64)))
                .output(FormOutput::Single(DType::F64))
                .build()
                .unwrap(),
        ],
    ))
}

fn ranked(dst_field: Option<&str>) -> InvocationForm<&'static str> {
    let builder = InvocationForm::builder("ranked", "rank_by")
        .source()
        .field(FormField::selector("Key", DType::I64))
        .output(FormOutput::Seq {
            item: DType::record(vec![(DName::from("Rank"), DType::I64)]),
            merge: true,
        });
    match dst_field {
        Some(field) => builder.dst_field(field),
        None => builder,
    }
    .build()
    .unwrap()
}

fn people() -> BoundNode {
    BoundNode::global(
        "people",
        DType::seq(DType::record(vec![
            (DName::from("Age"), DType::I64),
            (DName::from("Name"), DType::Text),
        ])),
    )
}

fn ints() -> BoundNode {
    BoundNode::global("xs", DType::seq(DType::I64))
}

fn item() -> ArgSpec {
    ArgSpec::nested(|_, view| view.get(0).expect("item scope"))
}

fn age() -> ArgSpec {
    ArgSpec::nested(|_, view| BoundNode::get_field(view.get(0).expect("item scope"), "Age"))
}

fn bind(oper: &Arc<dyn RexlOper>, args: Vec<ArgSpec>) -> BoundNode {
    Binder::default()
        .bind_call(oper, args, None)
        .unwrap_or_else(|err| panic!("bind failed: {err}"))
}

fn reduce(node: BoundNode) -> BoundNode {
    StandardReducer::new(EngineConfig::default()).reduce(node)
}

// ---------------------------------------------------------------------------
// Rewrites
// ---------------------------------------------------------------------------

#[test]
fn mapped_form_rewrites_to_for_each() {
    let oper: Arc<dyn RexlOper> = stat();
    let bound = bind(&oper, vec![ArgSpec::node(ints()), item()]);
    assert_eq!(bound.ty, DType::F64);
    assert_snapshot!(render(&bound), @"Stat(s0@s1: xs, Convert(s0 as Float64))");

    let reduced = reduce(bound);
    assert_eq!(reduced.ty, DType::F64);
    assert_snapshot!(
        render(&reduced),
        @"Stat.sum(ForEach(s0@s1: xs, Convert(s0 as Float64)), {Scale: 1.0})"
    );
}

#[test]
fn explicit_trailing_field_is_packed() {
    let oper: Arc<dyn RexlOper> = stat();
    let bound = bind(
        &oper,
        vec![
            ArgSpec::node(ints()),
            item(),
            ArgSpec::node(BoundNode::constant(Literal::Float(0.5))).named("Scale"),
        ],
    );
    assert_snapshot!(
        render(&reduce(bound)),
        @"Stat.sum(ForEach(s0@s1: xs, Convert(s0 as Float64)), {Scale: 0.5})"
    );
}

#[test]
fn direct_form_passes_its_field() {
    let oper: Arc<dyn RexlOper> = stat();
    let values = BoundNode::global("values", DType::seq(DType::F64));
    let bound = bind(&oper, vec![ArgSpec::node(values)]);
    assert_snapshot!(render(&reduce(bound)), @"Stat.total(values)");
}

#[test]
fn pure_merge_guards_a_scoped_executor() {
    let oper: Arc<dyn RexlOper> = Arc::new(MultiFormOper::new("Rank", vec![ranked(None)]));
    let bound = bind(&oper, vec![ArgSpec::node(people()), age()]);
    assert_eq!(
        bound.ty.to_string(),
        "{Age: Int64, Name: Text, Rank: Int64}*"
    );

    let reduced = reduce(bound.clone());
    assert_eq!(reduced.ty, bound.ty);
    assert_snapshot!(
        render(&reduced),
        @"Guard(s0: people, Rank.ranked(s1: s0, ForEach(s2@s3: s1, s2.Age), s1))"
    );
}

#[test]
fn procedure_merge_binds_source_in_executor_scope() {
    let oper: Arc<dyn RexlOper> =
        Arc::new(MultiFormOper::new("Rank", vec![ranked(None)]).procedure());
    let reduced = reduce(bind(&oper, vec![ArgSpec::node(people()), age()]));
    assert_snapshot!(
        render(&reduced),
        @"Rank.ranked(s0: people, ForEach(s1@s2: s0, s1.Age), s0)"
    );

    let call = reduced.as_call().unwrap();
    assert!(call.oper.is_proc());
    assert_eq!(call.traits.scope_kind(0), ScopeKind::With);
    assert!(call.traits.is_nested(1));
    assert!(call.traits.is_nested(2));
}

#[test]
fn wrapped_merge_result_binds_source_in_executor_scope() {
    let oper: Arc<dyn RexlOper> =
        Arc::new(MultiFormOper::new("Rank", vec![ranked(Some("Rows"))]));
    let bound = bind(&oper, vec![ArgSpec::node(people()), age()]);
    assert_eq!(
        bound.ty.to_string(),
        "{Rows: {Age: Int64, Name: Text, Rank: Int64}*}"
    );
    assert_snapshot!(
        render(&reduce(bound)),
        @"Rank.ranked(s0: people, ForEach(s1@s2: s0, s1.Age), s0)"
    );
}

#[test]
fn top_directive_drops_later_selectors() {
    let oper: Arc<dyn RexlOper> = Arc::new(MultiFormOper::new(
        "Sort",
        vec![
            InvocationForm::builder("sorted", ())
                .source()
                .field(FormField::selector("Key", DType::I64))
                .field(
                    FormField::selector("Then", DType::I64.opt())
                        .or(rexl_oper::SlotDefault::Null),
                )
                .output(FormOutput::Single(DType::I64))
                .build()
                .unwrap(),
        ],
    ));
    let bound = bind(
        &oper,
        vec![ArgSpec::node(ints()), item().with_dir(Directive::Top)],
    );
    assert_snapshot!(render(&bound), @"Sort(s0@s1: xs, [top] s0)");
    assert_snapshot!(render(&reduce(bound)), @"Sort.sorted(ForEach(s0@s1: xs, s0))");

    let both = bind(&oper, vec![ArgSpec::node(ints()), item(), item()]);
    assert_snapshot!(
        render(&reduce(both)),
        @"Sort.sorted(ForEach(s0@s1: xs, {Key: s0, Then: Convert(s0 as Int64?)}))"
    );
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

#[test]
fn type_mismatch_moves_to_next_form() {
    let oper: Arc<dyn RexlOper> = stat();
    let mut binder = Binder::new(EngineConfig {
        trace: true,
        ..EngineConfig::default()
    });
    binder
        .bind_call(&oper, vec![ArgSpec::node(ints()), item()], None)
        .unwrap();

    let events = binder.trace().events();
    assert_eq!(events.len(), 1);
    let TraceEvent::Rebind(step) = &events[0] else {
        panic!("expected a rebind, got {:?}", events[0]);
    };
    assert_eq!(step.oper, "Stat");
    assert_eq!((step.from.owner_key, step.to.owner_key), (1, 2));
    assert_eq!(step.to.shape, "general");
}

#[test]
fn bool_selector_keeps_first_form() {
    let oper: Arc<dyn RexlOper> = stat();
    let flags = BoundNode::global("flags", DType::seq(DType::Bool));
    let bound = bind(&oper, vec![ArgSpec::node(flags), item()]);
    assert_eq!(bound.ty, DType::I64);
    assert_snapshot!(render(&reduce(bound)), @"Stat.count(ForEach(s0@s1: flags, s0))");
}

#[test]
fn last_candidate_reports_its_mismatch() {
    let oper: Arc<dyn RexlOper> = stat();
    let texts = BoundNode::global("names", DType::seq(DType::Text));
    let err = Binder::default()
        .bind_call(&oper, vec![ArgSpec::node(texts), item()], None)
        .unwrap_err();
    assert!(err.has_category(Category::TypeMismatch));
    assert!(!err.has_category(Category::NoMatchingForm));
    assert!(
        err.diagnostics()
            .iter()
            .any(|d| d.message.contains("`Value` of sum"))
    );
}

#[test]
fn unknown_name_explains_against_closest_form() {
    let oper: Arc<dyn RexlOper> = stat();
    let err = Binder::default()
        .bind_call(
            &oper,
            vec![
                ArgSpec::node(ints()),
                ArgSpec::node(BoundNode::constant(Literal::Bool(true))).named("Nope"),
            ],
            None,
        )
        .unwrap_err();
    assert!(err.has_category(Category::NoMatchingForm));
    assert!(err.has_category(Category::BadFieldName));
    assert!(err.has_category(Category::MissingRequired));
}

#[test]
fn non_sequence_source_is_rejected() {
    let oper: Arc<dyn RexlOper> = stat();
    let err = Binder::default()
        .bind_call(
            &oper,
            vec![
                ArgSpec::node(BoundNode::constant(Literal::Int(3))),
                ArgSpec::node(BoundNode::constant(Literal::Bool(true))),
            ],
            None,
        )
        .unwrap_err();
    assert!(err.has_category(Category::BadScopeSource));
}

#[test]
fn directives_outside_selectors_are_rejected() {
    let oper: Arc<dyn RexlOper> = stat();
    let err = Binder::default()
        .bind_call(
            &oper,
            vec![
                ArgSpec::node(ints()),
                item(),
                ArgSpec::node(BoundNode::constant(Literal::Float(2.0))).with_dir(Directive::Top),
            ],
            None,
        )
        .unwrap_err();
    assert!(err.has_category(Category::UnsupportedDirective));
}

// ---------------------------------------------------------------------------
// Executor cache
// ---------------------------------------------------------------------------

#[test]
fn executors_are_cached_by_prepared_inputs() {
    let stat = stat();
    let oper: Arc<dyn RexlOper> = stat.clone();

    let first = reduce(bind(&oper, vec![ArgSpec::node(ints()), item()]));
    let second = reduce(bind(&oper, vec![ArgSpec::node(ints()), item()]));
    assert_eq!(stat.cached_execs(), 1);
    let exec_id = |node: &BoundNode| node.as_call().unwrap().oper.id();
    assert_eq!(exec_id(&first), exec_id(&second));

    // A narrower item type is converted before the executor sees it.
    let narrow = BoundNode::global("ys", DType::seq(DType::I32));
    let third = reduce(bind(&oper, vec![ArgSpec::node(narrow), item()]));
    assert_eq!(exec_id(&third), exec_id(&first));
    assert_eq!(stat.cached_execs(), 1);

    let values = BoundNode::global("values", DType::seq(DType::F64));
    reduce(bind(&oper, vec![ArgSpec::node(values)]));
    assert_eq!(stat.cached_execs(), 2);
}

#[test]
fn executors_carry_their_form_cookie() {
    let stat = stat();
    let oper: Arc<dyn RexlOper> = stat.clone();
    reduce(bind(&oper, vec![ArgSpec::node(ints()), item()]));
    let exec = stat.exec_oper(rexl_oper::ExecKey {
        form: 1,
        inputs: vec![
            DType::seq(DType::F64),
            DType::record(vec![(DName::from("Scale"), DType::F64)]),
        ],
        source: None,
    });
    assert_eq!(*exec.cookie(), "stat_sum");
    assert_eq!(exec.result(), &DType::F64);
    assert_eq!(stat.cached_execs(), 1);
}

#[test]
fn racing_requests_share_one_executor() {
    let stat = stat();
    let key = rexl_oper::ExecKey {
        form: 1,
        inputs: vec![
            DType::seq(DType::F64),
            DType::record(vec![(DName::from("Scale"), DType::F64)]),
        ],
        source: None,
    };
    let start = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let stat = Arc::clone(&stat);
            let key = key.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                stat.exec_oper(key)
            })
        })
        .collect();
    let execs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(execs.iter().all(|exec| Arc::ptr_eq(exec, &execs[0])));
    assert_eq!(stat.cached_execs(), 1);
}

#[test]
fn executor_mismatch_points_at_the_argument() {
    let stat = stat();
    let exec: Arc<dyn RexlOper> = stat.exec_oper(rexl_oper::ExecKey {
        form: 2,
        inputs: vec![DType::seq(DType::F64)],
        source: None,
    });
    let arg_at = SourceLocation::new(0, 10, 15);
    let err = Binder::default()
        .bind_call(
            &exec,
            vec![ArgSpec::node(BoundNode::global("name", DType::Text)).at(arg_at)],
            Some(SourceLocation::new(0, 0, 16)),
        )
        .unwrap_err();

    let diag = &err.diagnostics()[0];
    assert_eq!(diag.category, Category::TypeMismatch);
    assert_eq!(diag.location, Some(arg_at));
    assert_eq!(diag.slot, Some(0));
}

#[test]
fn reduction_is_traced() {
    let oper: Arc<dyn RexlOper> = stat();
    let bound = bind(&oper, vec![ArgSpec::node(ints()), item()]);
    let mut reducer = StandardReducer::new(EngineConfig {
        trace: true,
        ..EngineConfig::default()
    });
    reducer.reduce(bound);

    let json = reducer.trace().to_json().unwrap();
    let events: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(events[0]["kind"], "reduce");
    assert_eq!(events[0]["oper"], "Stat");
    assert_eq!(events[0]["type"], "Float64");
}
