//! Reference binder driving operations through their phases.
//!
//! The binder owns the parts of the protocol that sit outside an operation:
//! it derives traits, binds each argument with the scopes it can see,
//! retries with new traits when specialization asks for it, inserts
//! conversions and certifies the result. Reduction uses the same machinery
//! through [`Binder::synthesize_call`] to build calls it knows are valid.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rexl_diag::{Category, Diagnostic, DiagnosticError, SourceLocation};
use rexl_types::{DName, DType};
use tracing::{debug, trace};

use crate::arg_traits::ArgTraits;
use crate::audit::audit;
use crate::bound::{BoundNode, CallNode};
use crate::config::EngineConfig;
use crate::directive::Directive;
use crate::invocation::InvocationInfo;
use crate::oper::RexlOper;
use crate::scope::{ArgScope, ScopeId};
use crate::slot_set::SlotSet;
use crate::trace::{RebindStep, Trace, TraceEvent, TraitsSummary};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Builds a nested argument from the scopes visible to its slot. Called
/// again on every rebind.
pub type NestedFn = Arc<dyn Fn(&mut Binder, &ScopeView<'_>) -> BoundNode + Send + Sync>;

#[derive(Clone)]
pub enum ArgExpr {
    Node(BoundNode),
    Nested(NestedFn),
}

impl fmt::Debug for ArgExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgExpr::Node(node) => f.debug_tuple("Node").field(node).finish(),
            ArgExpr::Nested(_) => f.write_str("Nested(..)"),
        }
    }
}

/// One argument as written at the call site.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub expr: ArgExpr,
    pub name: Option<DName>,
    /// The name was derived from the expression rather than written.
    pub implicit: bool,
    pub dir: Directive,
    pub location: Option<SourceLocation>,
}

impl ArgSpec {
    pub fn node(node: BoundNode) -> Self {
        Self::from_expr(ArgExpr::Node(node))
    }

    pub fn nested(f: impl Fn(&mut Binder, &ScopeView<'_>) -> BoundNode + Send + Sync + 'static) -> Self {
        Self::from_expr(ArgExpr::Nested(Arc::new(f)))
    }

    fn from_expr(expr: ArgExpr) -> Self {
        Self {
            expr,
            name: None,
            implicit: false,
            dir: Directive::None,
            location: None,
        }
    }

    pub fn named(mut self, name: impl Into<DName>) -> Self {
        self.name = Some(name.into());
        self.implicit = false;
        self
    }

    pub fn implicitly_named(mut self, name: impl Into<DName>) -> Self {
        self.name = Some(name.into());
        self.implicit = true;
        self
    }

    pub fn with_dir(mut self, dir: Directive) -> Self {
        self.dir = dir;
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

// ---------------------------------------------------------------------------
// Scope view
// ---------------------------------------------------------------------------

struct Visible<'a> {
    up_count: usize,
    scope: &'a ArgScope,
    name: Option<&'a DName>,
}

/// Scopes a nested argument may refer to.
pub struct ScopeView<'a> {
    visible: Vec<Visible<'a>>,
}

impl ScopeView<'_> {
    fn empty() -> Self {
        Self {
            visible: Vec::new(),
        }
    }

    fn find(&self, up_count: usize) -> Option<&Visible<'_>> {
        self.visible.iter().find(|v| v.up_count == up_count)
    }

    /// The scope `up_count` levels out, if active.
    pub fn get(&self, up_count: usize) -> Option<BoundNode> {
        self.find(up_count).map(|v| BoundNode::scope_ref(v.scope))
    }

    /// The index scope of the scope `up_count` levels out.
    pub fn index(&self, up_count: usize) -> Option<BoundNode> {
        self.find(up_count)
            .and_then(|v| v.scope.index)
            .map(BoundNode::index_ref)
    }

    /// The innermost active scope whose slot was given `name`.
    pub fn named(&self, name: &str) -> Option<BoundNode> {
        self.visible
            .iter()
            .find(|v| v.name.is_some_and(|n| n.as_str() == name))
            .map(|v| BoundNode::scope_ref(v.scope))
    }

    pub fn scope(&self, up_count: usize) -> Option<&ArgScope> {
        self.find(up_count).map(|v| v.scope)
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Binder {
    config: EngineConfig,
    trace: Trace,
}

struct BoundArgs {
    args: Vec<BoundNode>,
    scopes: Vec<ArgScope>,
}

impl Binder {
    pub fn new(config: EngineConfig) -> Self {
        let trace = Trace::new(config.trace);
        Self { config, trace }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn trace_mut(&mut self) -> &mut Trace {
        &mut self.trace
    }

    /// Bind a call written in source.
    pub fn bind_call(
        &mut self,
        oper: &Arc<dyn RexlOper>,
        args: Vec<ArgSpec>,
        location: Option<SourceLocation>,
    ) -> Result<BoundNode, DiagnosticError> {
        self.bind(oper, &args, location, false)
    }

    /// Bind a call manufactured by the engine.
    ///
    /// Panics if the call does not bind cleanly on the first attempt: a
    /// synthetic call that needs diagnostics or a rebind is a bug in the
    /// code that built it.
    pub fn synthesize_call(&mut self, oper: &Arc<dyn RexlOper>, args: Vec<ArgSpec>) -> BoundNode {
        match self.bind(oper, &args, None, true) {
            Ok(node) => node,
            Err(err) => panic!("synthetic call to {} failed to bind: {err}", oper.name()),
        }
    }

    fn bind(
        &mut self,
        oper: &Arc<dyn RexlOper>,
        args: &[ArgSpec],
        location: Option<SourceLocation>,
        synthetic: bool,
    ) -> Result<BoundNode, DiagnosticError> {
        let arity = args.len();
        if arity < oper.arity_min() || arity > oper.arity_max() {
            return Err(DiagnosticError::single(
                Diagnostic::error(
                    Category::ArityMismatch,
                    format!(
                        "{} takes {} arguments, got {arity}",
                        oper.name(),
                        arity_text(oper.arity_min(), oper.arity_max())
                    ),
                )
                .at(location),
            ));
        }

        let names: Vec<Option<DName>> = args.iter().map(|a| a.name.clone()).collect();
        let implicit: SlotSet = args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.implicit && a.name.is_some())
            .map(|(slot, _)| slot)
            .collect();
        let dirs: Vec<Directive> = args.iter().map(|a| a.dir).collect();
        let locations: Vec<Option<SourceLocation>> = args.iter().map(|a| a.location).collect();

        let mut traits = oper.arg_traits(arity, &names, &implicit, &dirs);
        let mut rebinds = 0;
        loop {
            if self.config.audit.enabled()
                && let Err(err) = audit(&traits)
            {
                panic!("{} derived inconsistent traits: {err}", oper.name());
            }

            let mut diags = Vec::new();
            let (names, implicit) =
                check_names(oper.as_ref(), &traits, &names, &implicit, &dirs, &locations, &mut diags);
            let bound = self.bind_args(&traits, args, &names, &mut diags);

            let info = InvocationInfo::new(
                &traits,
                &bound.args,
                &bound.scopes,
                &names,
                &implicit,
                &dirs,
            );
            let info = if synthetic {
                info
            } else {
                info.at(location, &locations)
            };
            let spec = oper.specialize_types(&info, &mut diags);

            if let Some(next) = spec.traits_change.filter(|next| !next.are_equivalent(&traits)) {
                assert!(
                    !synthetic,
                    "synthetic call to {} requested a rebind",
                    oper.name()
                );
                assert!(
                    rebinds < oper.max_rebinds(),
                    "{} requested more than {} rebinds",
                    oper.name(),
                    oper.max_rebinds()
                );
                rebinds += 1;
                debug!(
                    oper = %oper.name(),
                    attempt = rebinds,
                    from = traits.owner_key(),
                    to = next.owner_key(),
                    "rebinding call"
                );
                self.trace.record(|| {
                    TraceEvent::Rebind(RebindStep {
                        oper: oper.name().to_string(),
                        attempt: rebinds,
                        from: summary(&traits),
                        to: summary(&next),
                    })
                });
                traits = next;
                continue;
            }

            assert_eq!(
                spec.args.len(),
                arity,
                "{} specialized the wrong number of arguments",
                oper.name()
            );
            if diags.iter().any(Diagnostic::is_error) {
                return Err(DiagnosticError::multiple(diags));
            }

            let mut converted = Vec::with_capacity(arity);
            for (slot, (arg, target)) in bound.args.into_iter().zip(spec.args).enumerate() {
                if target.accepts(&arg.ty, spec.union) {
                    converted.push(arg.convert(target));
                } else {
                    diags.push(
                        Diagnostic::error(
                            Category::TypeMismatch,
                            format!(
                                "argument {} of {} has type {}, expected {target}",
                                slot + 1,
                                oper.name(),
                                arg.ty
                            ),
                        )
                        .at(locations[slot].or(location))
                        .for_slot(slot),
                    );
                    converted.push(arg);
                }
            }
            if diags.iter().any(Diagnostic::is_error) {
                return Err(DiagnosticError::multiple(diags));
            }

            let call = CallNode {
                oper: Arc::clone(oper),
                traits,
                args: converted,
                scopes: bound.scopes,
                names,
                implicit_names: implicit,
                dirs,
            };
            let cert = oper.certify(&call);
            assert!(cert.ok, "{} produced a call that fails certification", oper.name());
            trace!(oper = %oper.name(), result = %spec.result, full = cert.full, "bound call");
            return Ok(BoundNode::call(call, spec.result));
        }
    }

    fn bind_args(
        &mut self,
        traits: &ArgTraits,
        args: &[ArgSpec],
        names: &[Option<DName>],
        diags: &mut Vec<Diagnostic>,
    ) -> BoundArgs {
        let mut bound = Vec::with_capacity(args.len());
        let mut scopes = Vec::with_capacity(traits.scope_count());
        // Pushed scopes, outermost first, with the slot that introduced them.
        let mut stack: Vec<(usize, ArgScope)> = Vec::new();
        let mut index_ids: HashMap<usize, ScopeId> = HashMap::new();

        for (slot, spec) in args.iter().enumerate() {
            let node = match &spec.expr {
                ArgExpr::Node(node) => node.clone(),
                ArgExpr::Nested(f) if traits.is_nested(slot) => {
                    let view = ScopeView {
                        visible: stack
                            .iter()
                            .rev()
                            .enumerate()
                            .filter(|&(up, _)| traits.is_scope_active(slot, up))
                            .map(|(up_count, (scope_slot, scope))| Visible {
                                up_count,
                                scope,
                                name: names[*scope_slot].as_ref(),
                            })
                            .collect(),
                    };
                    f(self, &view)
                }
                ArgExpr::Nested(f) => f(self, &ScopeView::empty()),
            };

            if traits.is_nested_tail(slot) {
                stack.clear();
            }

            let kind = traits.scope_kind(slot);
            if traits.is_scope(slot) {
                let ty = ArgScope::value_type(kind, &node.ty).unwrap_or_else(|| {
                    diags.push(
                        Diagnostic::error(
                            Category::BadScopeSource,
                            format!(
                                "argument {} cannot introduce a {} scope from type {}",
                                slot + 1,
                                kind.as_str(),
                                node.ty
                            ),
                        )
                        .at(spec.location)
                        .for_slot(slot),
                    );
                    DType::General
                });
                let mut scope = ArgScope::new(kind, ty);
                if let Some(index) = traits.scope_index(slot) {
                    let id = if index.first {
                        *index_ids.entry(index.iidx).or_insert_with(ScopeId::fresh)
                    } else {
                        index_ids
                            .get(&index.iidx)
                            .copied()
                            .unwrap_or_else(|| panic!("index {} used before it was introduced", index.iidx))
                    };
                    scope = scope.with_index(id);
                }
                scopes.push(scope.clone());
                stack.push((slot, scope));
            }
            bound.push(node);
        }

        BoundArgs {
            args: bound,
            scopes,
        }
    }
}

/// Name and directive legality against the current traits. Implicit names
/// on slots that do not take them are dropped.
fn check_names(
    oper: &dyn RexlOper,
    traits: &ArgTraits,
    names: &[Option<DName>],
    implicit: &SlotSet,
    dirs: &[Directive],
    locations: &[Option<SourceLocation>],
    diags: &mut Vec<Diagnostic>,
) -> (Vec<Option<DName>>, SlotSet) {
    let mut names = names.to_vec();
    let mut implicit = implicit.clone();
    for slot in 0..names.len() {
        if implicit.contains(slot) && !traits.supports_implicit_name(slot) {
            names[slot] = None;
            implicit.remove(slot);
        }
        if let Some(name) = &names[slot]
            && !traits.supports_name(slot)
        {
            diags.push(
                Diagnostic::error(
                    Category::NameNotAllowed,
                    format!("argument {} of {} cannot be named `{name}`", slot + 1, oper.name()),
                )
                .at(locations[slot])
                .for_slot(slot),
            );
        }
        if names[slot].is_none() && traits.requires_name(slot) {
            diags.push(
                Diagnostic::error(
                    Category::MissingRequired,
                    format!("argument {} of {} must be named", slot + 1, oper.name()),
                )
                .at(locations[slot])
                .for_slot(slot),
            );
        }
        if !oper.supports_directive(traits, slot, dirs[slot]) {
            diags.push(
                Diagnostic::error(
                    Category::UnsupportedDirective,
                    format!(
                        "directive {} is not supported on argument {} of {}",
                        dirs[slot],
                        slot + 1,
                        oper.name()
                    ),
                )
                .at(locations[slot])
                .for_slot(slot),
            );
        }
    }
    (names, implicit)
}

fn summary(traits: &ArgTraits) -> TraitsSummary {
    TraitsSummary {
        shape: traits.shape().variant_name(),
        owner_key: traits.owner_key(),
    }
}

fn arity_text(min: usize, max: usize) -> String {
    if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    }
}
