//! Operations with several call shapes.
//!
//! A [`MultiFormOper`] owns an ordered list of [`InvocationForm`]s. Trait
//! derivation picks the candidate forms a call can fit and hands the binder
//! the traits of the first; specialization type-checks the call against the
//! current candidate and asks for the next one when the types do not fit.
//! Reduction rewrites the call into an [`ExecutionOper`] call, mapping the
//! selectors over the source and merging when the form asks for it.

mod exec;
mod form;
mod merge;
mod rewrite;
mod select;

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use rexl_diag::{Category, Diagnostic, DiagnosticSink};
use rexl_types::{DName, DType};
use tracing::{debug, trace};

pub use exec::{ExecKey, ExecutionOper};
pub use form::{FormBuilder, FormError, FormField, FormOutput, FormSignature, InvocationForm, SlotDefault};
pub use merge::MergeInfo;
pub use select::{FormChoice, FormMatch, match_form, select};

use crate::arg_traits::{ArgTraits, GeneralShape, LiftMasks, NameMasks};
use crate::bound::{BoundNode, CallNode};
use crate::directive::Directive;
use crate::invocation::InvocationInfo;
use crate::oper::{Certification, OperId, RexlOper, Specialization};
use crate::reduce::Reducer;
use crate::scope::ScopeKind;
use crate::slot_set::SlotSet;

/// Payload a form carries for code generation.
pub trait Cookie: fmt::Debug + Send + Sync + 'static {}

impl<T: fmt::Debug + Send + Sync + 'static> Cookie for T {}

#[derive(Debug)]
pub struct MultiFormOper<C> {
    id: OperId,
    name: DName,
    is_proc: bool,
    forms: Vec<Arc<InvocationForm<C>>>,
    execs: DashMap<ExecKey, Arc<ExecutionOper<C>>>,
}

impl<C: Cookie> MultiFormOper<C> {
    pub fn new(name: impl Into<DName>, forms: Vec<InvocationForm<C>>) -> Self {
        assert!(!forms.is_empty(), "a multi-form operation needs a form");
        Self {
            id: OperId::fresh(),
            name: name.into(),
            is_proc: false,
            forms: forms.into_iter().map(Arc::new).collect(),
            execs: DashMap::new(),
        }
    }

    pub fn procedure(mut self) -> Self {
        self.is_proc = true;
        self
    }

    pub fn forms(&self) -> &[Arc<InvocationForm<C>>] {
        &self.forms
    }

    pub fn cached_execs(&self) -> usize {
        self.execs.len()
    }

    pub fn choose(
        &self,
        arity: usize,
        names: &[Option<DName>],
        implicit: &SlotSet,
        dirs: &[Directive],
    ) -> FormChoice {
        select(&self.forms, arity, names, implicit, dirs)
    }

    /// Traits for the current candidate of `choice`.
    fn candidate_traits(&self, choice: FormChoice) -> Arc<ArgTraits> {
        let m = choice.current();
        let form = &self.forms[m.form];
        let arity = m.slot_fields.len();
        let names = NameMasks {
            dotted: true,
            ..NameMasks::all(SlotSet::range(0, arity))
        };
        let traits = if form.has_mis() && arity > 0 {
            let shape = GeneralShape {
                scope: SlotSet::single(0),
                kinds: vec![ScopeKind::SeqItem],
                nested: m.selector_slots().collect(),
                names,
                indexed: SlotSet::single(0),
                ..GeneralShape::default()
            };
            ArgTraits::general(self.id, arity, shape)
                .unwrap_or_else(|err| panic!("{} built invalid form traits: {err}", self.name))
        } else {
            ArgTraits::named(self.id, arity, LiftMasks::none(), names, true)
        };
        Arc::new(traits.with_owner(m.form + 1, Arc::new(choice)))
    }

    fn choice<'a>(&self, traits: &'a ArgTraits) -> &'a FormChoice {
        traits
            .owner_data::<FormChoice>()
            .unwrap_or_else(|| panic!("{} traits carry no form choice", self.name))
    }

    /// Result type of `form` for a call whose source has type `source`.
    fn result_type(&self, form: &InvocationForm<C>, source: Option<&DType>) -> Option<DType> {
        match form.output() {
            FormOutput::Single(ty) => Some(ty.clone()),
            FormOutput::Seq { item, merge: false } => Some(DType::seq(item.clone())),
            FormOutput::Seq { merge: true, .. } => {
                self.merge_info(form, source?).map(|info| info.type_dst)
            }
        }
    }

    fn merge_info(&self, form: &InvocationForm<C>, source: &DType) -> Option<MergeInfo> {
        let FormOutput::Seq { item, merge: true } = form.output() else {
            return None;
        };
        let src = source.seq_item()?.as_record()?;
        let out = item.as_record()?;
        Some(MergeInfo::standard(src, out, form.dst_field()))
    }

    /// The executor for `key`, built on first request.
    ///
    /// Concurrent first requests may each build one; the first inserted is
    /// kept and returned to everyone.
    pub fn exec_oper(&self, key: ExecKey) -> Arc<ExecutionOper<C>> {
        if let Some(found) = self.execs.get(&key) {
            trace!(oper = %self.name, form = key.form, "executor cache hit");
            return Arc::clone(found.value());
        }
        let form = Arc::clone(&self.forms[key.form]);
        let merge = key
            .source
            .as_ref()
            .and_then(|source| self.merge_info(&form, source));
        let result = self
            .result_type(&form, key.source.as_ref())
            .unwrap_or_else(|| panic!("{} cannot type form {}", self.name, form.name()));
        let built = Arc::new(ExecutionOper::new(
            &self.name,
            form,
            key.inputs.clone(),
            result,
            merge,
            self.is_proc,
        ));
        let kept = Arc::clone(self.execs.entry(key).or_insert(built).value());
        debug!(oper = %self.name, cached = self.execs.len(), "executor cached");
        kept
    }

    /// Whether the source fits `form`. A source that is not a sequence has
    /// already been reported by the binder, which could not iterate it.
    fn check_source(
        &self,
        form: &InvocationForm<C>,
        info: &InvocationInfo<'_>,
        diags: &mut Vec<Diagnostic>,
    ) -> bool {
        if !form.has_mis() {
            return true;
        }
        match info.arg_type(0).seq_item() {
            None => false,
            Some(item) if form.has_merge() && item.as_record().is_none() => {
                diags.push(
                    Diagnostic::error(
                        Category::TypeMismatch,
                        format!(
                            "{} merges record items, but the source has {item} items",
                            form.name()
                        ),
                    )
                    .at(info.location(0))
                    .for_slot(0),
                );
                false
            }
            Some(_) => true,
        }
    }

    /// Field types the arguments convert to; mismatches go to `diags`.
    fn check_fields(
        &self,
        form: &InvocationForm<C>,
        m: &FormMatch,
        info: &InvocationInfo<'_>,
        union: bool,
        diags: &mut Vec<Diagnostic>,
    ) -> Vec<DType> {
        let mut args: Vec<DType> = info.arg_types().cloned().collect();
        for (slot, field) in m.slot_fields.iter().enumerate() {
            let Some(field) = field.map(|f| &form.fields()[f]) else {
                continue;
            };
            let actual = info.arg_type(slot);
            if field.ty.accepts(actual, union) {
                args[slot] = field.ty.clone();
            } else {
                diags.push(
                    Diagnostic::error(
                        Category::TypeMismatch,
                        format!("`{}` of {} must be {}, got {actual}", field.name, form.name(), field.ty),
                    )
                    .at(info.location(slot))
                    .for_slot(slot),
                );
            }
        }
        args
    }
}

impl<C: Cookie> RexlOper for MultiFormOper<C> {
    fn id(&self) -> OperId {
        self.id
    }

    fn name(&self) -> &DName {
        &self.name
    }

    fn is_proc(&self) -> bool {
        self.is_proc
    }

    fn arity_min(&self) -> usize {
        self.forms.iter().map(|f| f.arity_min()).min().unwrap_or(0)
    }

    fn arity_max(&self) -> usize {
        self.forms.iter().map(|f| f.arity_max()).max().unwrap_or(0)
    }

    fn arg_traits(
        &self,
        arity: usize,
        names: &[Option<DName>],
        implicit_names: &SlotSet,
        dirs: &[Directive],
    ) -> Arc<ArgTraits> {
        self.candidate_traits(self.choose(arity, names, implicit_names, dirs))
    }

    fn max_rebinds(&self) -> usize {
        self.forms.len()
    }

    fn specialize_types(
        &self,
        info: &InvocationInfo<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Specialization {
        let choice = self.choice(info.traits());
        let m = choice.current();
        let form = &self.forms[m.form];
        let union = form.has_mis();

        let mut diags = Vec::new();
        if choice.parse_error {
            select::explain(&self.name, form, info, &mut diags);
        }
        let source_ok = self.check_source(form, info, &mut diags);
        let args = self.check_fields(form, m, info, union, &mut diags);
        let source = form.has_mis().then(|| info.arg_type(0));
        let result = self.result_type(form, source);

        let failed = !source_ok || result.is_none() || diags.iter().any(Diagnostic::is_error);
        if failed && choice.has_next() {
            let next = choice.advanced();
            debug!(
                oper = %self.name,
                from = %form.name(),
                to = %self.forms[next.current().form].name(),
                "form does not fit; trying next"
            );
            return Specialization {
                result: DType::General,
                args,
                union,
                traits_change: Some(self.candidate_traits(next)),
            };
        }

        for diag in diags {
            sink.post(diag);
        }
        Specialization {
            result: result.unwrap_or(DType::General),
            args,
            union,
            traits_change: None,
        }
    }

    fn supports_directive(&self, traits: &ArgTraits, slot: usize, dir: Directive) -> bool {
        match dir {
            Directive::None => true,
            Directive::Top => {
                let m = self.choice(traits).current();
                self.forms[m.form].has_mis() && m.selector_slots().contains(&slot)
            }
            _ => false,
        }
    }

    fn accepts_traits(&self, call: &CallNode) -> bool {
        let Some(choice) = call.traits.owner_data::<FormChoice>() else {
            return false;
        };
        let fresh = self.choose(call.arity(), &call.names, &call.implicit_names, &call.dirs);
        !choice.parse_error
            && fresh.candidates == choice.candidates
            && choice.current < choice.candidates.len()
            && self
                .candidate_traits(choice.clone())
                .are_equivalent(&call.traits)
    }

    /// Multi-form calls are never code generation targets.
    fn certify_core(&self, _call: &CallNode) -> Certification {
        Certification::PARTIAL
    }

    fn reduce(&self, reducer: &mut dyn Reducer, call: &CallNode) -> Option<BoundNode> {
        let choice = self.choice(&call.traits);
        Some(rewrite::reduce(self, reducer, call, choice.current()))
    }
}
