//! Executors: the canonical calls a multi-form call reduces to.

use std::sync::Arc;

use rexl_diag::{Category, Diagnostic, DiagnosticSink};
use rexl_types::{DName, DType};

use super::Cookie;
use super::form::InvocationForm;
use super::merge::MergeInfo;
use crate::arg_traits::ArgTraits;
use crate::directive::Directive;
use crate::invocation::InvocationInfo;
use crate::oper::{OperId, RexlOper, Specialization};
use crate::scope::ScopeKind;
use crate::slot_set::SlotSet;

/// Cache key for executors of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecKey {
    pub form: usize,
    /// Executor argument types, the bound source first for merging forms.
    pub inputs: Vec<DType>,
    /// Source sequence type, for merging forms.
    pub source: Option<DType>,
}

/// A single-shape operation that takes a form's prepared inputs and
/// produces its result. Code generation consumes these directly.
///
/// A merging executor is called as `H(x: src, ForEach(..x..), x, ..)`: slot 0
/// is a `With` scope over the source and the rest are nested under it.
#[derive(Debug)]
pub struct ExecutionOper<C> {
    id: OperId,
    name: DName,
    form: Arc<InvocationForm<C>>,
    inputs: Vec<DType>,
    result: DType,
    merge: Option<MergeInfo>,
    is_proc: bool,
}

impl<C: Cookie> ExecutionOper<C> {
    pub(crate) fn new(
        parent: &DName,
        form: Arc<InvocationForm<C>>,
        inputs: Vec<DType>,
        result: DType,
        merge: Option<MergeInfo>,
        is_proc: bool,
    ) -> Self {
        Self {
            id: OperId::fresh(),
            name: DName::new(format!("{parent}.{}", form.name())),
            form,
            inputs,
            result,
            merge,
            is_proc,
        }
    }

    pub fn form(&self) -> &InvocationForm<C> {
        &self.form
    }

    pub fn cookie(&self) -> &C {
        self.form.cookie()
    }

    pub fn inputs(&self) -> &[DType] {
        &self.inputs
    }

    pub fn result(&self) -> &DType {
        &self.result
    }

    pub fn merge(&self) -> Option<&MergeInfo> {
        self.merge.as_ref()
    }
}

impl<C: Cookie> RexlOper for ExecutionOper<C> {
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
        self.inputs.len()
    }

    fn arity_max(&self) -> usize {
        self.inputs.len()
    }

    fn arg_traits(
        &self,
        arity: usize,
        _names: &[Option<DName>],
        _implicit_names: &SlotSet,
        _dirs: &[Directive],
    ) -> Arc<ArgTraits> {
        // Merging executors bind the source once and read it from the
        // mapped selectors and the merge input alike.
        if self.merge.is_some() && arity >= 2 {
            Arc::new(ArgTraits::with(self.id, arity, ScopeKind::With, 1))
        } else {
            Arc::new(ArgTraits::simple(self.id, arity, true))
        }
    }

    fn specialize_types(
        &self,
        info: &InvocationInfo<'_>,
        sink: &mut dyn DiagnosticSink,
    ) -> Specialization {
        for (slot, ty) in self.inputs.iter().enumerate() {
            if !ty.accepts(info.arg_type(slot), true) {
                sink.post(
                    Diagnostic::error(
                        Category::TypeMismatch,
                        format!(
                            "{} expects {ty} for input {}, got {}",
                            self.name,
                            slot + 1,
                            info.arg_type(slot)
                        ),
                    )
                    .at(info.location(slot))
                    .for_slot(slot),
                );
            }
        }
        Specialization {
            result: self.result.clone(),
            args: self.inputs.clone(),
            union: true,
            traits_change: None,
        }
    }
}
