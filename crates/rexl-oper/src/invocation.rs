//! The view of a call handed to type specialization.
//!
//! A call is either being bound from source, in which case argument
//! locations are available for diagnostics, or synthetic: rebuilt from an
//! existing [`CallNode`] or manufactured by reduction.

use rexl_diag::SourceLocation;
use rexl_types::{DName, DType};

use crate::arg_traits::ArgTraits;
use crate::bound::{BoundNode, CallNode};
use crate::directive::Directive;
use crate::scope::ArgScope;
use crate::slot_set::SlotSet;

#[derive(Debug, Clone, Copy)]
enum Origin<'a> {
    Parsed {
        call: Option<SourceLocation>,
        args: &'a [Option<SourceLocation>],
    },
    Synthetic,
}

#[derive(Debug, Clone, Copy)]
pub struct InvocationInfo<'a> {
    traits: &'a ArgTraits,
    args: &'a [BoundNode],
    scopes: &'a [ArgScope],
    names: &'a [Option<DName>],
    implicit_names: &'a SlotSet,
    dirs: &'a [Directive],
    origin: Origin<'a>,
}

impl<'a> InvocationInfo<'a> {
    /// A synthetic invocation over already-bound parts.
    pub fn new(
        traits: &'a ArgTraits,
        args: &'a [BoundNode],
        scopes: &'a [ArgScope],
        names: &'a [Option<DName>],
        implicit_names: &'a SlotSet,
        dirs: &'a [Directive],
    ) -> Self {
        assert_eq!(args.len(), traits.slot_count(), "argument count mismatch");
        assert_eq!(names.len(), args.len(), "name count mismatch");
        assert_eq!(dirs.len(), args.len(), "directive count mismatch");
        Self {
            traits,
            args,
            scopes,
            names,
            implicit_names,
            dirs,
            origin: Origin::Synthetic,
        }
    }

    /// Re-specialize a built call.
    pub fn from_call(call: &'a CallNode) -> Self {
        Self::new(
            &call.traits,
            &call.args,
            &call.scopes,
            &call.names,
            &call.implicit_names,
            &call.dirs,
        )
    }

    /// Mark the invocation as parsed from source.
    pub fn at(mut self, call: Option<SourceLocation>, args: &'a [Option<SourceLocation>]) -> Self {
        self.origin = Origin::Parsed { call, args };
        self
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.origin, Origin::Synthetic)
    }

    pub fn traits(&self) -> &'a ArgTraits {
        self.traits
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn arg(&self, slot: usize) -> &'a BoundNode {
        &self.args[slot]
    }

    pub fn arg_type(&self, slot: usize) -> &'a DType {
        &self.args[slot].ty
    }

    pub fn arg_types(&self) -> impl Iterator<Item = &'a DType> + 'a {
        self.args.iter().map(|arg| &arg.ty)
    }

    pub fn name(&self, slot: usize) -> Option<&'a DName> {
        self.names[slot].as_ref()
    }

    /// The name written in source, ignoring implicit names.
    pub fn explicit_name(&self, slot: usize) -> Option<&'a DName> {
        self.name(slot).filter(|_| !self.implicit_names.contains(slot))
    }

    pub fn is_implicit_name(&self, slot: usize) -> bool {
        self.implicit_names.contains(slot)
    }

    pub fn dir(&self, slot: usize) -> Directive {
        self.dirs[slot]
    }

    pub fn scopes(&self) -> &'a [ArgScope] {
        self.scopes
    }

    pub fn call_location(&self) -> Option<SourceLocation> {
        match self.origin {
            Origin::Parsed { call, .. } => call,
            Origin::Synthetic => None,
        }
    }

    /// Location of the argument in `slot`, falling back to the call's.
    pub fn location(&self, slot: usize) -> Option<SourceLocation> {
        match self.origin {
            Origin::Parsed { call, args } => args.get(slot).copied().flatten().or(call),
            Origin::Synthetic => None,
        }
    }
}
