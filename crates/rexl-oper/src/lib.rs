//! Operation signatures and invocation rewriting for Rexl.
//!
//! This crate implements:
//! - [`ArgTraits`]: the structural description of an operation's slots
//!   (scopes, nesting, lifting, naming), with O(1) queries
//! - [`audit`]: the consistency checker every derived traits value passes
//! - [`RexlOper`]: the contract operations implement for binding,
//!   specialization, certification and reduction
//! - [`Binder`] and [`StandardReducer`]: the driver that binds calls
//!   (including the rebind loop) and normalizes bound trees
//! - [`MultiFormOper`]: operations with several call shapes, rewritten into
//!   cached [`ExecutionOper`] calls
//!
//! Parsing and code generation live elsewhere; bound trees enter through
//! [`Binder::bind_call`] with their argument types already known.

pub mod arg_traits;
pub mod audit;
pub mod bind;
pub mod bound;
pub mod config;
pub mod core_opers;
pub mod directive;
pub mod invocation;
pub mod multiform;
pub mod oper;
pub mod reduce;
pub mod scope;
pub mod slot_set;
pub mod trace;

#[cfg(test)]
mod prop_tests;

// Re-export for convenience.
pub use arg_traits::{ArgShape, ArgTraits, GeneralShape, LiftMasks, NameMasks, TraitsError};
pub use audit::{AuditError, audit};
pub use bind::{ArgSpec, Binder, ScopeView};
pub use bound::{BoundKind, BoundNode, CallNode, Literal, render};
pub use config::{AuditPolicy, ConfigError, EngineConfig};
pub use directive::Directive;
pub use invocation::InvocationInfo;
pub use multiform::{
    ExecKey, ExecutionOper, FormField, FormOutput, InvocationForm, MergeInfo, MultiFormOper,
    SlotDefault,
};
pub use oper::{Certification, OperId, RexlOper, Specialization};
pub use reduce::{Reducer, StandardReducer};
pub use rexl_diag::{Category, Diagnostic, DiagnosticError, SourceLocation};
pub use scope::{ArgScope, ScopeId, ScopeKind};
pub use slot_set::SlotSet;
pub use trace::{Trace, TraceEvent};
