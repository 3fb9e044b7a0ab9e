//! Bottom-up reduction of bound trees.

use std::sync::Arc;

use tracing::debug;

use crate::bind::{ArgSpec, Binder};
use crate::bound::{BoundKind, BoundNode, CallNode, render};
use crate::config::EngineConfig;
use crate::oper::RexlOper;
use crate::trace::{ReduceStep, Trace, TraceEvent};

/// What an operation's [`RexlOper::reduce`] may ask of its caller.
pub trait Reducer {
    /// Normalize a tree that has already been bound.
    fn reduce(&mut self, node: BoundNode) -> BoundNode;

    /// Build a call that is known to bind cleanly.
    fn synthesize(&mut self, oper: &Arc<dyn RexlOper>, args: Vec<ArgSpec>) -> BoundNode;
}

/// Reduces children first, then rewrites each call until its operation
/// leaves it alone. Every rewrite is checked to preserve the node's type.
#[derive(Debug, Default)]
pub struct StandardReducer {
    binder: Binder,
    depth: usize,
}

impl StandardReducer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            binder: Binder::new(config),
            depth: 0,
        }
    }

    pub fn trace(&self) -> &Trace {
        self.binder.trace()
    }

    pub fn into_binder(self) -> Binder {
        self.binder
    }

    fn reduce_children(&mut self, node: BoundNode) -> BoundNode {
        let BoundNode { kind, ty } = node;
        let kind = match kind {
            BoundKind::Record(fields) => BoundKind::Record(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, self.reduce(value)))
                    .collect(),
            ),
            BoundKind::GetField { record, field } => BoundKind::GetField {
                record: Box::new(self.reduce(*record)),
                field,
            },
            BoundKind::Convert(inner) => BoundKind::Convert(Box::new(self.reduce(*inner))),
            BoundKind::Call(call) => BoundKind::Call(CallNode {
                args: call.args.into_iter().map(|arg| self.reduce(arg)).collect(),
                ..call
            }),
            leaf @ (BoundKind::Const(_) | BoundKind::Global(_) | BoundKind::ScopeRef(_)) => leaf,
        };
        BoundNode { kind, ty }
    }

    /// Reduce the output of a rewrite one level deeper.
    fn reduce_rewrite(&mut self, node: BoundNode) -> BoundNode {
        let max_depth = self.binder.config().max_reduce_depth;
        assert!(
            self.depth < max_depth,
            "rewrites nested deeper than {max_depth} levels"
        );
        self.depth += 1;
        let node = self.reduce(node);
        self.depth -= 1;
        node
    }
}

/// A procedure call, possibly under scope-binding wrappers whose body is
/// their last, nested argument.
fn is_proc_call(node: &BoundNode) -> bool {
    let Some(call) = node.as_call() else {
        return false;
    };
    if call.oper.is_proc() {
        return true;
    }
    let last = call.arity().saturating_sub(1);
    call.arity() > 0 && call.traits.is_nested(last) && is_proc_call(&call.args[last])
}

impl Reducer for StandardReducer {
    fn reduce(&mut self, node: BoundNode) -> BoundNode {
        let mut node = self.reduce_children(node);

        while let BoundKind::Call(call) = &node.kind {
            let oper = Arc::clone(&call.oper);
            let cert = oper.certify(call);
            assert!(cert.ok, "reducing a call to {} that fails certification", oper.name());
            let Some(rewritten) = oper.reduce(self, call) else {
                break;
            };
            assert_eq!(
                rewritten.ty,
                node.ty,
                "reducing {} changed its type",
                oper.name()
            );
            if oper.is_proc() {
                assert!(
                    is_proc_call(&rewritten),
                    "procedure {} reduced to something other than a procedure call",
                    oper.name()
                );
            }
            debug!(oper = %oper.name(), depth = self.depth, "reduced call");
            let depth = self.depth;
            self.binder.trace_mut().record(|| {
                TraceEvent::Reduce(ReduceStep {
                    oper: oper.name().to_string(),
                    depth,
                    before: render(&node),
                    after: render(&rewritten),
                    ty: node.ty.to_string(),
                })
            });
            node = self.reduce_rewrite(rewritten);
        }
        node
    }

    fn synthesize(&mut self, oper: &Arc<dyn RexlOper>, args: Vec<ArgSpec>) -> BoundNode {
        self.binder.synthesize_call(oper, args)
    }
}
