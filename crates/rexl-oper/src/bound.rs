//! Bound call trees.
//!
//! A [`BoundNode`] is a typed expression after binding. Calls carry the
//! traits they were bound with and the scopes their scope slots introduced,
//! so certification and reduction can re-check them without the parse tree.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use rexl_types::{DName, DType, RecordType};

use crate::arg_traits::ArgTraits;
use crate::directive::Directive;
use crate::oper::RexlOper;
use crate::scope::{ArgScope, ScopeId};
use crate::slot_set::SlotSet;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    pub fn ty(&self) -> DType {
        match self {
            Literal::Null => DType::Vac,
            Literal::Bool(_) => DType::Bool,
            Literal::Int(_) => DType::I64,
            Literal::Float(_) => DType::F64,
            Literal::Text(_) => DType::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundNode {
    pub kind: BoundKind,
    pub ty: DType,
}

#[derive(Debug, Clone)]
pub enum BoundKind {
    Const(Literal),
    Global(DName),
    ScopeRef(ScopeId),
    Record(Vec<(DName, BoundNode)>),
    GetField { record: Box<BoundNode>, field: DName },
    /// Conversion of the operand to the node's type.
    Convert(Box<BoundNode>),
    Call(CallNode),
}

#[derive(Debug, Clone)]
pub struct CallNode {
    pub oper: Arc<dyn RexlOper>,
    pub traits: Arc<ArgTraits>,
    pub args: Vec<BoundNode>,
    /// One scope per scope slot, in slot order.
    pub scopes: Vec<ArgScope>,
    pub names: Vec<Option<DName>>,
    pub implicit_names: SlotSet,
    pub dirs: Vec<Directive>,
}

impl CallNode {
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Scope introduced by `slot`, if it is a scope slot.
    pub fn scope_for(&self, slot: usize) -> Option<&ArgScope> {
        if !self.traits.is_scope(slot) {
            return None;
        }
        let ordinal = self.traits.scope_slots().take_while(|&s| s < slot).count();
        self.scopes.get(ordinal)
    }
}

impl BoundNode {
    pub fn constant(lit: Literal) -> Self {
        let ty = lit.ty();
        Self {
            kind: BoundKind::Const(lit),
            ty,
        }
    }

    pub fn global(name: impl Into<DName>, ty: DType) -> Self {
        Self {
            kind: BoundKind::Global(name.into()),
            ty,
        }
    }

    pub fn scope_ref(scope: &ArgScope) -> Self {
        Self {
            kind: BoundKind::ScopeRef(scope.id),
            ty: scope.ty.clone(),
        }
    }

    /// Reference to an index scope.
    pub fn index_ref(id: ScopeId) -> Self {
        Self {
            kind: BoundKind::ScopeRef(id),
            ty: DType::I64,
        }
    }

    pub fn record(fields: Vec<(DName, BoundNode)>) -> Self {
        let ty = DType::Record(RecordType::closed(
            fields
                .iter()
                .map(|(name, node)| (name.clone(), node.ty.clone()))
                .collect(),
        ));
        Self {
            kind: BoundKind::Record(fields),
            ty,
        }
    }

    /// Field access. Panics if `record` has no such field.
    pub fn get_field(record: BoundNode, field: impl Into<DName>) -> Self {
        let field = field.into();
        let ty = record
            .ty
            .as_record()
            .and_then(|rt| rt.get(&field))
            .cloned()
            .unwrap_or_else(|| panic!("type {} has no field {field}", record.ty));
        Self {
            kind: BoundKind::GetField {
                record: Box::new(record),
                field,
            },
            ty,
        }
    }

    pub fn convert(self, ty: DType) -> Self {
        if self.ty == ty {
            return self;
        }
        Self {
            kind: BoundKind::Convert(Box::new(self)),
            ty,
        }
    }

    pub fn call(call: CallNode, ty: DType) -> Self {
        Self {
            kind: BoundKind::Call(call),
            ty,
        }
    }

    pub fn as_call(&self) -> Option<&CallNode> {
        match &self.kind {
            BoundKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Replace references to the scopes in `map`.
    pub fn substitute(&self, map: &HashMap<ScopeId, BoundNode>) -> BoundNode {
        if map.is_empty() {
            return self.clone();
        }
        let kind = match &self.kind {
            BoundKind::ScopeRef(id) => match map.get(id) {
                Some(node) => return node.clone(),
                None => BoundKind::ScopeRef(*id),
            },
            BoundKind::Const(_) | BoundKind::Global(_) => return self.clone(),
            BoundKind::Record(fields) => BoundKind::Record(
                fields
                    .iter()
                    .map(|(name, node)| (name.clone(), node.substitute(map)))
                    .collect(),
            ),
            BoundKind::GetField { record, field } => BoundKind::GetField {
                record: Box::new(record.substitute(map)),
                field: field.clone(),
            },
            BoundKind::Convert(inner) => BoundKind::Convert(Box::new(inner.substitute(map))),
            BoundKind::Call(call) => BoundKind::Call(CallNode {
                args: call.args.iter().map(|arg| arg.substitute(map)).collect(),
                ..call.clone()
            }),
        };
        BoundNode {
            kind,
            ty: self.ty.clone(),
        }
    }

    /// Number of call nodes in the tree.
    pub fn call_count(&self) -> usize {
        match &self.kind {
            BoundKind::Const(_) | BoundKind::Global(_) | BoundKind::ScopeRef(_) => 0,
            BoundKind::Record(fields) => fields.iter().map(|(_, n)| n.call_count()).sum(),
            BoundKind::GetField { record, .. } => record.call_count(),
            BoundKind::Convert(inner) => inner.call_count(),
            BoundKind::Call(call) => 1 + call.args.iter().map(BoundNode::call_count).sum::<usize>(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a tree with scopes renumbered `s0`, `s1`, .. in first-seen order,
/// so output does not depend on global scope ids.
pub fn render(node: &BoundNode) -> String {
    let mut r = Renderer::default();
    r.node(node);
    r.out
}

impl fmt::Display for BoundNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}

#[derive(Default)]
struct Renderer {
    out: String,
    scopes: HashMap<ScopeId, usize>,
}

impl Renderer {
    fn scope(&mut self, id: ScopeId) {
        let next = self.scopes.len();
        let n = *self.scopes.entry(id).or_insert(next);
        let _ = write!(self.out, "s{n}");
    }

    fn node(&mut self, node: &BoundNode) {
        match &node.kind {
            BoundKind::Const(lit) => {
                let _ = match lit {
                    Literal::Null => write!(self.out, "null"),
                    Literal::Bool(b) => write!(self.out, "{b}"),
                    Literal::Int(i) => write!(self.out, "{i}"),
                    Literal::Float(x) => write!(self.out, "{x:?}"),
                    Literal::Text(s) => write!(self.out, "{s:?}"),
                };
            }
            BoundKind::Global(name) => self.out.push_str(name.as_str()),
            BoundKind::ScopeRef(id) => self.scope(*id),
            BoundKind::Record(fields) => {
                self.out.push('{');
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    let _ = write!(self.out, "{name}: ");
                    self.node(value);
                }
                self.out.push('}');
            }
            BoundKind::GetField { record, field } => {
                self.node(record);
                let _ = write!(self.out, ".{field}");
            }
            BoundKind::Convert(inner) => {
                self.out.push_str("Convert(");
                self.node(inner);
                let _ = write!(self.out, " as {})", node.ty);
            }
            BoundKind::Call(call) => self.call(call),
        }
    }

    fn call(&mut self, call: &CallNode) {
        let _ = write!(self.out, "{}(", call.oper.name());
        for (slot, arg) in call.args.iter().enumerate() {
            if slot > 0 {
                self.out.push_str(", ");
            }
            let dir = call.dirs.get(slot).copied().unwrap_or_default();
            if !dir.is_none() {
                let _ = write!(self.out, "{dir} ");
            }
            if let Some(scope) = call.scope_for(slot) {
                self.scope(scope.id);
                if let Some(index) = scope.index {
                    self.out.push('@');
                    self.scope(index);
                }
                self.out.push_str(": ");
            } else if let Some(name) = call.names.get(slot).and_then(Option::as_ref) {
                let _ = write!(self.out, "{name}: ");
            }
            self.node(arg);
        }
        self.out.push(')');
    }
}
