//! Type representations for the Rexl operation engine.
//!
//! The engine only needs a narrow view of the language's type system:
//! primitive scalars, the three container wrappers an operation may lift
//! over (sequence, tensor, optional), and closed records whose fields can be
//! merged by name. The full nominal/structural lattice lives elsewhere; this
//! crate defines the shapes the engine reasons about and the acceptance
//! relation used when converting arguments.

use std::fmt;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// A field or parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DName(pub String);

impl DName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// This name with a numeric suffix appended, e.g. `Key` -> `Key2`.
    pub fn with_suffix(&self, suffix: u32) -> Self {
        Self(format!("{}{suffix}", self.0))
    }

    /// Whether `s` is usable as a bare identifier.
    pub fn is_valid_ident(s: &str) -> bool {
        let mut chars = s.chars();
        match chars.next() {
            Some(ch) if ch == '_' || ch.is_alphabetic() => {}
            _ => return false,
        }
        chars.all(|ch| ch == '_' || ch.is_alphanumeric())
    }
}

impl fmt::Display for DName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A closed record type. Fields are kept sorted by name so that two records
/// with the same fields compare and hash equal regardless of build order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub fields: Vec<(DName, DType)>,
}

impl RecordType {
    /// Create a record from `fields`. Sorts by name.
    ///
    /// Panics if a name occurs twice; callers resolve collisions first.
    pub fn closed(mut fields: Vec<(DName, DType)>) -> Self {
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        assert!(
            fields.windows(2).all(|pair| pair[0].0 != pair[1].0),
            "duplicate field name in record type"
        );
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn get(&self, name: &DName) -> Option<&DType> {
        self.fields
            .binary_search_by(|(n, _)| n.cmp(name))
            .ok()
            .map(|idx| &self.fields[idx].1)
    }

    pub fn has(&self, name: &DName) -> bool {
        self.fields.binary_search_by(|(n, _)| n.cmp(name)).is_ok()
    }

    pub fn names(&self) -> impl Iterator<Item = &DName> {
        self.fields.iter().map(|(n, _)| n)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A semantic type as seen by operation signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    /// Type of the `null` literal. Accepted by every nullable type.
    Vac,
    /// Top type: accepts any value.
    General,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    /// Optional wrapper around a non-nullable type.
    Opt(Box<DType>),
    /// Sequence. Sequences are nullable; the null sequence behaves as empty.
    Seq(Box<DType>),
    /// Tensor of the given rank.
    Ten { item: Box<DType>, rank: u8 },
    Record(RecordType),
}

impl DType {
    pub fn seq(item: DType) -> Self {
        DType::Seq(Box::new(item))
    }

    pub fn ten(item: DType, rank: u8) -> Self {
        DType::Ten {
            item: Box::new(item),
            rank,
        }
    }

    /// The optional form of this type. Already-nullable types are returned as-is.
    pub fn opt(self) -> Self {
        if self.is_nullable() {
            self
        } else {
            DType::Opt(Box::new(self))
        }
    }

    pub fn record(fields: Vec<(DName, DType)>) -> Self {
        DType::Record(RecordType::closed(fields))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, DType::Vac | DType::General | DType::Opt(_) | DType::Seq(_))
    }

    pub fn is_opt(&self) -> bool {
        matches!(self, DType::Opt(_))
    }

    pub fn is_seq(&self) -> bool {
        matches!(self, DType::Seq(_))
    }

    pub fn is_ten(&self) -> bool {
        matches!(self, DType::Ten { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// The non-null form of this type: strips an `Opt` wrapper.
    ///
    /// Sequences stay as they are; a non-null sequence has the same type.
    pub fn to_req(&self) -> DType {
        match self {
            DType::Opt(inner) => inner.as_ref().clone(),
            other => other.clone(),
        }
    }

    /// Item type of a sequence.
    pub fn seq_item(&self) -> Option<&DType> {
        match self {
            DType::Seq(item) => Some(item),
            _ => None,
        }
    }

    /// Item type of a tensor.
    pub fn ten_item(&self) -> Option<&DType> {
        match self {
            DType::Ten { item, .. } => Some(item),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            DType::Record(rt) => Some(rt),
            _ => None,
        }
    }

    fn numeric_rank(&self) -> Option<(NumClass, u8)> {
        match self {
            DType::I8 => Some((NumClass::Int, 1)),
            DType::I16 => Some((NumClass::Int, 2)),
            DType::I32 => Some((NumClass::Int, 3)),
            DType::I64 => Some((NumClass::Int, 4)),
            DType::F32 => Some((NumClass::Float, 3)),
            DType::F64 => Some((NumClass::Float, 5)),
            _ => None,
        }
    }

    /// Whether a value of type `src` converts to this type.
    ///
    /// `union` selects the record acceptance variant:
    /// - `true` (superset): every source field must exist here; fields only
    ///   present here must be nullable and are filled with null.
    /// - `false` (subset): every field here must exist in the source; extra
    ///   source fields are dropped.
    ///
    /// Numeric widening and null/optional injection apply in both variants.
    pub fn accepts(&self, src: &DType, union: bool) -> bool {
        if self == src {
            return true;
        }
        match (self, src) {
            (DType::General, _) => true,
            (_, DType::Vac) => self.is_nullable(),
            (DType::Opt(dst), DType::Opt(src)) => dst.accepts(src, union),
            (DType::Opt(dst), src) => dst.accepts(src, union),
            (DType::Seq(dst), DType::Seq(src)) => dst.accepts(src, union),
            (
                DType::Ten { item: dst, rank: rd },
                DType::Ten {
                    item: src,
                    rank: rs,
                },
            ) => rd == rs && dst.accepts(src, union),
            (DType::Record(dst), DType::Record(src)) => record_accepts(dst, src, union),
            (dst, src) => match (dst.numeric_rank(), src.numeric_rank()) {
                (Some(d), Some(s)) => numeric_widens(s, d),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumClass {
    Int,
    Float,
}

fn numeric_widens(src: (NumClass, u8), dst: (NumClass, u8)) -> bool {
    match (src.0, dst.0) {
        (NumClass::Int, NumClass::Int) | (NumClass::Float, NumClass::Float) => src.1 <= dst.1,
        // Int8/Int16 fit Float32 exactly; everything integral fits Float64.
        (NumClass::Int, NumClass::Float) => src.1 < dst.1,
        (NumClass::Float, NumClass::Int) => false,
    }
}

fn record_accepts(dst: &RecordType, src: &RecordType, union: bool) -> bool {
    if union {
        let src_ok = src
            .fields
            .iter()
            .all(|(name, ty)| dst.get(name).is_some_and(|d| d.accepts(ty, union)));
        src_ok
            && dst
                .fields
                .iter()
                .all(|(name, ty)| src.has(name) || ty.is_nullable())
    } else {
        dst.fields
            .iter()
            .all(|(name, ty)| src.get(name).is_some_and(|s| ty.accepts(s, union)))
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Vac => write!(f, "Null"),
            DType::General => write!(f, "General"),
            DType::Bool => write!(f, "Bool"),
            DType::I8 => write!(f, "Int8"),
            DType::I16 => write!(f, "Int16"),
            DType::I32 => write!(f, "Int32"),
            DType::I64 => write!(f, "Int64"),
            DType::F32 => write!(f, "Float32"),
            DType::F64 => write!(f, "Float64"),
            DType::Text => write!(f, "Text"),
            DType::Opt(inner) => write!(f, "{inner}?"),
            DType::Seq(item) => write!(f, "{item}*"),
            DType::Ten { item, rank } => write!(f, "Tensor({item}, {rank})"),
            DType::Record(rt) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in rt.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
