//! Invocation forms: the call shapes a multi-form operation accepts.
//!
//! A form lists named fields. A form with a source takes a sequence first;
//! its leading selector fields are evaluated once per source item, so
//! `Sort(people, Age)` maps `Age` over `people` before the executor runs.
//! Fields after the selectors are plain values.

use std::fmt::{self, Write as _};
use std::sync::OnceLock;

use rexl_types::{DName, DType};

use crate::bound::{BoundNode, Literal};

/// Default for a field that may be omitted.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotDefault {
    Required,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SlotDefault {
    pub fn is_required(&self) -> bool {
        matches!(self, SlotDefault::Required)
    }

    fn literal(&self) -> Option<Literal> {
        Some(match self {
            SlotDefault::Required => return None,
            SlotDefault::Null => Literal::Null,
            SlotDefault::Bool(b) => Literal::Bool(*b),
            SlotDefault::Int(i) => Literal::Int(*i),
            SlotDefault::Float(x) => Literal::Float(*x),
            SlotDefault::Text(s) => Literal::Text(s.clone()),
        })
    }

    /// Constant node for the default, converted to `ty`.
    pub fn to_node(&self, ty: &DType) -> Option<BoundNode> {
        self.literal()
            .map(|lit| BoundNode::constant(lit).convert(ty.clone()))
    }

    fn fits(&self, ty: &DType) -> bool {
        self.literal().is_none_or(|lit| ty.accepts(&lit.ty(), true))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: DName,
    pub ty: DType,
    /// Evaluated per source item.
    pub selector: bool,
    pub default: SlotDefault,
}

impl FormField {
    pub fn new(name: impl Into<DName>, ty: DType) -> Self {
        Self {
            name: name.into(),
            ty,
            selector: false,
            default: SlotDefault::Required,
        }
    }

    pub fn selector(name: impl Into<DName>, ty: DType) -> Self {
        Self {
            selector: true,
            ..Self::new(name, ty)
        }
    }

    pub fn or(mut self, default: SlotDefault) -> Self {
        self.default = default;
        self
    }
}

/// What the executor of a form produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutput {
    Single(DType),
    /// A main output sequence. With `merge`, each output item is combined
    /// with its source item.
    Seq { item: DType, merge: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("form {0} has no fields")]
    NoFields(DName),
    #[error("form {form} declares field {field} twice")]
    DuplicateField { form: DName, field: DName },
    #[error("form {0} has selectors but no source")]
    SelectorWithoutSource(DName),
    #[error("form {0} has a source but no selector")]
    SourceWithoutSelector(DName),
    #[error("selector {field} of form {form} follows a plain field")]
    SelectorsNotLeading { form: DName, field: DName },
    #[error("form {0} merges without a source")]
    MergeWithoutSource(DName),
    #[error("form {0} merges output items that are not records")]
    MergeOutputNotRecord(DName),
    #[error("form {0} names a destination field without merging")]
    DstFieldWithoutMerge(DName),
    #[error("default of field {field} in form {form} does not fit its type")]
    BadDefault { form: DName, field: DName },
}

/// Printable summary of a form, built on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSignature {
    pub text: String,
    pub arity_min: usize,
    pub arity_max: usize,
}

impl fmt::Display for FormSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug)]
pub struct InvocationForm<C> {
    name: DName,
    cookie: C,
    source: bool,
    fields: Vec<FormField>,
    output: FormOutput,
    dst_field: Option<DName>,
    signature: OnceLock<FormSignature>,
}

pub struct FormBuilder<C> {
    name: DName,
    cookie: C,
    source: bool,
    fields: Vec<FormField>,
    output: FormOutput,
    dst_field: Option<DName>,
}

impl<C> FormBuilder<C> {
    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn output(mut self, output: FormOutput) -> Self {
        self.output = output;
        self
    }

    pub fn dst_field(mut self, name: impl Into<DName>) -> Self {
        self.dst_field = Some(name.into());
        self
    }

    pub fn build(self) -> Result<InvocationForm<C>, FormError> {
        let name = self.name.clone();
        if self.fields.is_empty() {
            return Err(FormError::NoFields(name));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(FormError::DuplicateField {
                    form: name,
                    field: field.name.clone(),
                });
            }
            if field.selector && i > 0 && !self.fields[i - 1].selector {
                return Err(FormError::SelectorsNotLeading {
                    form: name,
                    field: field.name.clone(),
                });
            }
            if !field.default.fits(&field.ty) {
                return Err(FormError::BadDefault {
                    form: name,
                    field: field.name.clone(),
                });
            }
        }
        let has_selectors = self.fields.iter().any(|f| f.selector);
        match (self.source, has_selectors) {
            (false, true) => return Err(FormError::SelectorWithoutSource(name)),
            (true, false) => return Err(FormError::SourceWithoutSelector(name)),
            _ => {}
        }
        match &self.output {
            FormOutput::Seq { merge: true, .. } if !self.source => {
                return Err(FormError::MergeWithoutSource(name));
            }
            FormOutput::Seq { item, merge: true } if item.as_record().is_none() => {
                return Err(FormError::MergeOutputNotRecord(name));
            }
            FormOutput::Single(_) | FormOutput::Seq { merge: false, .. }
                if self.dst_field.is_some() =>
            {
                return Err(FormError::DstFieldWithoutMerge(name));
            }
            _ => {}
        }
        Ok(InvocationForm {
            name: self.name,
            cookie: self.cookie,
            source: self.source,
            fields: self.fields,
            output: self.output,
            dst_field: self.dst_field,
            signature: OnceLock::new(),
        })
    }
}

impl<C> InvocationForm<C> {
    pub fn builder(name: impl Into<DName>, cookie: C) -> FormBuilder<C> {
        FormBuilder {
            name: name.into(),
            cookie,
            source: false,
            fields: Vec::new(),
            output: FormOutput::Single(DType::General),
            dst_field: None,
        }
    }

    pub fn name(&self) -> &DName {
        &self.name
    }

    pub fn cookie(&self) -> &C {
        &self.cookie
    }

    /// Whether the form takes a main input sequence.
    pub fn has_mis(&self) -> bool {
        self.source
    }

    pub fn has_merge(&self) -> bool {
        matches!(self.output, FormOutput::Seq { merge: true, .. })
    }

    pub fn output(&self) -> &FormOutput {
        &self.output
    }

    pub fn dst_field(&self) -> Option<&DName> {
        self.dst_field.as_ref()
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn field_index(&self, name: &DName) -> Option<usize> {
        self.fields.iter().position(|f| &f.name == name)
    }

    pub fn selector_count(&self) -> usize {
        self.fields.iter().take_while(|f| f.selector).count()
    }

    /// Source, one selector and every required plain field.
    pub fn arity_min(&self) -> usize {
        let required = self
            .fields
            .iter()
            .filter(|f| !f.selector && f.default.is_required())
            .count();
        let selectors = usize::from(self.selector_count() > 0);
        usize::from(self.source) + selectors + required
    }

    pub fn arity_max(&self) -> usize {
        usize::from(self.source) + self.fields.len()
    }

    pub fn supports_arity(&self, arity: usize) -> bool {
        (self.arity_min()..=self.arity_max()).contains(&arity)
    }

    pub fn signature(&self) -> &FormSignature {
        self.signature.get_or_init(|| self.build_signature())
    }

    fn build_signature(&self) -> FormSignature {
        let mut text = format!("{}(", self.name);
        let mut parts = Vec::new();
        if self.source {
            parts.push("source: *".to_string());
        }
        for field in &self.fields {
            let mut part = String::new();
            if field.selector {
                part.push_str("each ");
            }
            let _ = write!(part, "{}: {}", field.name, field.ty);
            if !field.default.is_required() {
                part.push_str(" = ..");
            }
            parts.push(part);
        }
        text.push_str(&parts.join(", "));
        text.push_str(") -> ");
        match &self.output {
            FormOutput::Single(ty) => {
                let _ = write!(text, "{ty}");
            }
            FormOutput::Seq { item, merge: false } => {
                let _ = write!(text, "{item}*");
            }
            FormOutput::Seq { item, merge: true } => {
                let _ = write!(text, "(source + {item})*");
                if let Some(dst) = &self.dst_field {
                    let _ = write!(text, " as {dst}");
                }
            }
        }
        FormSignature {
            text,
            arity_min: self.arity_min(),
            arity_max: self.arity_max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[(&str, DType)]) -> DType {
        DType::record(
            fields
                .iter()
                .map(|(n, t)| (DName::from(*n), t.clone()))
                .collect(),
        )
    }

    #[test]
    fn arity_and_signature() {
        let form = InvocationForm::builder("Rank", ())
            .source()
            .field(FormField::selector("Key", DType::I64))
            .field(FormField::selector("Tie", DType::Text).or(SlotDefault::Text(String::new())))
            .field(FormField::new("Top", DType::I64).or(SlotDefault::Int(10)))
            .output(FormOutput::Seq {
                item: rec(&[("Rank", DType::I64)]),
                merge: true,
            })
            .build()
            .unwrap();
        assert_eq!(form.selector_count(), 2);
        assert_eq!(form.arity_min(), 2);
        assert_eq!(form.arity_max(), 4);
        assert_eq!(
            form.signature().text,
            "Rank(source: *, each Key: Int64, each Tie: Text = .., Top: Int64 = ..) -> (source + {Rank: Int64})*"
        );
        assert!(std::ptr::eq(form.signature(), form.signature()));
    }

    #[test]
    fn defaults_convert_to_field_type() {
        let node = SlotDefault::Int(2).to_node(&DType::F64).unwrap();
        assert_eq!(node.ty, DType::F64);
        assert!(SlotDefault::Required.to_node(&DType::I64).is_none());
    }

    #[test]
    fn rejects_malformed_forms() {
        let err = InvocationForm::builder("F", ())
            .field(FormField::selector("A", DType::I64))
            .build()
            .unwrap_err();
        assert_eq!(err, FormError::SelectorWithoutSource("F".into()));

        let err = InvocationForm::builder("F", ())
            .source()
            .field(FormField::selector("A", DType::I64))
            .field(FormField::new("B", DType::I64))
            .field(FormField::selector("C", DType::I64))
            .build()
            .unwrap_err();
        assert!(matches!(err, FormError::SelectorsNotLeading { .. }));

        let err = InvocationForm::builder("F", ())
            .field(FormField::new("A", DType::I64))
            .output(FormOutput::Seq {
                item: DType::I64,
                merge: true,
            })
            .build()
            .unwrap_err();
        assert_eq!(err, FormError::MergeWithoutSource("F".into()));

        let err = InvocationForm::builder("F", ())
            .field(FormField::new("A", DType::Bool).or(SlotDefault::Text("x".into())))
            .build()
            .unwrap_err();
        assert!(matches!(err, FormError::BadDefault { .. }));

        let err = InvocationForm::builder("F", ())
            .field(FormField::new("A", DType::I64))
            .dst_field("Out")
            .build()
            .unwrap_err();
        assert_eq!(err, FormError::DstFieldWithoutMerge("F".into()));
    }
}
