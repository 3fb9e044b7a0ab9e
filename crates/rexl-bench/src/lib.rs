//! Fixtures shared by the benchmarks.

use std::sync::Arc;

use rexl_oper::{
    ArgSpec, BoundNode, FormField, FormOutput, InvocationForm, MultiFormOper, SlotDefault,
};
use rexl_types::{DName, DType};

/// An operation with `forms` mapped forms that all reject an `Int64`
/// selector except the last, so binding one call walks every candidate.
pub fn rebinding_oper(forms: usize) -> Arc<MultiFormOper<usize>> {
    let mut list: Vec<InvocationForm<usize>> = (0..forms.saturating_sub(1))
        .map(|i| {
            InvocationForm::builder(format!("text{i}"), i)
                .source()
                .field(FormField::selector("Key", DType::Text))
                .output(FormOutput::Single(DType::I64))
                .build()
                .unwrap_or_else(|err| panic!("bad benchmark form: {err}"))
        })
        .collect();
    list.push(
        InvocationForm::builder("int", forms)
            .source()
            .field(FormField::selector("Key", DType::I64))
            .field(FormField::new("Limit", DType::I64).or(SlotDefault::Int(10)))
            .output(FormOutput::Single(DType::I64))
            .build()
            .unwrap_or_else(|err| panic!("bad benchmark form: {err}")),
    );
    Arc::new(MultiFormOper::new("Pick", list))
}

/// A single merging form whose output item is `{F0: Int64}`.
pub fn merging_oper() -> Arc<MultiFormOper<()>> {
    let form = InvocationForm::builder("ranked", ())
        .source()
        .field(FormField::selector("Key", DType::I64))
        .output(FormOutput::Seq {
            item: DType::record(vec![(DName::from("F0"), DType::I64)]),
            merge: true,
        })
        .build()
        .unwrap_or_else(|err| panic!("bad benchmark form: {err}"));
    Arc::new(MultiFormOper::new("Rank", vec![form]))
}

pub fn rows(fields: usize) -> BoundNode {
    let item = (0..fields)
        .map(|i| (DName::new(format!("F{i}")), DType::I64))
        .collect();
    BoundNode::global("rows", DType::seq(DType::record(item)))
}

pub fn ints() -> BoundNode {
    BoundNode::global("xs", DType::seq(DType::I64))
}

/// The item itself, as a selector.
pub fn item() -> ArgSpec {
    ArgSpec::nested(|_, view| {
        view.get(0)
            .unwrap_or_else(|| panic!("selector evaluated outside its item scope"))
    })
}

/// The `F0` field of the item, as a selector.
pub fn first_field() -> ArgSpec {
    ArgSpec::nested(|_, view| {
        let row = view
            .get(0)
            .unwrap_or_else(|| panic!("selector evaluated outside its item scope"));
        BoundNode::get_field(row, "F0")
    })
}
