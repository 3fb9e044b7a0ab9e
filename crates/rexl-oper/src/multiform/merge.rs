//! Item-wise merge of a source sequence with a computed output sequence.

use std::collections::HashSet;

use rexl_types::{DName, DType, RecordType};

/// Types involved in merging source items with output items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInfo {
    pub type_src: RecordType,
    pub type_out: RecordType,
    /// Output fields renamed to avoid a collision, as `(from, to)`.
    pub renames: Vec<(DName, DName)>,
    /// Sequence of merged items.
    pub type_mrg: DType,
    /// What the executor returns: `type_mrg`, or a record wrapping it.
    pub type_dst: DType,
}

impl MergeInfo {
    /// Source fields are kept as they are. An output field whose name a
    /// source field already uses gets the first numeric suffix, starting at
    /// 1, that no source field, output field or earlier rename uses.
    pub fn standard(src: &RecordType, out: &RecordType, dst_field: Option<&DName>) -> Self {
        let mut taken: HashSet<DName> = src.names().chain(out.names()).cloned().collect();
        let mut fields = src.fields.clone();
        let mut renames = Vec::new();

        for (name, ty) in &out.fields {
            if !src.has(name) {
                fields.push((name.clone(), ty.clone()));
                continue;
            }
            let renamed = (1..)
                .map(|n| name.with_suffix(n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| unreachable!("suffixes are unbounded"));
            taken.insert(renamed.clone());
            renames.push((name.clone(), renamed.clone()));
            fields.push((renamed, ty.clone()));
        }

        let type_mrg = DType::seq(DType::record(fields));
        let type_dst = match dst_field {
            Some(field) => DType::record(vec![(field.clone(), type_mrg.clone())]),
            None => type_mrg.clone(),
        };
        Self {
            type_src: src.clone(),
            type_out: out.clone(),
            renames,
            type_mrg,
            type_dst,
        }
    }

    /// Name an output field has in the merged item.
    pub fn merged_name<'a>(&'a self, out_field: &'a DName) -> &'a DName {
        self.renames
            .iter()
            .find(|(from, _)| from == out_field)
            .map_or(out_field, |(_, to)| to)
    }
}
