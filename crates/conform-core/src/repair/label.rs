//! Duplicate label disambiguation.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::{segments, value_at_mut, Repair, RepairAction};
use crate::patterns::label_base;
use crate::report::{IssueKind, ValidationIssue};
use crate::template::SectionSchema;

/// Resolves `DuplicateValue` issues on string labels by appending the
/// entry's 1-based position: `Trading Multiples (2)`.
///
/// The suffix is bumped until it no longer collides with any label in the
/// section. Non-string duplicates are left alone.
pub struct LabelDisambiguation;

/// Every string stored under `key` anywhere below `value`.
fn labels_under(value: &Value, key: &str, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    if let Value::String(s) = v {
                        out.insert(s.trim().to_string());
                    }
                }
                labels_under(v, key, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                labels_under(item, key, out);
            }
        }
        _ => {}
    }
}

impl Repair for LabelDisambiguation {
    fn name(&self) -> &'static str {
        "label_disambiguation"
    }

    fn handles(&self) -> IssueKind {
        IssueKind::DuplicateValue
    }

    fn apply(
        &self,
        sections: &mut Map<String, Value>,
        _schema: &SectionSchema,
        issue: &ValidationIssue,
    ) -> Option<RepairAction> {
        let location = issue.field.as_deref()?;
        let path = segments(location);
        let (key, parents) = path.split_last()?;
        let position = parents.last()?.parse::<usize>().ok()? + 1;

        let section = sections.get_mut(&issue.section)?;
        let mut taken = BTreeSet::new();
        labels_under(section, key, &mut taken);

        let target = value_at_mut(section, &path)?;
        let current = target.as_str()?.trim().to_string();
        let base = label_base(&current);

        let mut n = position;
        let mut candidate = format!("{} ({})", base, n);
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{} ({})", base, n);
        }

        let description = format!("renamed '{}' to '{}'", current, candidate);
        *target = Value::String(candidate);

        Some(RepairAction {
            description,
            placeholder: false,
        })
    }
}
