//! Deep, right-biased merge of header mappings

use serde_json::{Map, Value};

/// Header mapping; values are scalars once sent, nested while merging
pub type Headers = Map<String, Value>;

/// Merge `right` into `left`, recursing into nested mappings
///
/// For keys present on both sides, two objects merge recursively and any
/// other pair resolves to the right value. An empty or absent side yields
/// the other side unchanged; two empty sides yield `None`.
pub fn deep_merge(left: Option<&Headers>, right: Option<&Headers>) -> Option<Headers> {
    let left = left.filter(|map| !map.is_empty());
    let right = right.filter(|map| !map.is_empty());

    match (left, right) {
        (None, None) => None,
        (Some(left), None) => Some(left.clone()),
        (None, Some(right)) => Some(right.clone()),
        (Some(left), Some(right)) => {
            let mut merged = left.clone();
            merge_into(&mut merged, right);
            Some(merged)
        }
    }
}

fn merge_into(target: &mut Headers, source: &Headers) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
