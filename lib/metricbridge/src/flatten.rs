//! Flattening of nested measurement documents.

use indexmap::IndexMap;
use serde_json::Value;

/// Flattens a nested document into a flat mapping from `_`-joined key paths to leaf values.
///
/// Equivalent to [`flatten_with_prefix`] with an empty prefix.
pub fn flatten(value: &Value) -> IndexMap<String, Value> {
    flatten_with_prefix("", value)
}

/// Flattens a nested document, rooting every key path at the given prefix.
///
/// Each leaf reachable from `value` appears exactly once in the output, keyed by the sequence of nested keys joined
/// with `_` (no separator before the first segment). Traversal follows document order, so the output is deterministic
/// for a given input. Arrays are not descended into: an array value is kept as a single opaque leaf. Flattening is
/// total, and non-numeric leaves are retained; filtering them is the formatter's job.
///
/// If two distinct key paths join to the same flat key (possible when a key itself contains `_`), the first one
/// written wins.
pub fn flatten_with_prefix(prefix: &str, value: &Value) -> IndexMap<String, Value> {
    let mut entries = IndexMap::new();
    flatten_into(prefix, value, &mut entries);
    entries
}

fn flatten_into(prefix: &str, value: &Value, entries: &mut IndexMap<String, Value>) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                if prefix.is_empty() {
                    flatten_into(key, child, entries);
                } else {
                    flatten_into(&format!("{}_{}", prefix, key), child, entries);
                }
            }
        }
        leaf => {
            entries.entry(prefix.to_string()).or_insert_with(|| leaf.clone());
        }
    }
}
