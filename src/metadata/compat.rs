//! Compatibility check between a supplied table description and the
//! embedded metadata extracted from a tabular file's header.
//!
//! Two descriptions are compatible when they point at the same source file
//! and their schemas describe the same columns: equal non-virtual column
//! counts, and per position either a matching `name` or a non-empty
//! intersection of titles in some language (the undetermined language
//! intersects with everything).

use serde_json::{Map, Value};

use crate::errors::{Result, TabularError, Warning};

/// Check a supplied table description against embedded metadata. In strict
/// mode a mismatch is fatal; otherwise it is reported as a warning and the
/// supplied description wins.
pub fn check_table_compatibility(
    supplied: &Map<String, Value>,
    embedded: &Map<String, Value>,
    strict: bool,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    if let Some(reason) = incompatibility(supplied, embedded) {
        if strict {
            return Err(TabularError::IncompatibleMetadata(reason));
        }
        warnings.push(Warning::new("tableSchema", reason));
    }
    Ok(())
}

fn incompatibility(
    supplied: &Map<String, Value>,
    embedded: &Map<String, Value>,
) -> Option<String> {
    let supplied_url = supplied.get("url").and_then(Value::as_str);
    let embedded_url = embedded.get("url").and_then(Value::as_str);
    if let (Some(a), Some(b)) = (supplied_url, embedded_url) {
        if a != b {
            return Some(format!(
                "table description for '{a}' does not match source file '{b}'"
            ));
        }
    }

    let supplied_columns = columns_of(supplied);
    let embedded_columns = columns_of(embedded);
    if embedded_columns.is_empty() {
        return None;
    }

    let non_virtual = |cols: &[&Map<String, Value>]| {
        cols.iter()
            .filter(|c| !c.get("virtual").and_then(Value::as_bool).unwrap_or(false))
            .count()
    };
    let supplied_count = non_virtual(&supplied_columns);
    let embedded_count = non_virtual(&embedded_columns);
    if !supplied_columns.is_empty() && supplied_count != embedded_count {
        return Some(format!(
            "schema describes {supplied_count} columns but the source file has {embedded_count}"
        ));
    }

    for (i, (sup, emb)) in supplied_columns.iter().zip(&embedded_columns).enumerate() {
        if !columns_match(sup, emb) {
            let name = sup
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("(unnamed)");
            return Some(format!(
                "column {} ('{name}') does not match the source file's header",
                i + 1
            ));
        }
    }
    None
}

fn columns_of(table: &Map<String, Value>) -> Vec<&Map<String, Value>> {
    table
        .get("tableSchema")
        .and_then(Value::as_object)
        .and_then(|schema| schema.get("columns"))
        .and_then(Value::as_array)
        .map(|columns| columns.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

/// A column pair matches when either side lacks both `name` and `titles`,
/// when the names are equal, or when their title sets intersect in some
/// language.
fn columns_match(supplied: &Map<String, Value>, embedded: &Map<String, Value>) -> bool {
    let sup_name = supplied.get("name").and_then(Value::as_str);
    let emb_name = embedded.get("name").and_then(Value::as_str);
    let sup_titles = supplied.get("titles").and_then(Value::as_object);
    let emb_titles = embedded.get("titles").and_then(Value::as_object);

    if (sup_name.is_none() && sup_titles.is_none())
        || (emb_name.is_none() && emb_titles.is_none())
    {
        return true;
    }
    if let (Some(a), Some(b)) = (sup_name, emb_name) {
        if a == b {
            return true;
        }
    }
    // a name on one side may match a title on the other
    if let (Some(name), Some(titles)) = (sup_name, emb_titles) {
        if titles_contain(titles, name) {
            return true;
        }
    }
    if let (Some(name), Some(titles)) = (emb_name, sup_titles) {
        if titles_contain(titles, name) {
            return true;
        }
    }
    if let (Some(a), Some(b)) = (sup_titles, emb_titles) {
        return titles_intersect(a, b);
    }
    false
}

fn titles_contain(titles: &Map<String, Value>, wanted: &str) -> bool {
    titles.values().any(|list| {
        list.as_array()
            .is_some_and(|items| items.iter().any(|t| t.as_str() == Some(wanted)))
    })
}

fn titles_intersect(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    let listed = |titles: &Map<String, Value>, tag: &str| -> Vec<String> {
        titles
            .get(tag)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    for (tag, titles) in a {
        let Some(ours) = titles.as_array() else {
            continue;
        };
        let ours: Vec<&str> = ours.iter().filter_map(Value::as_str).collect();
        // und matches any language; a concrete tag matches itself, its
        // primary-subtag relatives, and und
        let theirs: Vec<String> = if tag == "und" {
            b.values()
                .filter_map(Value::as_array)
                .flatten()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        } else {
            let primary = tag.split('-').next().unwrap_or(tag);
            let mut collected = listed(b, "und");
            for (other_tag, _) in b.iter() {
                if other_tag == tag || other_tag.split('-').next() == Some(primary) {
                    collected.extend(listed(b, other_tag));
                }
            }
            collected
        };
        if ours.iter().any(|t| theirs.iter().any(|o| o == t)) {
            return true;
        }
    }
    false
}
