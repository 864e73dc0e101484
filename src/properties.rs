//! Per-family property validators
//!
//! Every CSVW metadata property belongs to one of seven families (link,
//! array, object, atomic, natural-language, column-reference, URI-template);
//! inherited properties form an eighth group that cascades down the
//! containment hierarchy. Each validator canonicalizes a single property in
//! place, pushing a [`Warning`] when it has to repair the value and raising
//! a fatal error only where the metadata vocabulary demands it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::errors::{Result, TabularError, Warning};
use crate::fetch::DocumentFetcher;

/// The seven property families plus the inherited group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFamily {
    Link,
    Array,
    Object,
    Atomic,
    NaturalLanguage,
    ColumnReference,
    UriTemplate,
    /// Atomic or URI-template properties that cascade group → table →
    /// schema → column
    Inherited,
}

/// The eleven inherited property names
pub const INHERITED_PROPERTIES: [&str; 11] = [
    "aboutUrl",
    "datatype",
    "default",
    "lang",
    "null",
    "ordered",
    "propertyUrl",
    "required",
    "separator",
    "textDirection",
    "valueUrl",
];

/// Family of a recognized property name, or `None` for a common property.
pub fn family_of(name: &str) -> Option<PropertyFamily> {
    use PropertyFamily::*;
    Some(match name {
        "url" | "@id" | "resource" | "schemaReference" | "targetFormat" | "scriptFormat" => Link,
        "tables" | "transformations" | "columns" | "foreignKeys" | "notes"
        | "lineTerminators" => Array,
        "dialect" | "tableSchema" | "reference" => Object,
        "titles" => NaturalLanguage,
        "primaryKey" | "rowTitles" | "columnReference" => ColumnReference,
        "aboutUrl" | "datatype" | "default" | "lang" | "null" | "ordered" | "propertyUrl"
        | "required" | "separator" | "textDirection" | "valueUrl" => Inherited,
        "name" | "suppressOutput" | "virtual" | "tableDirection" | "source" | "commentPrefix"
        | "delimiter" | "doubleQuote" | "encoding" | "header" | "headerRowCount" | "quoteChar"
        | "skipBlankRows" | "skipColumns" | "skipInitialSpace" | "skipRows" | "trim" | "base"
        | "format" | "length" | "minLength" | "maxLength" | "minimum" | "maximum"
        | "minInclusive" | "maxInclusive" | "minExclusive" | "maxExclusive" | "@type"
        | "@language" | "@base" => Atomic,
        _ => return None,
    })
}

/// JSON value kinds accepted by an atomic property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Bool,
    /// Non-negative integer
    UnsignedInt,
    Number,
    Object,
}

impl JsonKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Bool => value.is_boolean(),
            JsonKind::UnsignedInt => value.as_u64().is_some(),
            JsonKind::Number => value.is_number(),
            JsonKind::Object => value.is_object(),
        }
    }
}

/// Constraints applied by [`normalize_atomic`]
#[derive(Debug, Clone, Default)]
pub struct AtomicConstraints<'a> {
    /// Allowed JSON kinds (empty slice means any kind)
    pub kinds: &'a [JsonKind],
    /// Allowed value set, checked after the kind check
    pub allowed: Option<&'a [&'a str]>,
    /// Numeric lower bound
    pub minimum: Option<i64>,
    /// Value substituted on violation; `None` removes the property instead
    pub default: Option<Value>,
    /// Exact value the property must hold; a mismatch is fatal
    pub required_value: Option<&'a str>,
}

static BCP47: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("valid regex"));

/// Check a BCP47 language tag shape
pub fn is_language_tag(tag: &str) -> bool {
    BCP47.is_match(tag)
}

fn push_warning(warnings: &mut Vec<Warning>, path: &str, name: &str, message: String) {
    warn!(property = name, path, "{message}");
    warnings.push(Warning::new(format!("{path}.{name}"), message));
}

/// Link property: must be a string; anything else becomes `""`.
/// Resolution against the base URL is a separate step ([`resolve_link`]).
pub fn normalize_link(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    match obj.get(name) {
        Some(Value::String(s)) => {
            if name == "@id" && s.starts_with("_:") {
                return Err(TabularError::Schema(format!(
                    "{path}.@id must not be a blank node identifier, found '{s}'"
                )));
            }
        }
        Some(other) => {
            let message = format!("link property must be a string, found {}", kind_name(other));
            push_warning(warnings, path, name, message);
            obj.insert(name.to_string(), Value::String(String::new()));
        }
        None => {}
    }
    Ok(())
}

/// Resolve a link-valued property against the base URL, in place.
pub fn resolve_link(obj: &mut Map<String, Value>, name: &str, base: &Url) {
    if let Some(Value::String(s)) = obj.get(name) {
        if s.is_empty() {
            return;
        }
        if let Ok(resolved) = base.join(s) {
            obj.insert(name.to_string(), Value::String(resolved.to_string()));
        }
    }
}

/// Array property: non-arrays are replaced with `[]`; elements of a
/// disallowed type are silently dropped.
pub fn normalize_array(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    element_allowed: fn(&Value) -> bool,
    warnings: &mut Vec<Warning>,
) {
    match obj.get_mut(name) {
        Some(Value::Array(items)) => {
            items.retain(|v| element_allowed(v));
        }
        Some(other) => {
            let message = format!("array property must be an array, found {}", kind_name(other));
            push_warning(warnings, path, name, message);
            obj.insert(name.to_string(), Value::Array(Vec::new()));
        }
        None => {}
    }
}

/// Object property: a string value is a URL reference dereferenced through
/// the fetcher; anything other than a string or object becomes `{}`.
pub fn normalize_object(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    base: &Url,
    fetcher: &dyn DocumentFetcher,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    match obj.get(name) {
        Some(Value::String(reference)) => {
            let resolved = base
                .join(reference)
                .map_err(|e| TabularError::Schema(format!("{path}.{name}: bad URL reference: {e}")))?;
            let fetched = fetcher.fetch_json(resolved.as_str())?;
            let mut fetched = match fetched {
                Value::Object(map) => map,
                other => {
                    let message = format!(
                        "dereferenced '{resolved}' is {}, not an object",
                        kind_name(&other)
                    );
                    push_warning(warnings, path, name, message);
                    Map::new()
                }
            };
            fetched
                .entry("@id")
                .or_insert_with(|| Value::String(resolved.to_string()));
            obj.insert(name.to_string(), Value::Object(fetched));
        }
        Some(Value::Object(_)) | None => {}
        Some(other) => {
            let message = format!(
                "object property must be an object or URL reference, found {}",
                kind_name(other)
            );
            push_warning(warnings, path, name, message);
            obj.insert(name.to_string(), Value::Object(Map::new()));
        }
    }
    Ok(())
}

/// Atomic property: checked against kind/value/bound constraints; violations
/// substitute the supplied default (or remove the property), and a
/// `required_value` mismatch raises fatally.
pub fn normalize_atomic(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    constraints: &AtomicConstraints<'_>,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let Some(value) = obj.get(name) else {
        return Ok(());
    };

    if let Some(required) = constraints.required_value {
        if value.as_str() != Some(required) {
            return Err(TabularError::Schema(format!(
                "{path}.{name} must be \"{required}\", found {value}"
            )));
        }
        return Ok(());
    }

    let kind_ok =
        constraints.kinds.is_empty() || constraints.kinds.iter().any(|k| k.matches(value));
    let value_ok = match constraints.allowed {
        Some(allowed) => value.as_str().is_some_and(|s| allowed.contains(&s)),
        None => true,
    };
    let bound_ok = match constraints.minimum {
        Some(min) => value.as_i64().is_none_or(|n| n >= min),
        None => true,
    };

    if kind_ok && value_ok && bound_ok {
        return Ok(());
    }

    match &constraints.default {
        Some(default) => {
            let message = format!("invalid value {value}, using default {default}");
            push_warning(warnings, path, name, message);
            obj.insert(name.to_string(), default.clone());
        }
        None => {
            let message = format!("invalid value {value}, property removed");
            push_warning(warnings, path, name, message);
            obj.remove(name);
        }
    }
    Ok(())
}

/// Natural-language property: canonical form is an object mapping language
/// tags to arrays of strings.
pub fn normalize_natural_language(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    default_language: &str,
    warnings: &mut Vec<Warning>,
) {
    let Some(value) = obj.get(name) else {
        return;
    };
    let canonical = match value {
        Value::String(s) => {
            let mut map = Map::new();
            map.insert(
                default_language.to_string(),
                Value::Array(vec![Value::String(s.clone())]),
            );
            Value::Object(map)
        }
        Value::Array(items) => {
            let strings: Vec<Value> = items
                .iter()
                .filter(|v| v.is_string())
                .cloned()
                .collect();
            let mut map = Map::new();
            map.insert(default_language.to_string(), Value::Array(strings));
            Value::Object(map)
        }
        Value::Object(entries) => {
            let mut map = Map::new();
            for (tag, titles) in entries {
                if tag != "und" && !is_language_tag(tag) {
                    let message = format!("invalid language tag '{tag}' dropped");
                    push_warning(warnings, path, name, message);
                    continue;
                }
                let coerced = match titles {
                    Value::String(s) => vec![Value::String(s.clone())],
                    Value::Array(items) => {
                        items.iter().filter(|v| v.is_string()).cloned().collect()
                    }
                    _ => {
                        let message =
                            format!("titles for language '{tag}' must be a string or array");
                        push_warning(warnings, path, name, message);
                        continue;
                    }
                };
                map.insert(tag.clone(), Value::Array(coerced));
            }
            Value::Object(map)
        }
        other => {
            let message = format!(
                "natural-language property must be a string, array or object, found {}",
                kind_name(other)
            );
            push_warning(warnings, path, name, message);
            Value::Object(Map::new())
        }
    };
    obj.insert(name.to_string(), canonical);
}

/// Column-reference property: canonical form is an array of column-name
/// strings. An invalid shape removes the property with a warning; callers
/// that require the property raise fatally at a higher level.
pub fn normalize_column_reference(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    warnings: &mut Vec<Warning>,
) {
    let Some(value) = obj.get(name) else {
        return;
    };
    match value {
        Value::String(s) => {
            let s = s.clone();
            obj.insert(name.to_string(), Value::Array(vec![Value::String(s)]));
        }
        Value::Array(items) if !items.is_empty() && items.iter().all(|v| v.is_string()) => {}
        other => {
            let message = format!(
                "column reference must be a column name or array of column names, found {other}"
            );
            push_warning(warnings, path, name, message);
            obj.remove(name);
        }
    }
}

/// URI-template property: must be a string; anything else becomes `""`.
/// Expansion happens per cell, not here.
pub fn normalize_uri_template(
    obj: &mut Map<String, Value>,
    name: &str,
    path: &str,
    warnings: &mut Vec<Warning>,
) {
    match obj.get(name) {
        Some(Value::String(_)) | None => {}
        Some(other) => {
            let message = format!(
                "URI template property must be a string, found {}",
                kind_name(other)
            );
            push_warning(warnings, path, name, message);
            obj.insert(name.to_string(), Value::String(String::new()));
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_link_non_string_replaced() {
        let mut o = obj(json!({"url": 5}));
        let mut w = Vec::new();
        normalize_link(&mut o, "url", "table", &mut w).unwrap();
        assert_eq!(o["url"], json!(""));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_link_blank_node_id_is_fatal() {
        let mut o = obj(json!({"@id": "_:b0"}));
        let mut w = Vec::new();
        assert!(normalize_link(&mut o, "@id", "table", &mut w).is_err());
    }

    #[test]
    fn test_resolve_link() {
        let mut o = obj(json!({"url": "data.csv"}));
        let base = Url::parse("http://example.org/meta/doc.json").unwrap();
        resolve_link(&mut o, "url", &base);
        assert_eq!(o["url"], json!("http://example.org/meta/data.csv"));
    }

    #[test]
    fn test_array_replaces_and_filters() {
        let mut o = obj(json!({"columns": "nope"}));
        let mut w = Vec::new();
        normalize_array(&mut o, "columns", "schema", Value::is_object, &mut w);
        assert_eq!(o["columns"], json!([]));
        assert_eq!(w.len(), 1);

        let mut o = obj(json!({"columns": [{"name": "a"}, 7, "x"]}));
        let mut w = Vec::new();
        normalize_array(&mut o, "columns", "schema", Value::is_object, &mut w);
        assert_eq!(o["columns"], json!([{"name": "a"}]));
        assert!(w.is_empty());
    }

    #[test]
    fn test_object_dereferences_string() {
        let mut fetcher = crate::fetch::MapFetcher::new();
        fetcher.insert(
            "http://example.org/dialect.json",
            json!({"delimiter": ";"}),
        );
        let base = Url::parse("http://example.org/meta.json").unwrap();
        let mut o = obj(json!({"dialect": "dialect.json"}));
        let mut w = Vec::new();
        normalize_object(&mut o, "dialect", "table", &base, &fetcher, &mut w).unwrap();
        assert_eq!(
            o["dialect"],
            json!({"delimiter": ";", "@id": "http://example.org/dialect.json"})
        );
    }

    #[test]
    fn test_atomic_default_and_removal() {
        let mut w = Vec::new();
        let mut o = obj(json!({"headerRowCount": -1}));
        normalize_atomic(
            &mut o,
            "headerRowCount",
            "dialect",
            &AtomicConstraints {
                kinds: &[JsonKind::UnsignedInt],
                default: Some(json!(1)),
                ..Default::default()
            },
            &mut w,
        )
        .unwrap();
        assert_eq!(o["headerRowCount"], json!(1));

        let mut o = obj(json!({"separator": 9}));
        normalize_atomic(
            &mut o,
            "separator",
            "column",
            &AtomicConstraints {
                kinds: &[JsonKind::String],
                default: None,
                ..Default::default()
            },
            &mut w,
        )
        .unwrap();
        assert!(!o.contains_key("separator"));
    }

    #[test]
    fn test_atomic_required_value_is_fatal() {
        let mut w = Vec::new();
        let mut o = obj(json!({"@type": "Thing"}));
        let result = normalize_atomic(
            &mut o,
            "@type",
            "table",
            &AtomicConstraints {
                required_value: Some("Table"),
                ..Default::default()
            },
            &mut w,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_natural_language_forms() {
        let mut w = Vec::new();
        let mut o = obj(json!({"titles": "Name"}));
        normalize_natural_language(&mut o, "titles", "column", "und", &mut w);
        assert_eq!(o["titles"], json!({"und": ["Name"]}));

        let mut o = obj(json!({"titles": ["a", 1, "b"]}));
        normalize_natural_language(&mut o, "titles", "column", "en", &mut w);
        assert_eq!(o["titles"], json!({"en": ["a", "b"]}));

        let mut o = obj(json!({"titles": {"en": "Name", "123!": "bad", "de": ["Nom"]}}));
        normalize_natural_language(&mut o, "titles", "column", "und", &mut w);
        assert_eq!(o["titles"], json!({"en": ["Name"], "de": ["Nom"]}));
    }

    #[test]
    fn test_column_reference_forms() {
        let mut w = Vec::new();
        let mut o = obj(json!({"primaryKey": "id"}));
        normalize_column_reference(&mut o, "primaryKey", "schema", &mut w);
        assert_eq!(o["primaryKey"], json!(["id"]));

        let mut o = obj(json!({"primaryKey": [1, 2]}));
        normalize_column_reference(&mut o, "primaryKey", "schema", &mut w);
        assert!(!o.contains_key("primaryKey"));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_uri_template_non_string() {
        let mut w = Vec::new();
        let mut o = obj(json!({"aboutUrl": {"x": 1}}));
        normalize_uri_template(&mut o, "aboutUrl", "column", &mut w);
        assert_eq!(o["aboutUrl"], json!(""));
    }

    #[test]
    fn test_family_table() {
        assert_eq!(family_of("url"), Some(PropertyFamily::Link));
        assert_eq!(family_of("columns"), Some(PropertyFamily::Array));
        assert_eq!(family_of("tableSchema"), Some(PropertyFamily::Object));
        assert_eq!(family_of("titles"), Some(PropertyFamily::NaturalLanguage));
        assert_eq!(family_of("primaryKey"), Some(PropertyFamily::ColumnReference));
        assert_eq!(family_of("aboutUrl"), Some(PropertyFamily::Inherited));
        assert_eq!(family_of("delimiter"), Some(PropertyFamily::Atomic));
        assert_eq!(family_of("dc:title"), None);
        for name in INHERITED_PROPERTIES {
            assert_eq!(family_of(name), Some(PropertyFamily::Inherited));
        }
    }

    #[test]
    fn test_language_tag_shapes() {
        assert!(is_language_tag("en"));
        assert!(is_language_tag("en-GB"));
        assert!(is_language_tag("zh-Hant-TW"));
        assert!(!is_language_tag("123!"));
        assert!(!is_language_tag(""));
    }
}
