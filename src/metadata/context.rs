//! `@context` handling and the well-known prefix map
//!
//! The prefix map and the CSVW namespace are immutable static data; nothing
//! mutates them after process start.

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

use crate::errors::{Result, TabularError, Warning};
use crate::properties::is_language_tag;

/// The CSVW namespace document URL expected in `@context`
pub const CSVW_CONTEXT: &str = "http://www.w3.org/ns/csvw";

/// Initial-context prefixes recognized in common-property names and URI
/// templates
pub static PREFIXES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("as", "https://www.w3.org/ns/activitystreams#"),
        ("cc", "http://creativecommons.org/ns#"),
        ("csvw", "http://www.w3.org/ns/csvw#"),
        ("ctag", "http://commontag.org/ns#"),
        ("dc", "http://purl.org/dc/terms/"),
        ("dc11", "http://purl.org/dc/elements/1.1/"),
        ("dcat", "http://www.w3.org/ns/dcat#"),
        ("dcterms", "http://purl.org/dc/terms/"),
        ("foaf", "http://xmlns.com/foaf/0.1/"),
        ("gr", "http://purl.org/goodrelations/v1#"),
        ("grddl", "http://www.w3.org/2003/g/data-view#"),
        ("ldp", "http://www.w3.org/ns/ldp#"),
        ("oa", "http://www.w3.org/ns/oa#"),
        ("og", "http://ogp.me/ns#"),
        ("org", "http://www.w3.org/ns/org#"),
        ("owl", "http://www.w3.org/2002/07/owl#"),
        ("prov", "http://www.w3.org/ns/prov#"),
        ("qb", "http://purl.org/linked-data/cube#"),
        ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
        ("rdfa", "http://www.w3.org/ns/rdfa#"),
        ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
        ("schema", "http://schema.org/"),
        ("sioc", "http://rdfs.org/sioc/ns#"),
        ("skos", "http://www.w3.org/2004/02/skos/core#"),
        ("time", "http://www.w3.org/2006/time#"),
        ("vcard", "http://www.w3.org/2006/vcard/ns#"),
        ("void", "http://rdfs.org/ns/void#"),
        ("wdr", "http://www.w3.org/2007/05/powder#"),
        ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ])
});

/// Expand `prefix:suffix` against the prefix map. Returns `None` when the
/// name carries no known prefix (including `//`-style scheme suffixes).
pub fn expand_prefixed_name(name: &str) -> Option<String> {
    let (prefix, suffix) = name.split_once(':')?;
    if suffix.starts_with("//") {
        return None;
    }
    PREFIXES
        .get(prefix)
        .map(|namespace| format!("{namespace}{suffix}"))
}

/// Whether a common-property name is usable: an absolute URL or a prefixed
/// name with a recognized prefix.
pub fn is_valid_common_property_name(name: &str) -> bool {
    if expand_prefixed_name(name).is_some() {
        return true;
    }
    Url::parse(name).is_ok() && name.contains(':')
}

/// Base URL and default language extracted from a document's `@context`
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContext {
    pub base_url: Url,
    /// `None` means undetermined (`und`)
    pub default_language: Option<String>,
}

/// Interpret `@context`: either the CSVW namespace string, or a two-element
/// array of the namespace and a `{@base, @language}` object. Anything else
/// is a fatal schema error. A missing `@context` falls back to the
/// document location with a warning.
pub fn parse_context(
    doc: &Map<String, Value>,
    location: &Url,
    warnings: &mut Vec<Warning>,
) -> Result<DocumentContext> {
    let Some(context) = doc.get("@context") else {
        warnings.push(Warning::new(
            "@context",
            "metadata document lacks @context, assuming the CSVW context",
        ));
        return Ok(DocumentContext {
            base_url: location.clone(),
            default_language: None,
        });
    };

    let check_namespace = |s: &str| -> Result<()> {
        if s == CSVW_CONTEXT || s == "https://www.w3.org/ns/csvw" {
            Ok(())
        } else {
            Err(TabularError::Schema(format!(
                "@context must reference {CSVW_CONTEXT}, found '{s}'"
            )))
        }
    };

    match context {
        Value::String(s) => {
            check_namespace(s)?;
            Ok(DocumentContext {
                base_url: location.clone(),
                default_language: None,
            })
        }
        Value::Array(items) => {
            let mut base_url = location.clone();
            let mut default_language = None;
            let mut namespace_seen = false;
            for item in items {
                match item {
                    Value::String(s) => {
                        check_namespace(s)?;
                        namespace_seen = true;
                    }
                    Value::Object(local) => {
                        for key in local.keys() {
                            if key != "@base" && key != "@language" {
                                return Err(TabularError::Schema(format!(
                                    "@context object member '{key}' is not allowed"
                                )));
                            }
                        }
                        if let Some(base) = local.get("@base") {
                            let base = base.as_str().ok_or_else(|| {
                                TabularError::Schema("@base must be a string".to_string())
                            })?;
                            base_url = location.join(base).map_err(|e| {
                                TabularError::Schema(format!("invalid @base '{base}': {e}"))
                            })?;
                        }
                        if let Some(language) = local.get("@language") {
                            match language.as_str() {
                                Some(tag) if is_language_tag(tag) => {
                                    default_language = Some(tag.to_string());
                                }
                                Some(tag) => {
                                    warnings.push(Warning::new(
                                        "@context.@language",
                                        format!("invalid language tag '{tag}' ignored"),
                                    ));
                                }
                                None => {
                                    return Err(TabularError::Schema(
                                        "@language must be a string".to_string(),
                                    ))
                                }
                            }
                        }
                    }
                    other => {
                        return Err(TabularError::Schema(format!(
                            "unexpected @context entry {other}"
                        )))
                    }
                }
            }
            if !namespace_seen {
                return Err(TabularError::Schema(format!(
                    "@context array must include the {CSVW_CONTEXT} namespace"
                )));
            }
            Ok(DocumentContext {
                base_url,
                default_language,
            })
        }
        other => Err(TabularError::Schema(format!(
            "@context must be a string or array, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn location() -> Url {
        Url::parse("http://example.org/meta/doc.json").unwrap()
    }

    #[test]
    fn test_string_context() {
        let mut w = Vec::new();
        let ctx = parse_context(
            &doc(json!({"@context": "http://www.w3.org/ns/csvw"})),
            &location(),
            &mut w,
        )
        .unwrap();
        assert_eq!(ctx.base_url, location());
        assert!(ctx.default_language.is_none());
    }

    #[test]
    fn test_array_context_with_base_and_language() {
        let mut w = Vec::new();
        let ctx = parse_context(
            &doc(json!({"@context": [
                "http://www.w3.org/ns/csvw",
                {"@base": "http://data.example.org/", "@language": "en"}
            ]})),
            &location(),
            &mut w,
        )
        .unwrap();
        assert_eq!(ctx.base_url.as_str(), "http://data.example.org/");
        assert_eq!(ctx.default_language.as_deref(), Some("en"));
    }

    #[test]
    fn test_wrong_namespace_is_fatal() {
        let mut w = Vec::new();
        assert!(parse_context(
            &doc(json!({"@context": "http://example.org/other"})),
            &location(),
            &mut w
        )
        .is_err());
    }

    #[test]
    fn test_missing_context_warns() {
        let mut w = Vec::new();
        let ctx = parse_context(&doc(json!({})), &location(), &mut w).unwrap();
        assert_eq!(ctx.base_url, location());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_prefixed_name_expansion() {
        assert_eq!(
            expand_prefixed_name("dc:title").as_deref(),
            Some("http://purl.org/dc/terms/title")
        );
        assert!(expand_prefixed_name("http://example.org/x").is_none());
        assert!(expand_prefixed_name("unknown:x").is_none());
    }

    #[test]
    fn test_common_property_name_validity() {
        assert!(is_valid_common_property_name("dc:title"));
        assert!(is_valid_common_property_name("http://example.org/prop"));
        assert!(!is_valid_common_property_name("title"));
    }
}
