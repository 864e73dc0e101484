//! URI template expansion for about/property/value URLs
//!
//! Supports the simple `{var}` and fragment `{#var}` expressions that the
//! tabular metadata vocabulary relies on. After expansion the result is
//! percent-decoded, prefixed names are expanded against the well-known
//! prefix map, and the outcome is resolved against the table URL.

use std::collections::HashMap;
use url::Url;

use crate::metadata::context::expand_prefixed_name;

/// Variable bindings for one cell's template expansion
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: HashMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

fn encode_component(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Expand `{var}` / `{#var}` expressions. Unbound variables expand to the
/// empty string.
fn expand(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let expression = &after[..close];
        let (prefix, name) = match expression.strip_prefix('#') {
            Some(name) => ("#", name),
            None => ("", expression),
        };
        if let Some(value) = vars.get(name) {
            out.push_str(prefix);
            out.push_str(&encode_component(value));
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Expand a template for one cell and resolve the outcome against the
/// table URL. Returns `None` for an empty template or an unresolvable
/// result.
pub fn expand_and_resolve(template: &str, vars: &TemplateVars, table_url: &Url) -> Option<String> {
    if template.is_empty() {
        return None;
    }
    let expanded = expand(template, vars);
    let decoded = urlencoding::decode(&expanded)
        .map(|c| c.into_owned())
        .unwrap_or(expanded);
    let candidate = expand_prefixed_name(&decoded).unwrap_or(decoded);
    if candidate.is_empty() {
        return None;
    }
    match table_url.join(&candidate) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(_) => Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table_url() -> Url {
        Url::parse("http://example.org/data.csv").unwrap()
    }

    fn vars() -> TemplateVars {
        let mut v = TemplateVars::new();
        v.set("_row", "2");
        v.set("_sourceRow", "3");
        v.set("_column", "1");
        v.set("_name", "country");
        v.set("country", "AF");
        v
    }

    #[test]
    fn test_simple_expansion() {
        let out = expand_and_resolve("{#_name}", &vars(), &table_url()).unwrap();
        assert_eq!(out, "http://example.org/data.csv#country");
    }

    #[test]
    fn test_row_variable() {
        let out = expand_and_resolve("row/{_row}", &vars(), &table_url()).unwrap();
        assert_eq!(out, "http://example.org/row/2");
    }

    #[test]
    fn test_cell_value_variable() {
        let out =
            expand_and_resolve("http://example.org/country/{country}", &vars(), &table_url())
                .unwrap();
        assert_eq!(out, "http://example.org/country/AF");
    }

    #[test]
    fn test_prefixed_name_expansion() {
        let mut v = TemplateVars::new();
        v.set("_name", "size");
        let out = expand_and_resolve("rdf:type", &v, &table_url()).unwrap();
        assert_eq!(out, "http://www.w3.org/1999/02/22-rdf-syntax-ns#type");
    }

    #[test]
    fn test_unbound_variable_is_empty() {
        let out = expand_and_resolve("x/{missing}/y", &vars(), &table_url()).unwrap();
        assert_eq!(out, "http://example.org/x//y");
    }

    #[test]
    fn test_value_encoding_then_decoding() {
        let mut v = TemplateVars::new();
        v.set("name", "a b");
        let out = expand_and_resolve("{name}", &v, &table_url()).unwrap();
        // expansion percent-encodes, post-processing decodes; URL join
        // re-encodes the space
        assert_eq!(out, "http://example.org/a%20b");
    }

    #[test]
    fn test_empty_template() {
        assert!(expand_and_resolve("", &vars(), &table_url()).is_none());
    }
}
