//! Dialect configuration for tokenizing delimited text
//!
//! A `Dialect` is created once per table, either from a normalized `dialect`
//! description or from HTTP header hints, and never mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Warning;

/// How cell strings are trimmed after splitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimMode {
    /// No trimming
    False,
    /// Trim both ends
    True,
    /// Trim leading whitespace only
    Start,
    /// Trim trailing whitespace only
    End,
}

impl TrimMode {
    pub fn apply(self, s: &str) -> &str {
        match self {
            TrimMode::False => s,
            TrimMode::True => s.trim(),
            TrimMode::Start => s.trim_start(),
            TrimMode::End => s.trim_end(),
        }
    }
}

/// Low-level parsing flags for a tabular file
///
/// Precedence between `trim` and `skipInitialSpace`: an explicit `trim`
/// always wins. `skipInitialSpace` is consulted only when `trim` is absent
/// (`true` maps to [`TrimMode::Start`], `false` to [`TrimMode::False`]);
/// when neither is given the default is [`TrimMode::True`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dialect {
    pub delimiter: char,
    /// `None` disables quote handling entirely
    pub quote_char: Option<char>,
    /// `None` disables escape handling; equals the quote char when the
    /// `doubleQuote` convention is in effect
    pub escape_char: Option<char>,
    pub comment_prefix: Option<String>,
    pub encoding: String,
    pub header: bool,
    pub header_row_count: usize,
    pub line_terminators: Vec<String>,
    pub skip_blank_rows: bool,
    pub skip_columns: usize,
    pub skip_rows: usize,
    pub trim: TrimMode,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_char: Some('"'),
            escape_char: Some('"'),
            comment_prefix: Some("#".to_string()),
            encoding: "utf-8".to_string(),
            header: true,
            header_row_count: 1,
            line_terminators: vec!["\r\n".to_string(), "\n".to_string()],
            skip_blank_rows: false,
            skip_columns: 0,
            skip_rows: 0,
            trim: TrimMode::True,
        }
    }
}

impl Dialect {
    /// Build a dialect from a normalized `dialect` description object.
    ///
    /// Unknown or malformed values have already been defaulted away by the
    /// metadata normalizer, so this reads leniently and falls back to the
    /// documented defaults.
    pub fn from_metadata(desc: &serde_json::Map<String, Value>) -> Self {
        let mut dialect = Dialect::default();

        if let Some(s) = desc.get("delimiter").and_then(Value::as_str) {
            if let Some(c) = s.chars().next() {
                dialect.delimiter = c;
            }
        }
        match desc.get("quoteChar") {
            Some(Value::Null) => dialect.quote_char = None,
            Some(Value::String(s)) => dialect.quote_char = s.chars().next(),
            _ => {}
        }
        let double_quote = desc
            .get("doubleQuote")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        dialect.escape_char = if double_quote {
            dialect.quote_char
        } else {
            Some('\\')
        };
        match desc.get("commentPrefix") {
            Some(Value::Null) => dialect.comment_prefix = None,
            Some(Value::String(s)) => dialect.comment_prefix = Some(s.clone()),
            _ => {}
        }
        if let Some(s) = desc.get("encoding").and_then(Value::as_str) {
            dialect.encoding = s.to_string();
        }
        if let Some(b) = desc.get("header").and_then(Value::as_bool) {
            dialect.header = b;
            if !b {
                dialect.header_row_count = 0;
            }
        }
        if let Some(n) = desc.get("headerRowCount").and_then(Value::as_u64) {
            dialect.header_row_count = n as usize;
        }
        match desc.get("lineTerminators") {
            Some(Value::String(s)) => dialect.line_terminators = vec![s.clone()],
            Some(Value::Array(items)) => {
                let terminators: Vec<String> = items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if !terminators.is_empty() {
                    dialect.line_terminators = terminators;
                }
            }
            _ => {}
        }
        if let Some(b) = desc.get("skipBlankRows").and_then(Value::as_bool) {
            dialect.skip_blank_rows = b;
        }
        if let Some(n) = desc.get("skipColumns").and_then(Value::as_u64) {
            dialect.skip_columns = n as usize;
        }
        if let Some(n) = desc.get("skipRows").and_then(Value::as_u64) {
            dialect.skip_rows = n as usize;
        }

        // Explicit trim wins over skipInitialSpace.
        match desc.get("trim") {
            Some(Value::Bool(true)) => dialect.trim = TrimMode::True,
            Some(Value::Bool(false)) => dialect.trim = TrimMode::False,
            Some(Value::String(s)) if s == "true" => dialect.trim = TrimMode::True,
            Some(Value::String(s)) if s == "false" => dialect.trim = TrimMode::False,
            Some(Value::String(s)) if s == "start" => dialect.trim = TrimMode::Start,
            Some(Value::String(s)) if s == "end" => dialect.trim = TrimMode::End,
            _ => {
                if let Some(b) = desc.get("skipInitialSpace").and_then(Value::as_bool) {
                    dialect.trim = if b { TrimMode::Start } else { TrimMode::False };
                }
            }
        }

        dialect
    }

    /// Best-effort dialect hints from an HTTP `Content-Type` header.
    ///
    /// Recognizes tab-separated media types, the `header=absent` parameter
    /// and a `charset` parameter. Header-driven overrides are advisory, not
    /// load-bearing; metadata-supplied dialects take precedence.
    pub fn from_content_type(content_type: &str, warnings: &mut Vec<Warning>) -> Self {
        let mut dialect = Dialect::default();
        let mut parts = content_type.split(';');
        let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();

        if media_type == "text/tab-separated-values" || media_type == "text/tsv" {
            dialect.delimiter = '\t';
        } else if !media_type.is_empty() && media_type != "text/csv" {
            warnings.push(Warning::new(
                "Content-Type",
                format!("unrecognized media type '{media_type}', assuming text/csv"),
            ));
        }

        for param in parts {
            let mut kv = param.splitn(2, '=');
            let key = kv.next().unwrap_or("").trim().to_ascii_lowercase();
            let value = kv.next().unwrap_or("").trim().trim_matches('"');
            match key.as_str() {
                "header" if value.eq_ignore_ascii_case("absent") => {
                    dialect.header = false;
                    dialect.header_row_count = 0;
                }
                "charset" if !value.is_empty() => {
                    dialect.encoding = value.to_ascii_lowercase();
                }
                _ => {}
            }
        }

        dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desc(value: serde_json::Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_default_dialect() {
        let d = Dialect::default();
        assert_eq!(d.delimiter, ',');
        assert_eq!(d.quote_char, Some('"'));
        assert_eq!(d.escape_char, Some('"'));
        assert_eq!(d.comment_prefix.as_deref(), Some("#"));
        assert!(d.header);
        assert_eq!(d.header_row_count, 1);
        assert_eq!(d.line_terminators, vec!["\r\n", "\n"]);
        assert_eq!(d.trim, TrimMode::True);
    }

    #[test]
    fn test_from_metadata_overrides() {
        let d = Dialect::from_metadata(&desc(json!({
            "delimiter": ";",
            "doubleQuote": false,
            "header": false,
            "skipRows": 2,
            "trim": "start"
        })));
        assert_eq!(d.delimiter, ';');
        assert_eq!(d.escape_char, Some('\\'));
        assert!(!d.header);
        assert_eq!(d.header_row_count, 0);
        assert_eq!(d.skip_rows, 2);
        assert_eq!(d.trim, TrimMode::Start);
    }

    #[test]
    fn test_trim_wins_over_skip_initial_space() {
        let d = Dialect::from_metadata(&desc(json!({
            "trim": false,
            "skipInitialSpace": true
        })));
        assert_eq!(d.trim, TrimMode::False);

        let d = Dialect::from_metadata(&desc(json!({ "skipInitialSpace": true })));
        assert_eq!(d.trim, TrimMode::Start);
    }

    #[test]
    fn test_from_content_type_tsv() {
        let mut warnings = Vec::new();
        let d = Dialect::from_content_type(
            "text/tab-separated-values; charset=UTF-16; header=absent",
            &mut warnings,
        );
        assert_eq!(d.delimiter, '\t');
        assert_eq!(d.encoding, "utf-16");
        assert!(!d.header);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_trim_mode_apply() {
        assert_eq!(TrimMode::True.apply("  a  "), "a");
        assert_eq!(TrimMode::Start.apply("  a  "), "a  ");
        assert_eq!(TrimMode::End.apply("  a  "), "  a");
        assert_eq!(TrimMode::False.apply("  a  "), "  a  ");
    }
}
