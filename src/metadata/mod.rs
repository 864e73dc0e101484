//! Metadata document normalization
//!
//! Walks a metadata document (table group → tables → schema → columns, plus
//! dialect and datatype sub-objects), dispatching every property to its
//! family validator, resolving link-valued properties against the base URL,
//! boxing common properties into JSON-LD-compatible shape, and assigning
//! default column names. Normalization is idempotent: running it over an
//! already-normalized document changes nothing.

pub mod compat;
pub mod context;

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::datatypes::BaseType;
use crate::errors::{Result, TabularError, Warning};
use crate::fetch::DocumentFetcher;
use crate::properties::{self, AtomicConstraints, JsonKind, INHERITED_PROPERTIES};

/// Outcome of normalizing a metadata document
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetadata {
    pub base_url: Url,
    /// `None` means undetermined (`und`)
    pub default_language: Option<String>,
}

/// Normalize a metadata document in place.
///
/// `location` is the URL the document was retrieved from; it seeds the base
/// URL unless `@context` overrides it. The document must describe a table
/// group (`tables`) or a single table (`url`).
pub fn normalize_document(
    doc: &mut Value,
    location: &str,
    fetcher: &dyn DocumentFetcher,
    warnings: &mut Vec<Warning>,
) -> Result<NormalizedMetadata> {
    let location = Url::parse(location)
        .map_err(|e| TabularError::Schema(format!("invalid metadata location '{location}': {e}")))?;
    let obj = doc.as_object_mut().ok_or_else(|| {
        TabularError::Schema("metadata document must be a JSON object".to_string())
    })?;

    let ctx = context::parse_context(obj, &location, warnings)?;
    debug!(base = %ctx.base_url, "normalizing metadata document");
    let normalizer = Normalizer {
        base: ctx.base_url.clone(),
        default_language: ctx.default_language.clone().unwrap_or_else(|| "und".to_string()),
        fetcher,
    };

    if obj.contains_key("tables") {
        normalizer.table_group(obj, "", warnings)?;
    } else if obj.contains_key("url") {
        normalizer.table(obj, "", warnings)?;
    } else {
        return Err(TabularError::Schema(
            "metadata must describe a table group ('tables') or a table ('url')".to_string(),
        ));
    }

    Ok(NormalizedMetadata {
        base_url: ctx.base_url,
        default_language: ctx.default_language,
    })
}

fn sub(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

struct Normalizer<'a> {
    base: Url,
    default_language: String,
    fetcher: &'a dyn DocumentFetcher,
}

impl Normalizer<'_> {
    fn table_group(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@context" => {}
                "@id" => {
                    properties::normalize_link(obj, "@id", path, w)?;
                    properties::resolve_link(obj, "@id", &self.base);
                }
                "@type" => self.required_type(obj, path, "TableGroup", w)?,
                "tables" => {
                    properties::normalize_array(obj, "tables", path, Value::is_object, w);
                    let tables = obj
                        .get_mut("tables")
                        .and_then(Value::as_array_mut)
                        .expect("normalized to array");
                    if tables.is_empty() {
                        return Err(TabularError::Schema(format!(
                            "{} must contain at least one table description",
                            sub(path, "tables")
                        )));
                    }
                    for (i, table) in tables.iter_mut().enumerate() {
                        let table = table.as_object_mut().expect("filtered to objects");
                        self.table(table, &sub(path, &format!("tables.{i}")), w)?;
                    }
                }
                "dialect" => self.dialect_member(obj, path, w)?,
                "tableSchema" => self.schema_member(obj, path, w)?,
                "transformations" => self.transformations_member(obj, path, w)?,
                "tableDirection" => self.table_direction(obj, path, w)?,
                "notes" => self.notes_member(obj, path, w),
                name if INHERITED_PROPERTIES.contains(&name) => {
                    self.inherited_property(obj, name, path, w)?;
                }
                name => self.common_property(obj, name, path, w),
            }
        }
        Ok(())
    }

    fn table(&self, obj: &mut Map<String, Value>, path: &str, w: &mut Vec<Warning>) -> Result<()> {
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@context" => {}
                "@id" => {
                    properties::normalize_link(obj, "@id", path, w)?;
                    properties::resolve_link(obj, "@id", &self.base);
                }
                "@type" => self.required_type(obj, path, "Table", w)?,
                "url" => {
                    properties::normalize_link(obj, "url", path, w)?;
                    properties::resolve_link(obj, "url", &self.base);
                }
                "tableSchema" => self.schema_member(obj, path, w)?,
                "dialect" => self.dialect_member(obj, path, w)?,
                "transformations" => self.transformations_member(obj, path, w)?,
                "tableDirection" => self.table_direction(obj, path, w)?,
                "suppressOutput" => properties::normalize_atomic(
                    obj,
                    "suppressOutput",
                    path,
                    &AtomicConstraints {
                        kinds: &[JsonKind::Bool],
                        default: Some(Value::Bool(false)),
                        ..Default::default()
                    },
                    w,
                )?,
                "notes" => self.notes_member(obj, path, w),
                name if INHERITED_PROPERTIES.contains(&name) => {
                    self.inherited_property(obj, name, path, w)?;
                }
                name => self.common_property(obj, name, path, w),
            }
        }

        match obj.get("url") {
            Some(Value::String(url)) if !url.is_empty() => Ok(()),
            _ => Err(TabularError::Schema(format!(
                "{} requires a non-empty 'url'",
                if path.is_empty() { "table" } else { path }
            ))),
        }
    }

    fn schema(&self, obj: &mut Map<String, Value>, path: &str, w: &mut Vec<Warning>) -> Result<()> {
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@context" => {}
                "@id" => {
                    properties::normalize_link(obj, "@id", path, w)?;
                    properties::resolve_link(obj, "@id", &self.base);
                }
                "@type" => self.required_type(obj, path, "Schema", w)?,
                "columns" => {
                    properties::normalize_array(obj, "columns", path, Value::is_object, w);
                    let columns = obj
                        .get_mut("columns")
                        .and_then(Value::as_array_mut)
                        .expect("normalized to array");
                    for (i, column) in columns.iter_mut().enumerate() {
                        let column = column.as_object_mut().expect("filtered to objects");
                        self.column(column, &sub(path, &format!("columns.{i}")), w)?;
                    }
                }
                "primaryKey" | "rowTitles" => {
                    properties::normalize_column_reference(obj, &key, path, w);
                }
                "foreignKeys" => {
                    properties::normalize_array(obj, "foreignKeys", path, Value::is_object, w);
                    let fks = obj
                        .get_mut("foreignKeys")
                        .and_then(Value::as_array_mut)
                        .expect("normalized to array");
                    for (i, fk) in fks.iter_mut().enumerate() {
                        let fk = fk.as_object_mut().expect("filtered to objects");
                        self.foreign_key(fk, &sub(path, &format!("foreignKeys.{i}")), w)?;
                    }
                }
                name if INHERITED_PROPERTIES.contains(&name) => {
                    self.inherited_property(obj, name, path, w)?;
                }
                name => self.common_property(obj, name, path, w),
            }
        }

        self.assign_column_names(obj, path)?;
        self.check_column_references(obj, path, w)?;
        Ok(())
    }

    fn column(&self, obj: &mut Map<String, Value>, path: &str, w: &mut Vec<Warning>) -> Result<()> {
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@id" => {
                    properties::normalize_link(obj, "@id", path, w)?;
                    properties::resolve_link(obj, "@id", &self.base);
                }
                "@type" => self.required_type(obj, path, "Column", w)?,
                "name" => {
                    properties::normalize_atomic(
                        obj,
                        "name",
                        path,
                        &AtomicConstraints {
                            kinds: &[JsonKind::String],
                            default: None,
                            ..Default::default()
                        },
                        w,
                    )?;
                    // names beginning with an underscore collide with the
                    // URI template variables
                    if let Some(name) = obj.get("name").and_then(Value::as_str) {
                        if name.starts_with('_') || name.is_empty() {
                            w.push(Warning::new(
                                sub(path, "name"),
                                format!("invalid column name '{name}' removed"),
                            ));
                            obj.remove("name");
                        }
                    }
                }
                "titles" => properties::normalize_natural_language(
                    obj,
                    "titles",
                    path,
                    &self.default_language,
                    w,
                ),
                "virtual" | "suppressOutput" => properties::normalize_atomic(
                    obj,
                    &key,
                    path,
                    &AtomicConstraints {
                        kinds: &[JsonKind::Bool],
                        default: Some(Value::Bool(false)),
                        ..Default::default()
                    },
                    w,
                )?,
                name if INHERITED_PROPERTIES.contains(&name) => {
                    self.inherited_property(obj, name, path, w)?;
                }
                name => self.common_property(obj, name, path, w),
            }
        }
        Ok(())
    }

    fn dialect(&self, obj: &mut Map<String, Value>, path: &str, w: &mut Vec<Warning>) -> Result<()> {
        let string_defaults: &[(&str, &str)] = &[
            ("commentPrefix", "#"),
            ("delimiter", ","),
            ("encoding", "utf-8"),
            ("quoteChar", "\""),
        ];
        let bool_defaults: &[(&str, bool)] = &[
            ("doubleQuote", true),
            ("header", true),
            ("skipBlankRows", false),
            ("skipInitialSpace", false),
        ];
        let count_defaults: &[(&str, u64)] =
            &[("headerRowCount", 1), ("skipColumns", 0), ("skipRows", 0)];

        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@id" => {
                    properties::normalize_link(obj, "@id", path, w)?;
                    properties::resolve_link(obj, "@id", &self.base);
                }
                "@type" => self.required_type(obj, path, "Dialect", w)?,
                "lineTerminators" => {
                    if obj.get("lineTerminators").is_some_and(Value::is_string) {
                        continue;
                    }
                    properties::normalize_array(obj, "lineTerminators", path, Value::is_string, w);
                }
                "trim" => {
                    let valid = match obj.get("trim") {
                        Some(Value::Bool(_)) => true,
                        Some(Value::String(s)) => {
                            matches!(s.as_str(), "true" | "false" | "start" | "end")
                        }
                        _ => false,
                    };
                    if !valid {
                        w.push(Warning::new(
                            sub(path, "trim"),
                            "invalid trim value, using default true".to_string(),
                        ));
                        obj.insert("trim".to_string(), Value::Bool(true));
                    }
                }
                name if string_defaults.iter().any(|(n, _)| *n == name) => {
                    // quoteChar and commentPrefix accept an explicit null
                    if matches!(name, "quoteChar" | "commentPrefix")
                        && obj.get(name).is_some_and(Value::is_null)
                    {
                        continue;
                    }
                    let default = string_defaults
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, d)| *d)
                        .expect("matched above");
                    properties::normalize_atomic(
                        obj,
                        name,
                        path,
                        &AtomicConstraints {
                            kinds: &[JsonKind::String],
                            default: Some(Value::String(default.to_string())),
                            ..Default::default()
                        },
                        w,
                    )?;
                }
                name if bool_defaults.iter().any(|(n, _)| *n == name) => {
                    let default = bool_defaults
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, d)| *d)
                        .expect("matched above");
                    properties::normalize_atomic(
                        obj,
                        name,
                        path,
                        &AtomicConstraints {
                            kinds: &[JsonKind::Bool],
                            default: Some(Value::Bool(default)),
                            ..Default::default()
                        },
                        w,
                    )?;
                }
                name if count_defaults.iter().any(|(n, _)| *n == name) => {
                    let default = count_defaults
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, d)| *d)
                        .expect("matched above");
                    properties::normalize_atomic(
                        obj,
                        name,
                        path,
                        &AtomicConstraints {
                            kinds: &[JsonKind::UnsignedInt],
                            minimum: Some(0),
                            default: Some(Value::Number(default.into())),
                            ..Default::default()
                        },
                        w,
                    )?;
                }
                name => self.common_property(obj, name, path, w),
            }
        }
        Ok(())
    }

    /// Normalize a `datatype` value: a bare name string stays a string, an
    /// object gets its members normalized.
    fn datatype(&self, obj: &mut Map<String, Value>, path: &str, w: &mut Vec<Warning>) -> Result<()> {
        match obj.get_mut("datatype") {
            Some(Value::String(name)) => {
                if BaseType::from_name(name).is_none() {
                    w.push(Warning::new(
                        sub(path, "datatype"),
                        format!("unknown datatype '{name}', using string"),
                    ));
                    obj.insert("datatype".to_string(), Value::String("string".to_string()));
                }
            }
            Some(Value::Object(desc)) => {
                let dt_path = sub(path, "datatype");
                if let Some(base) = desc.get("base") {
                    let valid = base
                        .as_str()
                        .is_some_and(|name| BaseType::from_name(name).is_some());
                    if !valid {
                        w.push(Warning::new(
                            sub(&dt_path, "base"),
                            format!("unknown datatype base {base}, using string"),
                        ));
                        desc.insert("base".to_string(), Value::String("string".to_string()));
                    }
                }
                for count in ["length", "minLength", "maxLength"] {
                    properties::normalize_atomic(
                        desc,
                        count,
                        &dt_path,
                        &AtomicConstraints {
                            kinds: &[JsonKind::UnsignedInt],
                            minimum: Some(0),
                            default: None,
                            ..Default::default()
                        },
                        w,
                    )?;
                }
                for bound in [
                    "minimum",
                    "maximum",
                    "minInclusive",
                    "maxInclusive",
                    "minExclusive",
                    "maxExclusive",
                ] {
                    properties::normalize_atomic(
                        desc,
                        bound,
                        &dt_path,
                        &AtomicConstraints {
                            kinds: &[JsonKind::Number, JsonKind::String],
                            default: None,
                            ..Default::default()
                        },
                        w,
                    )?;
                }
                properties::normalize_link(desc, "@id", &dt_path, w)?;
                properties::resolve_link(desc, "@id", &self.base);
            }
            Some(other) => {
                w.push(Warning::new(
                    sub(path, "datatype"),
                    format!("datatype must be a name or description object, found {other}"),
                ));
                obj.insert("datatype".to_string(), Value::String("string".to_string()));
            }
            None => {}
        }
        Ok(())
    }

    fn inherited_property(
        &self,
        obj: &mut Map<String, Value>,
        name: &str,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        match name {
            "aboutUrl" | "propertyUrl" | "valueUrl" => {
                properties::normalize_uri_template(obj, name, path, w);
            }
            "datatype" => self.datatype(obj, path, w)?,
            "default" => properties::normalize_atomic(
                obj,
                "default",
                path,
                &AtomicConstraints {
                    kinds: &[JsonKind::String],
                    default: Some(Value::String(String::new())),
                    ..Default::default()
                },
                w,
            )?,
            "lang" => {
                let valid = obj
                    .get("lang")
                    .and_then(Value::as_str)
                    .is_some_and(properties::is_language_tag);
                if !valid {
                    w.push(Warning::new(
                        sub(path, "lang"),
                        "invalid language tag, using 'und'".to_string(),
                    ));
                    obj.insert("lang".to_string(), Value::String("und".to_string()));
                }
            }
            "null" => match obj.get("null") {
                Some(Value::String(s)) => {
                    let s = s.clone();
                    obj.insert("null".to_string(), Value::Array(vec![Value::String(s)]));
                }
                Some(Value::Array(_)) => {
                    properties::normalize_array(obj, "null", path, Value::is_string, w);
                }
                Some(other) => {
                    w.push(Warning::new(
                        sub(path, "null"),
                        format!("null must be a string or array of strings, found {other}"),
                    ));
                    obj.insert(
                        "null".to_string(),
                        Value::Array(vec![Value::String(String::new())]),
                    );
                }
                None => {}
            },
            "ordered" | "required" => properties::normalize_atomic(
                obj,
                name,
                path,
                &AtomicConstraints {
                    kinds: &[JsonKind::Bool],
                    default: Some(Value::Bool(false)),
                    ..Default::default()
                },
                w,
            )?,
            "separator" => properties::normalize_atomic(
                obj,
                "separator",
                path,
                &AtomicConstraints {
                    kinds: &[JsonKind::String],
                    default: None,
                    ..Default::default()
                },
                w,
            )?,
            "textDirection" => properties::normalize_atomic(
                obj,
                "textDirection",
                path,
                &AtomicConstraints {
                    kinds: &[JsonKind::String],
                    allowed: Some(&["ltr", "rtl", "auto", "inherit"]),
                    default: Some(Value::String("inherit".to_string())),
                    ..Default::default()
                },
                w,
            )?,
            _ => unreachable!("not an inherited property: {name}"),
        }
        Ok(())
    }

    fn dialect_member(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        properties::normalize_object(obj, "dialect", path, &self.base, self.fetcher, w)?;
        if let Some(dialect) = obj.get_mut("dialect").and_then(Value::as_object_mut) {
            self.dialect(dialect, &sub(path, "dialect"), w)?;
        }
        Ok(())
    }

    fn schema_member(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        properties::normalize_object(obj, "tableSchema", path, &self.base, self.fetcher, w)?;
        if let Some(schema) = obj.get_mut("tableSchema").and_then(Value::as_object_mut) {
            self.schema(schema, &sub(path, "tableSchema"), w)?;
        }
        Ok(())
    }

    fn transformations_member(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        properties::normalize_array(obj, "transformations", path, Value::is_object, w);
        let transformations = obj
            .get_mut("transformations")
            .and_then(Value::as_array_mut)
            .expect("normalized to array");
        for (i, transformation) in transformations.iter_mut().enumerate() {
            let transformation = transformation.as_object_mut().expect("filtered to objects");
            self.transformation(transformation, &sub(path, &format!("transformations.{i}")), w)?;
        }
        Ok(())
    }

    fn transformation(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@id" => {
                    properties::normalize_link(obj, "@id", path, w)?;
                    properties::resolve_link(obj, "@id", &self.base);
                }
                "@type" => self.required_type(obj, path, "Template", w)?,
                "url" | "targetFormat" | "scriptFormat" => {
                    properties::normalize_link(obj, &key, path, w)?;
                    properties::resolve_link(obj, &key, &self.base);
                }
                "titles" => properties::normalize_natural_language(
                    obj,
                    "titles",
                    path,
                    &self.default_language,
                    w,
                ),
                "source" => properties::normalize_atomic(
                    obj,
                    "source",
                    path,
                    &AtomicConstraints {
                        kinds: &[JsonKind::String],
                        default: None,
                        ..Default::default()
                    },
                    w,
                )?,
                name => self.common_property(obj, name, path, w),
            }
        }
        Ok(())
    }

    /// Foreign keys admit only `columnReference` and `reference`; anything
    /// else, or a malformed reference shape, is fatal.
    fn foreign_key(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        for key in obj.keys() {
            if key != "columnReference" && key != "reference" {
                return Err(TabularError::Schema(format!(
                    "{path}: foreign key definitions do not allow '{key}'"
                )));
            }
        }
        properties::normalize_column_reference(obj, "columnReference", path, w);
        if !obj.contains_key("columnReference") {
            return Err(TabularError::Schema(format!(
                "{path} requires 'columnReference'"
            )));
        }

        let Some(Value::Object(reference)) = obj.get_mut("reference") else {
            return Err(TabularError::Schema(format!(
                "{path} requires a 'reference' object"
            )));
        };
        for key in reference.keys() {
            if !matches!(key.as_str(), "resource" | "schemaReference" | "columnReference") {
                return Err(TabularError::Schema(format!(
                    "{path}.reference does not allow '{key}'"
                )));
            }
        }
        let ref_path = sub(path, "reference");
        properties::normalize_link(reference, "resource", &ref_path, w)?;
        properties::resolve_link(reference, "resource", &self.base);
        properties::normalize_link(reference, "schemaReference", &ref_path, w)?;
        properties::resolve_link(reference, "schemaReference", &self.base);
        properties::normalize_column_reference(reference, "columnReference", &ref_path, w);

        let has_resource = reference.contains_key("resource");
        let has_schema_ref = reference.contains_key("schemaReference");
        if has_resource == has_schema_ref {
            return Err(TabularError::Schema(format!(
                "{ref_path} requires exactly one of 'resource' or 'schemaReference'"
            )));
        }
        if !reference.contains_key("columnReference") {
            return Err(TabularError::Schema(format!(
                "{ref_path} requires 'columnReference'"
            )));
        }
        Ok(())
    }

    fn table_direction(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        properties::normalize_atomic(
            obj,
            "tableDirection",
            path,
            &AtomicConstraints {
                kinds: &[JsonKind::String],
                allowed: Some(&["ltr", "rtl", "auto"]),
                default: Some(Value::String("auto".to_string())),
                ..Default::default()
            },
            w,
        )
    }

    fn required_type(
        &self,
        obj: &mut Map<String, Value>,
        path: &str,
        expected: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        properties::normalize_atomic(
            obj,
            "@type",
            path,
            &AtomicConstraints {
                required_value: Some(expected),
                ..Default::default()
            },
            w,
        )
    }

    fn notes_member(&self, obj: &mut Map<String, Value>, path: &str, w: &mut Vec<Warning>) {
        properties::normalize_array(obj, "notes", path, |_| true, w);
        if let Some(Value::Array(items)) = obj.get_mut("notes") {
            let boxed: Vec<Value> = items.iter().map(|v| self.box_common_value(v)).collect();
            *items = boxed;
        }
    }

    fn common_property(
        &self,
        obj: &mut Map<String, Value>,
        name: &str,
        path: &str,
        w: &mut Vec<Warning>,
    ) {
        if !context::is_valid_common_property_name(name) {
            w.push(Warning::new(
                sub(path, name),
                "unrecognized property name, removed".to_string(),
            ));
            obj.remove(name);
            return;
        }
        let boxed = self.box_common_value(&obj[name]);
        obj.insert(name.to_string(), boxed);
    }

    /// Box a common-property value into `{@value}` / `{@id}` shape,
    /// recursively, per the JSON-LD-compatible normalization rules.
    fn box_common_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                let mut map = Map::new();
                map.insert("@value".to_string(), Value::String(s.clone()));
                if self.default_language != "und" {
                    map.insert(
                        "@language".to_string(),
                        Value::String(self.default_language.clone()),
                    );
                }
                Value::Object(map)
            }
            Value::Bool(_) | Value::Number(_) => {
                let mut map = Map::new();
                map.insert("@value".to_string(), value.clone());
                Value::Object(map)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.box_common_value(v)).collect())
            }
            Value::Object(entries) => {
                if entries.contains_key("@value") {
                    return value.clone();
                }
                let mut map = Map::new();
                for (key, member) in entries {
                    match key.as_str() {
                        "@id" => {
                            let resolved = member
                                .as_str()
                                .and_then(|s| self.base.join(s).ok())
                                .map(|u| Value::String(u.to_string()))
                                .unwrap_or_else(|| member.clone());
                            map.insert("@id".to_string(), resolved);
                        }
                        "@type" | "@language" => {
                            map.insert(key.clone(), member.clone());
                        }
                        _ => {
                            map.insert(key.clone(), self.box_common_value(member));
                        }
                    }
                }
                Value::Object(map)
            }
            Value::Null => Value::Null,
        }
    }

    /// Columns without an explicit `name` get one from the first `titles`
    /// entry in the default language (percent-encoded), else `_col.N`.
    fn assign_column_names(&self, schema: &mut Map<String, Value>, path: &str) -> Result<()> {
        let Some(Value::Array(columns)) = schema.get_mut("columns") else {
            return Ok(());
        };
        let mut seen_virtual = false;
        let mut names: Vec<String> = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter_mut().enumerate() {
            let column = column.as_object_mut().expect("columns are objects");

            let is_virtual = column.get("virtual").and_then(Value::as_bool).unwrap_or(false);
            if is_virtual {
                seen_virtual = true;
            } else if seen_virtual {
                return Err(TabularError::Schema(format!(
                    "{}: non-virtual column at position {} follows a virtual column",
                    sub(path, "columns"),
                    i + 1
                )));
            }

            if column.get("name").and_then(Value::as_str).is_none() {
                let from_titles = column
                    .get("titles")
                    .and_then(Value::as_object)
                    .and_then(|titles| {
                        titles
                            .get(&self.default_language)
                            .or_else(|| titles.get("und"))
                    })
                    .and_then(Value::as_array)
                    .and_then(|list| list.first())
                    .and_then(Value::as_str);
                let name = match from_titles {
                    Some(title) => urlencoding::encode(title).into_owned(),
                    None => format!("_col.{}", i + 1),
                };
                column.insert("name".to_string(), Value::String(name));
            }
            let name = column
                .get("name")
                .and_then(Value::as_str)
                .expect("assigned above")
                .to_string();
            if names.contains(&name) {
                return Err(TabularError::Schema(format!(
                    "{}: duplicate column name '{name}'",
                    sub(path, "columns")
                )));
            }
            names.push(name);
        }
        Ok(())
    }

    /// Primary-key and foreign-key column references must resolve against
    /// real column names; failures are fatal. `rowTitles` failures are
    /// repaired with a warning.
    fn check_column_references(
        &self,
        schema: &mut Map<String, Value>,
        path: &str,
        w: &mut Vec<Warning>,
    ) -> Result<()> {
        let names: Vec<String> = schema
            .get("columns")
            .and_then(Value::as_array)
            .map(|columns| {
                columns
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let listed = |value: Option<&Value>| -> Vec<String> {
            value
                .and_then(Value::as_array)
                .map(|refs| {
                    refs.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        for referenced in listed(schema.get("primaryKey")) {
            if !names.contains(&referenced) {
                return Err(TabularError::Schema(format!(
                    "{}: primaryKey references unknown column '{referenced}'",
                    path_or(path, "schema")
                )));
            }
        }
        for fk in schema
            .get("foreignKeys")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            for referenced in listed(fk.get("columnReference")) {
                if !names.contains(&referenced) {
                    return Err(TabularError::Schema(format!(
                        "{}: foreignKeys references unknown column '{referenced}'",
                        path_or(path, "schema")
                    )));
                }
            }
        }
        let bad_row_titles = listed(schema.get("rowTitles"))
            .iter()
            .any(|r| !names.contains(r));
        if bad_row_titles {
            w.push(Warning::new(
                sub(path, "rowTitles"),
                "rowTitles references unknown columns, removed".to_string(),
            ));
            schema.remove("rowTitles");
        }
        Ok(())
    }
}

fn path_or<'a>(path: &'a str, fallback: &'a str) -> &'a str {
    if path.is_empty() {
        fallback
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::NoFetch;
    use serde_json::json;

    const LOCATION: &str = "http://example.org/metadata.json";

    fn normalize(mut doc: Value) -> (Value, Vec<Warning>) {
        let mut warnings = Vec::new();
        normalize_document(&mut doc, LOCATION, &NoFetch, &mut warnings).unwrap();
        (doc, warnings)
    }

    #[test]
    fn test_minimal_table_normalization() {
        let (doc, _) = normalize(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv"
        }));
        assert_eq!(doc["url"], json!("http://example.org/data.csv"));
    }

    #[test]
    fn test_table_without_url_is_fatal() {
        let mut doc = json!({"@context": "http://www.w3.org/ns/csvw", "tables": [{}]});
        let mut w = Vec::new();
        assert!(normalize_document(&mut doc, LOCATION, &NoFetch, &mut w).is_err());
    }

    #[test]
    fn test_column_name_defaulting() {
        let (doc, _) = normalize(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "tableSchema": {"columns": [
                {"titles": "First Name"},
                {"name": "age"},
                {}
            ]}
        }));
        let columns = doc["tableSchema"]["columns"].as_array().unwrap();
        assert_eq!(columns[0]["name"], json!("First%20Name"));
        assert_eq!(columns[1]["name"], json!("age"));
        assert_eq!(columns[2]["name"], json!("_col.3"));
    }

    #[test]
    fn test_titles_use_context_language() {
        let (doc, _) = normalize(json!({
            "@context": ["http://www.w3.org/ns/csvw", {"@language": "en"}],
            "url": "data.csv",
            "tableSchema": {"columns": [{"titles": "Name"}]}
        }));
        assert_eq!(
            doc["tableSchema"]["columns"][0]["titles"],
            json!({"en": ["Name"]})
        );
        assert_eq!(doc["tableSchema"]["columns"][0]["name"], json!("Name"));
    }

    #[test]
    fn test_duplicate_column_names_fatal() {
        let mut doc = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "tableSchema": {"columns": [{"name": "a"}, {"name": "a"}]}
        });
        let mut w = Vec::new();
        assert!(normalize_document(&mut doc, LOCATION, &NoFetch, &mut w).is_err());
    }

    #[test]
    fn test_virtual_ordering_fatal() {
        let mut doc = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "tableSchema": {"columns": [
                {"name": "v", "virtual": true, "valueUrl": "http://example.org/x"},
                {"name": "a"}
            ]}
        });
        let mut w = Vec::new();
        assert!(normalize_document(&mut doc, LOCATION, &NoFetch, &mut w).is_err());
    }

    #[test]
    fn test_primary_key_must_resolve() {
        let mut doc = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "tableSchema": {
                "columns": [{"name": "a"}],
                "primaryKey": "missing"
            }
        });
        let mut w = Vec::new();
        assert!(normalize_document(&mut doc, LOCATION, &NoFetch, &mut w).is_err());
    }

    #[test]
    fn test_foreign_key_shape_fatal() {
        let mut doc = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "tables": [{
                "url": "a.csv",
                "tableSchema": {
                    "columns": [{"name": "x"}],
                    "foreignKeys": [{"columnReference": "x"}]
                }
            }]
        });
        let mut w = Vec::new();
        assert!(normalize_document(&mut doc, LOCATION, &NoFetch, &mut w).is_err());
    }

    #[test]
    fn test_common_property_boxing() {
        let (doc, _) = normalize(json!({
            "@context": ["http://www.w3.org/ns/csvw", {"@language": "en"}],
            "url": "data.csv",
            "dc:title": "The Title",
            "dc:creator": ["A", "B"]
        }));
        assert_eq!(
            doc["dc:title"],
            json!({"@value": "The Title", "@language": "en"})
        );
        assert_eq!(
            doc["dc:creator"],
            json!([
                {"@value": "A", "@language": "en"},
                {"@value": "B", "@language": "en"}
            ])
        );
    }

    #[test]
    fn test_invalid_common_property_removed() {
        let (doc, warnings) = normalize(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "titl": "oops"
        }));
        assert!(doc.get("titl").is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_normalization_idempotent() {
        let original = json!({
            "@context": ["http://www.w3.org/ns/csvw", {"@language": "en"}],
            "tables": [{
                "url": "data.csv",
                "dc:title": "Data",
                "tableSchema": {
                    "columns": [
                        {"titles": "id", "datatype": "integer", "required": true},
                        {"titles": ["name", "nom"]}
                    ],
                    "primaryKey": "id"
                }
            }]
        });
        let (once, _) = normalize(original);
        let (twice, warnings) = normalize(once.clone());
        assert_eq!(once, twice);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_datatype_normalization() {
        let (doc, _) = normalize(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "tableSchema": {"columns": [
                {"name": "a", "datatype": "nope"},
                {"name": "b", "datatype": {"base": "integer", "minimum": 0}}
            ]}
        }));
        let columns = doc["tableSchema"]["columns"].as_array().unwrap();
        assert_eq!(columns[0]["datatype"], json!("string"));
        assert_eq!(columns[1]["datatype"], json!({"base": "integer", "minimum": 0}));
    }

    #[test]
    fn test_dialect_normalization_defaults_bad_values() {
        let (doc, warnings) = normalize(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "dialect": {"headerRowCount": "two", "trim": "sideways", "quoteChar": null}
        }));
        assert_eq!(doc["dialect"]["headerRowCount"], json!(1));
        assert_eq!(doc["dialect"]["trim"], json!(true));
        assert_eq!(doc["dialect"]["quoteChar"], json!(null));
        assert_eq!(warnings.len(), 2);
    }
}
