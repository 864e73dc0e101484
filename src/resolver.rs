//! Structural resolver: from metadata plus source text to an annotated
//! table group
//!
//! Drives the tokenizer under each table's dialect, checks the supplied
//! metadata against the embedded header, materializes column annotations
//! with inherited-property lookup, parses every cell against its datatype,
//! expands URI templates, and enforces primary- and foreign-key integrity.
//!
//! The strict flag decides whether cell conversion and key violations abort
//! resolution or degrade to warnings and per-cell error lists.

use anyhow::anyhow;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::datatypes::{BaseType, Datatype};
use crate::dialect::Dialect;
use crate::errors::{Result, TabularError, Warning};
use crate::fetch::DocumentFetcher;
use crate::metadata::{self, compat, context::CSVW_CONTEXT};
use crate::model::{
    Cell, CellValue, Column, ColumnIdx, ForeignKey, Row, RowIdx, Table, TableGroup, TableIdx,
    TypedValue,
};
use crate::tokenizer::Tokenizer;
use crate::uri_template::{expand_and_resolve, TemplateVars};

/// Source text for one table, keyed by the table's resolved URL
#[derive(Debug, Clone, Copy)]
pub struct TableSource<'a> {
    pub url: &'a str,
    pub text: &'a str,
}

/// An annotated table group plus everything recoverable that went wrong
#[derive(Debug)]
pub struct ResolveOutcome {
    pub group: TableGroup,
    pub warnings: Vec<Warning>,
}

/// Resolver configuration: the strict flag and the fetcher used to
/// dereference schema and dialect URL references.
pub struct Resolver<'a> {
    strict: bool,
    fetcher: &'a dyn DocumentFetcher,
}

struct ForeignKeyDef {
    source_columns: Vec<ColumnIdx>,
    resource: Option<String>,
    schema_reference: Option<String>,
    referenced_columns: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a dyn DocumentFetcher) -> Self {
        Self {
            strict: false,
            fetcher,
        }
    }

    /// In strict mode cell conversion and key violations are fatal; in
    /// lenient mode they accumulate on the cells and in the warning list.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Resolve a metadata document against the supplied source files.
    pub fn resolve(
        &self,
        metadata: Value,
        location: &str,
        sources: &[TableSource<'_>],
    ) -> Result<ResolveOutcome> {
        let mut warnings = Vec::new();
        let mut doc = metadata;
        let normalized = metadata::normalize_document(&mut doc, location, self.fetcher, &mut warnings)?;
        let default_language = normalized
            .default_language
            .clone()
            .unwrap_or_else(|| "und".to_string());

        let root = doc.as_object().expect("normalized to object").clone();
        let (group_desc, table_descs): (Map<String, Value>, Vec<Map<String, Value>>) =
            match root.get("tables").and_then(Value::as_array) {
                Some(tables) => (
                    root.clone(),
                    tables
                        .iter()
                        .filter_map(Value::as_object)
                        .cloned()
                        .collect(),
                ),
                None => (Map::new(), vec![root.clone()]),
            };

        let mut group = TableGroup {
            tables: Vec::with_capacity(table_descs.len()),
            comments: notes_strings(&group_desc),
        };
        let mut fk_defs: Vec<Vec<ForeignKeyDef>> = Vec::new();
        let mut schema_ids: Vec<Option<String>> = Vec::new();

        for (t, table_desc) in table_descs.iter().enumerate() {
            let url = table_desc
                .get("url")
                .and_then(Value::as_str)
                .expect("validated by normalization");
            let source = sources
                .iter()
                .find(|s| s.url == url)
                .ok_or_else(|| anyhow!("no source text supplied for table '{url}'"))?;
            debug!(url, table = t + 1, "resolving table");
            let (table, defs, schema_id) = self.build_table(
                TableIdx(t),
                table_desc,
                &group_desc,
                source.text,
                &default_language,
                &mut warnings,
            )?;
            group.tables.push(table);
            fk_defs.push(defs);
            schema_ids.push(schema_id);
        }

        self.resolve_foreign_keys(&mut group, fk_defs, &schema_ids, &mut warnings)?;
        Ok(ResolveOutcome { group, warnings })
    }

    /// Resolve a bare tabular file with no supplied metadata: a minimal
    /// table description is synthesized around the file URL.
    pub fn resolve_text(&self, url: &str, text: &str) -> Result<ResolveOutcome> {
        let metadata = json!({"@context": CSVW_CONTEXT, "url": url});
        self.resolve(metadata, url, &[TableSource { url, text }])
    }

    fn build_table(
        &self,
        idx: TableIdx,
        table_desc: &Map<String, Value>,
        group_desc: &Map<String, Value>,
        text: &str,
        default_language: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<(Table, Vec<ForeignKeyDef>, Option<String>)> {
        let url = table_desc
            .get("url")
            .and_then(Value::as_str)
            .expect("validated by normalization")
            .to_string();
        let table_url = Url::parse(&url)
            .map_err(|e| TabularError::Schema(format!("invalid table URL '{url}': {e}")))?;

        let dialect_desc = table_desc
            .get("dialect")
            .or_else(|| group_desc.get("dialect"))
            .and_then(Value::as_object);
        let dialect = dialect_desc.map(Dialect::from_metadata).unwrap_or_default();

        let mut tokenizer = Tokenizer::new(text, &dialect);
        tokenizer.skip_rows(dialect.skip_rows)?;
        let headers = tokenizer.header_rows(dialect.header_row_count)?;
        let mut records = Vec::new();
        while let Some(record) = tokenizer.next_record()? {
            records.push(record);
        }

        // titles per data column, merged across header rows
        let skip = dialect.skip_columns;
        let mut embedded_titles: Vec<Vec<String>> = Vec::new();
        for header in &headers {
            for (i, cell) in header.iter().enumerate().skip(skip) {
                let col = i - skip;
                if embedded_titles.len() <= col {
                    embedded_titles.resize(col + 1, Vec::new());
                }
                if !cell.is_empty() {
                    embedded_titles[col].push(cell.clone());
                }
            }
        }

        if !embedded_titles.is_empty() {
            let embedded = embedded_description(&url, &embedded_titles, default_language);
            compat::check_table_compatibility(table_desc, &embedded, self.strict, warnings)?;
        }

        let schema_desc = table_desc
            .get("tableSchema")
            .or_else(|| group_desc.get("tableSchema"))
            .and_then(Value::as_object);
        let schema_id = schema_desc
            .and_then(|s| s.get("@id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let supplied_columns: Vec<&Map<String, Value>> = schema_desc
            .and_then(|s| s.get("columns"))
            .and_then(Value::as_array)
            .map(|cols| cols.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default();

        let column_count = if supplied_columns.is_empty() {
            if embedded_titles.is_empty() {
                records
                    .first()
                    .map(|r| r.cells.len().saturating_sub(skip))
                    .unwrap_or(0)
            } else {
                embedded_titles.len()
            }
        } else {
            supplied_columns.len()
        };

        let mut columns = Vec::with_capacity(column_count);
        for c in 0..column_count {
            let desc = supplied_columns.get(c).copied();
            let chain: Vec<&Map<String, Value>> = desc
                .into_iter()
                .chain(schema_desc)
                .chain(Some(table_desc))
                .chain(Some(group_desc))
                .collect();
            let embedded = embedded_titles.get(c).map(Vec::as_slice).unwrap_or(&[]);
            columns.push(self.build_column(
                c,
                skip,
                desc,
                &chain,
                embedded,
                default_language,
                warnings,
            )?);
        }

        let column_names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let primary_key = column_indexes(schema_desc, "primaryKey", &column_names);
        let row_title_columns = column_indexes(schema_desc, "rowTitles", &column_names);

        let mut fk_defs = Vec::new();
        if let Some(fks) = schema_desc
            .and_then(|s| s.get("foreignKeys"))
            .and_then(Value::as_array)
        {
            for fk in fks.iter().filter_map(Value::as_object) {
                let source_columns = names_of(fk.get("columnReference"))
                    .iter()
                    .filter_map(|n| {
                        column_names
                            .iter()
                            .position(|c| *c == n.as_str())
                            .map(ColumnIdx)
                    })
                    .collect();
                let reference = fk
                    .get("reference")
                    .and_then(Value::as_object)
                    .expect("validated by normalization");
                fk_defs.push(ForeignKeyDef {
                    source_columns,
                    resource: reference
                        .get("resource")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    schema_reference: reference
                        .get("schemaReference")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    referenced_columns: names_of(reference.get("columnReference")),
                });
            }
        }

        let non_virtual = columns.iter().filter(|c| !c.virtual_column).count();
        let mut rows = Vec::with_capacity(records.len());
        for (n, record) in records.iter().enumerate() {
            let number = n + 1;
            let provided = record.cells.len().saturating_sub(skip);
            if provided > non_virtual && non_virtual > 0 {
                warnings.push(Warning::new(
                    format!("tables.{}.rows.{number}", idx.0),
                    format!("row has {provided} cells, expected {non_virtual}; extras ignored"),
                ));
            } else if provided < non_virtual {
                warnings.push(Warning::new(
                    format!("tables.{}.rows.{number}", idx.0),
                    format!("row has {provided} cells, expected {non_virtual}; padded with empty cells"),
                ));
            }

            let mut cells = Vec::with_capacity(columns.len());
            for (c, column) in columns.iter().enumerate() {
                let raw = if column.virtual_column {
                    ""
                } else {
                    record
                        .cells
                        .get(skip + c)
                        .map(String::as_str)
                        .unwrap_or("")
                };
                let (value, errors) = parse_cell(column, raw);
                if self.strict && !errors.is_empty() {
                    return Err(TabularError::CellConversion {
                        column: column.name.clone(),
                        row: record.source_row,
                        message: errors.join("; "),
                    });
                }
                cells.push(Cell {
                    string_value: raw.to_string(),
                    value,
                    errors,
                    about_url: None,
                    property_url: None,
                    value_url: None,
                    table: idx,
                    column: ColumnIdx(c),
                    row: RowIdx(n),
                });
            }

            let mut row_vars = TemplateVars::new();
            row_vars.set("_row", number.to_string());
            row_vars.set("_sourceRow", record.source_row.to_string());
            for (c, cell) in cells.iter().enumerate() {
                if let Some(bound) = binding_string(&cell.value) {
                    row_vars.set(&columns[c].name, bound);
                }
            }
            for (c, cell) in cells.iter_mut().enumerate() {
                let column = &columns[c];
                let mut vars = row_vars.clone();
                vars.set("_column", column.number.to_string());
                vars.set("_sourceColumn", column.source_number.to_string());
                vars.set("_name", column.name.clone());
                cell.about_url = column
                    .about_url
                    .as_deref()
                    .and_then(|t| expand_and_resolve(t, &vars, &table_url));
                cell.property_url = column
                    .property_url
                    .as_deref()
                    .and_then(|t| expand_and_resolve(t, &vars, &table_url));
                cell.value_url = column
                    .value_url
                    .as_deref()
                    .and_then(|t| expand_and_resolve(t, &vars, &table_url));
            }

            let titles = row_title_columns
                .iter()
                .map(|c| cells[c.0].string_value.clone())
                .collect();
            rows.push(Row {
                number,
                source_number: record.source_row,
                cells,
                primary_key: primary_key.clone(),
                referenced_rows: Vec::new(),
                titles,
            });
        }

        self.check_primary_key(idx, &primary_key, &rows, warnings)?;

        warnings.append(&mut tokenizer.warnings);
        let mut comments = tokenizer.comments;
        comments.extend(notes_strings(table_desc));

        let table = Table {
            number: idx.0 + 1,
            url,
            columns,
            rows,
            primary_key,
            foreign_keys: Vec::new(),
            suppress_output: table_desc
                .get("suppressOutput")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            comments,
        };
        Ok((table, fk_defs, schema_id))
    }

    fn build_column(
        &self,
        position: usize,
        skip_columns: usize,
        desc: Option<&Map<String, Value>>,
        chain: &[&Map<String, Value>],
        embedded_titles: &[String],
        default_language: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<Column> {
        let number = position + 1;
        let name = desc
            .and_then(|d| d.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                embedded_titles
                    .first()
                    .map(|t| urlencoding::encode(t).into_owned())
            })
            .unwrap_or_else(|| format!("_col.{number}"));

        let mut column = Column::new(number, number + skip_columns, name);

        if let Some(titles) = desc.and_then(|d| d.get("titles")).and_then(Value::as_object) {
            for (tag, list) in titles {
                let list = list
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                column.titles.insert(tag.clone(), list);
            }
        } else if !embedded_titles.is_empty() {
            column
                .titles
                .insert(default_language.to_string(), embedded_titles.to_vec());
        }

        column.virtual_column = desc
            .and_then(|d| d.get("virtual"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        column.suppress_output = desc
            .and_then(|d| d.get("suppressOutput"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // inherited properties cascade column → schema → table → group
        if let Some(datatype) = lookup(chain, "datatype") {
            column.datatype =
                Datatype::from_value(datatype, &format!("columns.{position}.datatype"), warnings)?;
        }
        if let Some(default) = lookup(chain, "default").and_then(Value::as_str) {
            column.default = default.to_string();
        }
        column.lang = lookup(chain, "lang")
            .and_then(Value::as_str)
            .unwrap_or(default_language)
            .to_string();
        if let Some(nulls) = lookup(chain, "null").and_then(Value::as_array) {
            column.null_values = nulls
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        column.ordered = lookup(chain, "ordered")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        column.required = lookup(chain, "required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        column.separator = lookup(chain, "separator")
            .and_then(Value::as_str)
            .map(str::to_string);
        column.text_direction = lookup(chain, "textDirection")
            .and_then(Value::as_str)
            .unwrap_or("inherit")
            .to_string();
        column.about_url = non_empty(lookup(chain, "aboutUrl"));
        column.property_url = non_empty(lookup(chain, "propertyUrl"));
        column.value_url = non_empty(lookup(chain, "valueUrl"));

        Ok(column)
    }

    /// Primary-key tuples must be unique across the table's rows.
    fn check_primary_key(
        &self,
        idx: TableIdx,
        primary_key: &[ColumnIdx],
        rows: &[Row],
        warnings: &mut Vec<Warning>,
    ) -> Result<()> {
        if primary_key.is_empty() {
            return Ok(());
        }
        let mut seen: HashMap<Vec<&str>, usize> = HashMap::new();
        for row in rows {
            let key: Vec<&str> = primary_key
                .iter()
                .map(|c| row.cells[c.0].string_value.as_str())
                .collect();
            if let Some(previous) = seen.insert(key, row.number) {
                let message = format!(
                    "table {}: rows {previous} and {} share the same primary key",
                    idx.0 + 1,
                    row.number
                );
                if self.strict {
                    return Err(TabularError::ReferentialIntegrity(message));
                }
                warnings.push(Warning::new(format!("tables.{}.primaryKey", idx.0), message));
            }
        }
        Ok(())
    }

    /// Every foreign-key source row must match exactly one row in the
    /// referenced table.
    fn resolve_foreign_keys(
        &self,
        group: &mut TableGroup,
        fk_defs: Vec<Vec<ForeignKeyDef>>,
        schema_ids: &[Option<String>],
        warnings: &mut Vec<Warning>,
    ) -> Result<()> {
        let mut links: Vec<(usize, usize, usize, RowIdx)> = Vec::new();

        for (t, defs) in fk_defs.iter().enumerate() {
            for (f, def) in defs.iter().enumerate() {
                let referenced = self.find_referenced_table(group, schema_ids, def)?;
                let ref_table = &group.tables[referenced.0];
                let ref_columns: Vec<ColumnIdx> = def
                    .referenced_columns
                    .iter()
                    .map(|name| {
                        ref_table.column_by_name(name).ok_or_else(|| {
                            TabularError::Schema(format!(
                                "foreign key references unknown column '{name}' in table '{}'",
                                ref_table.url
                            ))
                        })
                    })
                    .collect::<Result<_>>()?;

                let mut index: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
                for (r, row) in ref_table.rows.iter().enumerate() {
                    let key: Vec<&str> = ref_columns
                        .iter()
                        .map(|c| row.cells[c.0].string_value.as_str())
                        .collect();
                    index.entry(key).or_default().push(r);
                }

                for row in &group.tables[t].rows {
                    let key: Vec<&str> = def
                        .source_columns
                        .iter()
                        .map(|c| row.cells[c.0].string_value.as_str())
                        .collect();
                    match index.get(&key).map(Vec::as_slice) {
                        Some([single]) => links.push((t, row.number - 1, f, RowIdx(*single))),
                        Some(multiple) => {
                            let message = format!(
                                "table {}: row {} foreign key matches {} rows in '{}'",
                                t + 1,
                                row.number,
                                multiple.len(),
                                ref_table.url
                            );
                            if self.strict {
                                return Err(TabularError::ReferentialIntegrity(message));
                            }
                            warnings.push(Warning::new(format!("tables.{t}.foreignKeys.{f}"), message));
                        }
                        None => {
                            let message = format!(
                                "table {}: row {} foreign key matches no row in '{}'",
                                t + 1,
                                row.number,
                                ref_table.url
                            );
                            if self.strict {
                                return Err(TabularError::ReferentialIntegrity(message));
                            }
                            warnings.push(Warning::new(format!("tables.{t}.foreignKeys.{f}"), message));
                        }
                    }
                }

                group.tables[t].foreign_keys.push(ForeignKey {
                    source_columns: def.source_columns.clone(),
                    referenced_table: referenced,
                    referenced_columns: ref_columns,
                });
            }
        }

        for (t, r, f, target) in links {
            group.tables[t].rows[r].referenced_rows.push((f, target));
        }
        Ok(())
    }

    fn find_referenced_table(
        &self,
        group: &TableGroup,
        schema_ids: &[Option<String>],
        def: &ForeignKeyDef,
    ) -> Result<TableIdx> {
        if let Some(resource) = &def.resource {
            return group.table_by_url(resource).ok_or_else(|| {
                TabularError::Schema(format!(
                    "foreign key references unknown table resource '{resource}'"
                ))
            });
        }
        let schema_reference = def
            .schema_reference
            .as_deref()
            .expect("validated by normalization");
        schema_ids
            .iter()
            .position(|id| id.as_deref() == Some(schema_reference))
            .map(TableIdx)
            .ok_or_else(|| {
                TabularError::Schema(format!(
                    "foreign key references unknown schema '{schema_reference}'"
                ))
            })
    }
}

fn lookup<'v>(chain: &[&'v Map<String, Value>], name: &str) -> Option<&'v Value> {
    chain.iter().find_map(|level| level.get(name))
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn names_of(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn column_indexes(
    schema: Option<&Map<String, Value>>,
    property: &str,
    column_names: &[&str],
) -> Vec<ColumnIdx> {
    names_of(schema.and_then(|s| s.get(property)))
        .iter()
        .filter_map(|name| {
            column_names
                .iter()
                .position(|c| *c == name.as_str())
                .map(ColumnIdx)
        })
        .collect()
}

fn notes_strings(desc: &Map<String, Value>) -> Vec<String> {
    desc.get("notes")
        .and_then(Value::as_array)
        .map(|notes| {
            notes
                .iter()
                .filter_map(|note| {
                    note.get("@value")
                        .and_then(Value::as_str)
                        .or_else(|| note.as_str())
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A table description as the header rows imply it: one column per data
/// column, titled by the header cells.
fn embedded_description(
    url: &str,
    embedded_titles: &[Vec<String>],
    default_language: &str,
) -> Map<String, Value> {
    let columns: Vec<Value> = embedded_titles
        .iter()
        .map(|titles| {
            if titles.is_empty() {
                json!({})
            } else {
                json!({"titles": {default_language: titles}})
            }
        })
        .collect();
    json!({"url": url, "tableSchema": {"columns": columns}})
        .as_object()
        .expect("object literal")
        .clone()
}

/// Parse one raw cell string under its column annotations: default
/// substitution, null matching, list splitting, then datatype parsing per
/// value. Returns the cell value and any conversion errors.
fn parse_cell(column: &Column, raw: &str) -> (CellValue, Vec<String>) {
    let mut errors = Vec::new();
    let effective = if raw.is_empty() {
        column.default.as_str()
    } else {
        raw
    };

    if let Some(separator) = &column.separator {
        // an empty string is an empty list, even when "" is a null value
        if effective.is_empty() {
            return (CellValue::List(Vec::new()), errors);
        }
        if column.null_values.iter().any(|n| n == effective) {
            if column.required {
                errors.push("required cell has a null value".to_string());
            }
            return (CellValue::Null, errors);
        }
        let mut items = Vec::new();
        for part in effective.split(separator.as_str()) {
            let part = if matches!(column.datatype.base, BaseType::String | BaseType::AnyAtomicType)
            {
                part
            } else {
                part.trim()
            };
            let part = if part.is_empty() {
                column.default.as_str()
            } else {
                part
            };
            // null list items are omitted, not carried as gaps
            if column.null_values.iter().any(|n| n == part) {
                continue;
            }
            let parsed = column.datatype.parse(part);
            errors.extend(parsed.errors);
            items.push(TypedValue::new(
                parsed.value,
                parsed.base,
                Some(column.lang.clone()),
            ));
        }
        return (CellValue::List(items), errors);
    }

    if column.null_values.iter().any(|n| n == effective) {
        if column.required {
            errors.push("required cell has a null value".to_string());
        }
        return (CellValue::Null, errors);
    }
    let parsed = column.datatype.parse(effective);
    errors.extend(parsed.errors);
    (
        CellValue::Single(TypedValue::new(
            parsed.value,
            parsed.base,
            Some(column.lang.clone()),
        )),
        errors,
    )
}

/// String form of a cell value for URI template variable binding.
fn binding_string(value: &CellValue) -> Option<String> {
    let render = |typed: &TypedValue| match &typed.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match value {
        CellValue::Null => None,
        CellValue::Single(typed) => Some(render(typed)),
        CellValue::List(items) => Some(
            items
                .iter()
                .map(render)
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}
