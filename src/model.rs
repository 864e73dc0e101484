//! Annotated tabular data model
//!
//! The object graph produced by annotation: table group → tables →
//! columns/rows → cells. The group owns everything beneath it; cells refer
//! back to their table, column and row through integer indexes rather than
//! owning pointers, so the group alone controls lifetime.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::datatypes::{BaseType, Datatype};

/// Index of a table within its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TableIdx(pub usize);

/// Index of a column within its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnIdx(pub usize);

/// Index of a row within its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RowIdx(pub usize);

/// A column annotation
#[derive(Debug, Clone)]
pub struct Column {
    /// 1-based position among the table's columns
    pub number: usize,
    /// 1-based position in the source file, counting skipped columns
    pub source_number: usize,
    pub name: String,
    /// Language tag → titles
    pub titles: HashMap<String, Vec<String>>,
    pub virtual_column: bool,
    pub suppress_output: bool,
    pub datatype: Datatype,
    pub default: String,
    pub lang: String,
    pub null_values: Vec<String>,
    pub ordered: bool,
    pub required: bool,
    pub separator: Option<String>,
    pub text_direction: String,
    pub about_url: Option<String>,
    pub property_url: Option<String>,
    pub value_url: Option<String>,
}

impl Column {
    pub fn new(number: usize, source_number: usize, name: String) -> Self {
        Self {
            number,
            source_number,
            name,
            titles: HashMap::new(),
            virtual_column: false,
            suppress_output: false,
            datatype: Datatype::string(),
            default: String::new(),
            lang: "und".to_string(),
            null_values: vec![String::new()],
            ordered: false,
            required: false,
            separator: None,
            text_direction: "inherit".to_string(),
            about_url: None,
            property_url: None,
            value_url: None,
        }
    }
}

/// A single typed cell value in wire shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedValue {
    #[serde(rename = "@value")]
    pub value: Value,
    #[serde(rename = "@type")]
    pub type_uri: String,
    #[serde(rename = "@language", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TypedValue {
    pub fn new(value: Value, base: BaseType, language: Option<String>) -> Self {
        // only untyped string literals carry a language tag
        let language = if base == BaseType::String { language } else { None };
        Self {
            value,
            type_uri: base.uri().to_string(),
            language,
        }
    }
}

/// A cell's parsed value: null, one typed value, or an ordered list
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Single(TypedValue),
    List(Vec<TypedValue>),
}

impl CellValue {
    /// Wire shape per the cell value contract: `null`, one object, or an
    /// ordered array of objects.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Single(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            CellValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

/// An annotated cell
#[derive(Debug, Clone)]
pub struct Cell {
    pub string_value: String,
    pub value: CellValue,
    pub errors: Vec<String>,
    pub about_url: Option<String>,
    pub property_url: Option<String>,
    pub value_url: Option<String>,
    pub table: TableIdx,
    pub column: ColumnIdx,
    pub row: RowIdx,
}

/// An annotated row
#[derive(Debug, Clone)]
pub struct Row {
    /// 1-based data row number
    pub number: usize,
    /// 1-based row number in the source file
    pub source_number: usize,
    /// One cell per column, in column order
    pub cells: Vec<Cell>,
    /// Cell positions forming the row's primary key
    pub primary_key: Vec<ColumnIdx>,
    /// Resolved foreign-key links: (index into the table's `foreign_keys`,
    /// row in the referenced table)
    pub referenced_rows: Vec<(usize, RowIdx)>,
    pub titles: Vec<String>,
}

/// A resolved foreign-key definition
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub source_columns: Vec<ColumnIdx>,
    pub referenced_table: TableIdx,
    pub referenced_columns: Vec<ColumnIdx>,
}

/// An annotated table
#[derive(Debug, Clone)]
pub struct Table {
    pub number: usize,
    pub url: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub primary_key: Vec<ColumnIdx>,
    pub foreign_keys: Vec<ForeignKey>,
    pub suppress_output: bool,
    /// Comment rows diverted during tokenizing, plus metadata notes
    pub comments: Vec<String>,
}

impl Table {
    pub fn column_by_name(&self, name: &str) -> Option<ColumnIdx> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(ColumnIdx)
    }
}

/// The fully annotated table group
#[derive(Debug, Clone, Default)]
pub struct TableGroup {
    pub tables: Vec<Table>,
    pub comments: Vec<String>,
}

impl TableGroup {
    pub fn table(&self, idx: TableIdx) -> &Table {
        &self.tables[idx.0]
    }

    pub fn table_by_url(&self, url: &str) -> Option<TableIdx> {
        self.tables.iter().position(|t| t.url == url).map(TableIdx)
    }

    /// Flat report of every cell with parse diagnostics
    pub fn error_report(&self) -> Vec<CellErrorReport> {
        let mut report = Vec::new();
        for table in &self.tables {
            for row in &table.rows {
                for cell in &row.cells {
                    if !cell.errors.is_empty() {
                        report.push(CellErrorReport {
                            column_name: table.columns[cell.column.0].name.clone(),
                            row_number: row.number,
                            errors: cell.errors.clone(),
                        });
                    }
                }
            }
        }
        report
    }
}

/// One entry in the flat error report exposed to collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellErrorReport {
    pub column_name: String,
    pub row_number: usize,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_value_wire_shape() {
        let v = TypedValue::new(json!("1"), BaseType::String, Some("und".to_string()));
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!({
                "@value": "1",
                "@type": "http://www.w3.org/2001/XMLSchema#string",
                "@language": "und"
            })
        );
    }

    #[test]
    fn test_typed_value_drops_language_for_typed_literals() {
        let v = TypedValue::new(json!(5), BaseType::Integer, Some("en".to_string()));
        assert!(v.language.is_none());
        assert_eq!(v.type_uri, "http://www.w3.org/2001/XMLSchema#integer");
    }

    #[test]
    fn test_cell_value_shapes() {
        assert_eq!(CellValue::Null.to_json(), Value::Null);
        let single = CellValue::Single(TypedValue::new(json!(true), BaseType::Boolean, None));
        assert!(single.to_json().is_object());
        let list = CellValue::List(vec![
            TypedValue::new(json!("a"), BaseType::String, None),
            TypedValue::new(json!("b"), BaseType::String, None),
        ]);
        assert_eq!(list.to_json().as_array().unwrap().len(), 2);
    }
}
