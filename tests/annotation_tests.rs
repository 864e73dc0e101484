//! End-to-end annotation tests: metadata plus source text in, annotated
//! table group out

use csvw_tabular::fetch::NoFetch;
use csvw_tabular::resolver::{Resolver, TableSource};
use csvw_tabular::{normalize_document, BaseType, CellValue, TabularError, Warning};
use serde_json::{json, Value};

const LOCATION: &str = "http://example.org/metadata.json";

fn resolver() -> Resolver<'static> {
    Resolver::new(&NoFetch)
}

mod end_to_end_tests {
    use super::*;

    #[test]
    fn test_default_dialect_string_cells() {
        let outcome = resolver()
            .resolve_text("http://example.org/grid.csv", "a,b\n1,2\n3,4\n")
            .unwrap();
        let table = &outcome.group.tables[0];
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.rows.len(), 2);
        let cell = &table.rows[0].cells[0];
        assert_eq!(
            cell.value.to_json(),
            json!({
                "@value": "1",
                "@type": "http://www.w3.org/2001/XMLSchema#string",
                "@language": "und"
            })
        );
    }

    #[test]
    fn test_typed_columns_and_formats() {
        let metadata = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "measurements.csv",
            "tableSchema": {"columns": [
                {"name": "when", "datatype": {"base": "date", "format": "M/d/yyyy"}},
                {"name": "count", "datatype": {"base": "integer", "minimum": 0}},
                {"name": "ok", "datatype": {"base": "boolean", "format": "Y|N"}}
            ]}
        });
        let outcome = resolver()
            .resolve(
                metadata,
                LOCATION,
                &[TableSource {
                    url: "http://example.org/measurements.csv",
                    text: "when,count,ok\n3/22/2015,12,Y\n",
                }],
            )
            .unwrap();
        let row = &outcome.group.tables[0].rows[0];
        match &row.cells[0].value {
            CellValue::Single(v) => {
                assert_eq!(v.value, json!("2015-03-22"));
                assert_eq!(v.type_uri, BaseType::Date.uri());
            }
            other => panic!("expected date value, got {other:?}"),
        }
        match &row.cells[1].value {
            CellValue::Single(v) => assert_eq!(v.value, json!(12)),
            other => panic!("expected integer value, got {other:?}"),
        }
        match &row.cells[2].value {
            CellValue::Single(v) => assert_eq!(v.value, json!(true)),
            other => panic!("expected boolean value, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_and_skipped_rows() {
        let metadata = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "dialect": {"skipRows": 1, "commentPrefix": "#"}
        });
        let outcome = resolver()
            .resolve(
                metadata,
                LOCATION,
                &[TableSource {
                    url: "http://example.org/data.csv",
                    text: "# generated 2015-01-01\nid,label\n1,one\n",
                }],
            )
            .unwrap();
        let table = &outcome.group.tables[0];
        assert_eq!(table.comments, vec!["generated 2015-01-01"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].cells[1].string_value, "one");
    }

    #[test]
    fn test_error_report_collects_cell_failures() {
        let metadata = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "data.csv",
            "tableSchema": {"columns": [
                {"name": "n", "datatype": "integer"}
            ]}
        });
        let outcome = resolver()
            .resolve(
                metadata,
                LOCATION,
                &[TableSource {
                    url: "http://example.org/data.csv",
                    text: "n\n1\nx\n3\n",
                }],
            )
            .unwrap();
        let report = outcome.group.error_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].column_name, "n");
        assert_eq!(report[0].row_number, 2);
    }
}

mod strict_mode_tests {
    use super::*;

    fn keyed_metadata() -> Value {
        json!({
            "@context": "http://www.w3.org/ns/csvw",
            "tables": [
                {
                    "url": "countries.csv",
                    "tableSchema": {
                        "columns": [{"name": "code"}, {"name": "name"}],
                        "primaryKey": "code"
                    }
                },
                {
                    "url": "cities.csv",
                    "tableSchema": {
                        "columns": [{"name": "city"}, {"name": "country"}],
                        "foreignKeys": [{
                            "columnReference": "country",
                            "reference": {
                                "resource": "countries.csv",
                                "columnReference": "code"
                            }
                        }]
                    }
                }
            ]
        })
    }

    #[test]
    fn test_valid_keys_pass_in_strict_mode() {
        let outcome = resolver()
            .strict(true)
            .resolve(
                keyed_metadata(),
                LOCATION,
                &[
                    TableSource {
                        url: "http://example.org/countries.csv",
                        text: "code,name\nAF,Afghanistan\nAL,Albania\n",
                    },
                    TableSource {
                        url: "http://example.org/cities.csv",
                        text: "city,country\nKabul,AF\n",
                    },
                ],
            )
            .unwrap();
        let cities = &outcome.group.tables[1];
        assert_eq!(cities.rows[0].referenced_rows.len(), 1);
    }

    #[test]
    fn test_duplicate_primary_key_fatal_in_strict_mode() {
        let result = resolver().strict(true).resolve(
            keyed_metadata(),
            LOCATION,
            &[
                TableSource {
                    url: "http://example.org/countries.csv",
                    text: "code,name\nAF,Afghanistan\nAF,Again\n",
                },
                TableSource {
                    url: "http://example.org/cities.csv",
                    text: "city,country\nKabul,AF\n",
                },
            ],
        );
        assert!(matches!(
            result,
            Err(TabularError::ReferentialIntegrity(_))
        ));
    }

    #[test]
    fn test_dangling_foreign_key_warns_in_lenient_mode() {
        let outcome = resolver()
            .resolve(
                keyed_metadata(),
                LOCATION,
                &[
                    TableSource {
                        url: "http://example.org/countries.csv",
                        text: "code,name\nAF,Afghanistan\n",
                    },
                    TableSource {
                        url: "http://example.org/cities.csv",
                        text: "city,country\nTirana,AL\n",
                    },
                ],
            )
            .unwrap();
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("matches no row")));
        assert!(outcome.group.tables[1].rows[0].referenced_rows.is_empty());
    }

    #[test]
    fn test_malformed_quoting_always_fatal() {
        let result = resolver().resolve_text("http://example.org/bad.csv", "a,b\n\"x,y\nz");
        assert!(matches!(result, Err(TabularError::Tokenize { .. })));
    }
}

mod normalization_tests {
    use super::*;

    #[test]
    fn test_normalization_is_idempotent() {
        let mut doc = json!({
            "@context": ["http://www.w3.org/ns/csvw", {"@language": "en"}],
            "tables": [{
                "url": "tree-ops.csv",
                "dc:title": "Tree Operations",
                "dialect": {"trim": true},
                "tableSchema": {
                    "columns": [
                        {"titles": "GID", "datatype": "string", "required": true},
                        {"titles": ["On Street", "Street"]},
                        {"titles": "Species", "datatype": {"base": "string"}}
                    ],
                    "primaryKey": "GID",
                    "aboutUrl": "#gid-{GID}"
                }
            }]
        });
        let mut warnings = Vec::new();
        normalize_document(&mut doc, LOCATION, &NoFetch, &mut warnings).unwrap();
        let once = doc.clone();
        let mut warnings2: Vec<Warning> = Vec::new();
        normalize_document(&mut doc, LOCATION, &NoFetch, &mut warnings2).unwrap();
        assert_eq!(once, doc);
        assert!(warnings2.is_empty());
    }

    #[test]
    fn test_titles_and_names_from_default_language() {
        let mut doc = json!({
            "@context": ["http://www.w3.org/ns/csvw", {"@language": "en"}],
            "url": "data.csv",
            "tableSchema": {"columns": [{"titles": "Given Name"}]}
        });
        let mut warnings = Vec::new();
        normalize_document(&mut doc, LOCATION, &NoFetch, &mut warnings).unwrap();
        let column = &doc["tableSchema"]["columns"][0];
        assert_eq!(column["titles"], json!({"en": ["Given Name"]}));
        assert_eq!(column["name"], json!("Given%20Name"));
    }

    #[test]
    fn test_link_resolution_against_base() {
        let mut doc = json!({
            "@context": ["http://www.w3.org/ns/csvw", {"@base": "http://data.example.org/"}],
            "url": "observations.csv"
        });
        let mut warnings = Vec::new();
        normalize_document(&mut doc, LOCATION, &NoFetch, &mut warnings).unwrap();
        assert_eq!(doc["url"], json!("http://data.example.org/observations.csv"));
    }
}

mod inheritance_tests {
    use super::*;

    #[test]
    fn test_inherited_properties_cascade_to_columns() {
        let metadata = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "tables": [{
                "url": "data.csv",
                "null": "NULL",
                "tableSchema": {
                    "datatype": "integer",
                    "columns": [
                        {"name": "a"},
                        {"name": "b", "datatype": "string", "null": "-"}
                    ]
                }
            }]
        });
        let outcome = resolver()
            .resolve(
                metadata,
                LOCATION,
                &[TableSource {
                    url: "http://example.org/data.csv",
                    text: "a,b\n5,NULL\nNULL,-\n",
                }],
            )
            .unwrap();
        let table = &outcome.group.tables[0];
        // column a inherits integer from the schema and NULL from the table
        assert_eq!(table.columns[0].datatype.base, BaseType::Integer);
        assert_eq!(table.columns[0].null_values, vec!["NULL"]);
        assert_eq!(table.rows[1].cells[0].value, CellValue::Null);
        // column b overrides both
        assert_eq!(table.columns[1].datatype.base, BaseType::String);
        match &table.rows[0].cells[1].value {
            CellValue::Single(v) => assert_eq!(v.value, json!("NULL")),
            other => panic!("expected string value, got {other:?}"),
        }
        assert_eq!(table.rows[1].cells[1].value, CellValue::Null);
    }

    #[test]
    fn test_group_level_schema_applies_to_tables() {
        let metadata = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "tableSchema": {"columns": [
                {"name": "id", "datatype": "integer"}
            ]},
            "tables": [{"url": "data.csv"}]
        });
        let outcome = resolver()
            .resolve(
                metadata,
                LOCATION,
                &[TableSource {
                    url: "http://example.org/data.csv",
                    text: "id\n7\n",
                }],
            )
            .unwrap();
        let table = &outcome.group.tables[0];
        assert_eq!(table.columns[0].name, "id");
        match &table.rows[0].cells[0].value {
            CellValue::Single(v) => assert_eq!(v.value, json!(7)),
            other => panic!("expected integer value, got {other:?}"),
        }
    }
}
