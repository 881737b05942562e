//! JSON schema sidecar
//!
//! Written next to the data of each table generation so the output can be
//! read without the engine's catalog:
//!
//! ```json
//! {
//!   "table name": "ORDERS",
//!   "generation id": 7,
//!   "columns": [
//!     { "name": "ID", "type": "BIGINT" }
//!   ]
//! }
//! ```

use serde::Serialize;

use export_protocol::TableSchema;

#[derive(Debug, Serialize)]
struct SchemaDocument<'a> {
    #[serde(rename = "table name")]
    table_name: &'a str,
    #[serde(rename = "generation id")]
    generation: i64,
    columns: Vec<ColumnEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ColumnEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    column_type: &'static str,
}

/// Render the sidecar for `schema`, listing columns from `first_column` on
pub fn render_schema(schema: &TableSchema, first_column: usize) -> serde_json::Result<String> {
    let document = SchemaDocument {
        table_name: &schema.table_name,
        generation: schema.generation,
        columns: schema
            .columns
            .iter()
            .skip(first_column)
            .map(|column| ColumnEntry {
                name: &column.name,
                column_type: column.column_type.as_str(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&document)
}

#[cfg(test)]
mod tests {
    use export_protocol::{ColumnInfo, ColumnType, NO_PARTITION_COLUMN};
    use serde_json::{Value, json};

    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(
            "ORDERS",
            7,
            NO_PARTITION_COLUMN,
            vec![
                ColumnInfo::new("TXN_ID", ColumnType::BigInt, 8),
                ColumnInfo::new("ID", ColumnType::BigInt, 8),
                ColumnInfo::new("NAME", ColumnType::String, 64),
            ],
        )
    }

    #[test]
    fn test_render_all_columns() {
        let text = render_schema(&schema(), 0).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            parsed,
            json!({
                "table name": "ORDERS",
                "generation id": 7,
                "columns": [
                    { "name": "TXN_ID", "type": "BIGINT" },
                    { "name": "ID", "type": "BIGINT" },
                    { "name": "NAME", "type": "VARCHAR" },
                ]
            })
        );
    }

    #[test]
    fn test_render_skips_leading_columns() {
        let text = render_schema(&schema(), 1).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["columns"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["columns"][0]["name"], "ID");
    }

    #[test]
    fn test_render_is_pretty() {
        let text = render_schema(&schema(), 0).unwrap();
        assert!(text.contains('\n'));
    }
}
