//! Mapping from relational column metadata to warehouse fields.

use std::collections::HashMap;

use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::field::{Field, FieldMode, FieldType};
use crate::source::SourceColumn;

/// Explicit nested-field schemas for JSON columns, keyed by column name.
///
/// JSON columns carry no inferable structure, so a column without a hint
/// here is skipped by [`map_columns`] rather than mapped.
#[derive(Debug, Clone, Default)]
pub struct StructHints {
    hints: HashMap<String, Vec<Field>>,
}

impl StructHints {
    /// Create an empty hint set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the nested schema for a JSON column.
    pub fn hint(mut self, column: impl Into<String>, fields: Vec<Field>) -> Self {
        self.hints.insert(column.into(), fields);
        self
    }

    /// Look up the nested schema for a column.
    pub fn get(&self, column: &str) -> Option<&Vec<Field>> {
        self.hints.get(column)
    }

    /// Whether no hints were supplied.
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

/// Map source columns to warehouse fields.
///
/// Integer, boolean and date family types map deterministically; JSON
/// columns map to `STRUCT` only when a hint supplies their shape and are
/// skipped otherwise; everything unrecognized falls back to `STRING`.
pub fn map_columns(columns: &[SourceColumn], hints: &StructHints) -> Vec<Field> {
    let mut fields = Vec::with_capacity(columns.len());

    for column in columns {
        let mut nested = None;
        let field_type = match column.family().as_str() {
            "timestamp" => FieldType::Timestamp,
            "int" | "tinyint" | "bigint" | "smallint" | "integer" => FieldType::Integer,
            "boolean" => FieldType::Boolean,
            "date" | "datetime" => FieldType::Datetime,
            "decimal" | "float" | "double" => FieldType::Float,
            "time" => FieldType::Time,
            "json" => match hints.get(&column.name) {
                Some(shape) => {
                    nested = Some(shape.clone());
                    FieldType::Struct
                }
                None => {
                    debug!(column = %column.name, "skipping JSON column without a struct hint");
                    continue;
                }
            },
            _ => FieldType::String,
        };

        let mode = if column.nullable {
            FieldMode::Nullable
        } else {
            FieldMode::Required
        };

        fields.push(Field {
            name: column.name.clone(),
            field_type,
            mode,
            fields: nested,
        });
    }

    fields
}

/// Infer a `STRUCT` sub-schema from a nested insert payload.
///
/// Field types follow the JSON value kinds; nested objects recurse into
/// further structs. Inferred fields are nullable, since a later row may
/// omit any of them.
pub fn infer_struct(map: &JsonMap<String, JsonValue>) -> Vec<Field> {
    map.iter()
        .map(|(name, value)| match value {
            JsonValue::Bool(_) => Field::new(name, FieldType::Boolean),
            JsonValue::Number(n) if n.is_f64() => Field::new(name, FieldType::Float),
            JsonValue::Number(_) => Field::new(name, FieldType::Integer),
            JsonValue::Object(inner) => {
                Field::new(name, FieldType::Struct).with_fields(infer_struct(inner))
            }
            // Arrays and nulls have no better representation than text.
            _ => Field::new(name, FieldType::String),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn columns() -> Vec<SourceColumn> {
        vec![
            SourceColumn::new("id", "bigint(20)", false),
            SourceColumn::new("username", "varchar(255)", false),
            SourceColumn::new("active", "boolean", true),
            SourceColumn::new("balance", "decimal(10,2)", true),
            SourceColumn::new("created_at", "timestamp", true),
            SourceColumn::new("birthday", "date", true),
            SourceColumn::new("wake_at", "time", true),
        ]
    }

    #[test]
    fn test_map_columns_type_table() {
        let fields = map_columns(&columns(), &StructHints::new());
        let types: Vec<FieldType> = fields.iter().map(|f| f.field_type).collect();

        assert_eq!(
            types,
            vec![
                FieldType::Integer,
                FieldType::String,
                FieldType::Boolean,
                FieldType::Float,
                FieldType::Timestamp,
                FieldType::Datetime,
                FieldType::Time,
            ]
        );
    }

    #[test]
    fn test_map_columns_modes() {
        let fields = map_columns(&columns(), &StructHints::new());
        assert_eq!(fields[0].mode, FieldMode::Required);
        assert_eq!(fields[2].mode, FieldMode::Nullable);
    }

    #[test]
    fn test_json_without_hint_is_skipped() {
        let cols = vec![
            SourceColumn::new("id", "int(11)", false),
            SourceColumn::new("payload", "json", true),
        ];

        let fields = map_columns(&cols, &StructHints::new());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "id");
    }

    #[test]
    fn test_json_with_hint_maps_to_struct() {
        let cols = vec![SourceColumn::new("payload", "json", true)];
        let hints = StructHints::new().hint(
            "payload",
            vec![Field::new("kind", FieldType::String).required()],
        );

        let fields = map_columns(&cols, &hints);
        assert_eq!(fields[0].field_type, FieldType::Struct);
        assert_eq!(fields[0].fields.as_ref().unwrap()[0].name, "kind");
    }

    #[test]
    fn test_unknown_family_falls_back_to_string() {
        let cols = vec![SourceColumn::new("blob_col", "mediumblob", true)];
        let fields = map_columns(&cols, &StructHints::new());
        assert_eq!(fields[0].field_type, FieldType::String);
    }

    #[test]
    fn test_infer_struct_value_kinds() {
        let payload = json!({
            "name": "widget",
            "count": 3,
            "price": 9.5,
            "active": true,
            "meta": { "origin": "import" }
        });

        let fields = infer_struct(payload.as_object().unwrap());
        let by_name: HashMap<&str, &Field> =
            fields.iter().map(|f| (f.name.as_str(), f)).collect();

        assert_eq!(by_name["name"].field_type, FieldType::String);
        assert_eq!(by_name["count"].field_type, FieldType::Integer);
        assert_eq!(by_name["price"].field_type, FieldType::Float);
        assert_eq!(by_name["active"].field_type, FieldType::Boolean);
        assert_eq!(by_name["meta"].field_type, FieldType::Struct);
        assert_eq!(
            by_name["meta"].fields.as_ref().unwrap()[0].name,
            "origin"
        );
    }
}
