//! Warehouse field schema model.

use serde::{Deserialize, Serialize};

/// Column types supported by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 64-bit integer.
    Integer,
    /// Double-precision float.
    Float,
    /// Boolean.
    Boolean,
    /// Absolute point in time.
    Timestamp,
    /// Civil date and time.
    Datetime,
    /// Civil time of day.
    Time,
    /// Nested record with its own sub-fields.
    Struct,
}

impl FieldType {
    /// The warehouse wire name for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
            Self::Datetime => "DATETIME",
            Self::Time => "TIME",
            Self::Struct => "STRUCT",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a column must carry a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    /// A value is required.
    Required,
    /// NULL is allowed (warehouse default).
    #[default]
    Nullable,
}

impl FieldMode {
    /// The warehouse wire name for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Nullable => "NULLABLE",
        }
    }
}

/// A single column in a warehouse table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Column mode.
    #[serde(default)]
    pub mode: FieldMode,
    /// Sub-fields for `STRUCT` columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
}

impl Field {
    /// Create a new nullable field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
            fields: None,
        }
    }

    /// Mark this field as required.
    pub fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }

    /// Mark this field as nullable.
    pub fn nullable(mut self) -> Self {
        self.mode = FieldMode::Nullable;
        self
    }

    /// Attach nested sub-fields (implies a `STRUCT` column).
    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// The implicit identity column every created table receives.
    pub fn implicit_id() -> Self {
        Field::new("id", FieldType::Integer).required()
    }
}

/// An ordered warehouse table schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Ordered column list.
    pub fields: Vec<Field>,
}

impl TableSchema {
    /// Create a schema from a field list, as given.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Create a schema with the implicit leading `id INTEGER REQUIRED`
    /// column, unless the caller already defines an `id` field.
    pub fn with_implicit_id(fields: Vec<Field>) -> Self {
        if fields.iter().any(|f| f.name == "id") {
            return Self { fields };
        }

        let mut all = Vec::with_capacity(fields.len() + 1);
        all.push(Field::implicit_id());
        all.extend(fields);
        Self { fields: all }
    }

    /// Whether the schema defines an `id` column.
    pub fn has_id(&self) -> bool {
        self.fields.iter().any(|f| f.name == "id")
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
