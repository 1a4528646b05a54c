//! Source column descriptors.

use serde::{Deserialize, Serialize};

/// A column as reported by the relational store's introspection
/// (`DESCRIBE <table>` or equivalent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Column name.
    pub name: String,
    /// Raw source type text, e.g. `int(11)` or `varchar(255)`.
    pub column_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl SourceColumn {
    /// Create a new source column descriptor.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            nullable,
        }
    }

    /// The type family: the text before any length/precision suffix,
    /// trimmed and lowercased. `int(11) unsigned` yields `int`.
    pub fn family(&self) -> String {
        self.column_type
            .split('(')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }
}
