//! Dialect translation of relational query-builder output.
//!
//! The relational side hands over its generated SQL together with the
//! structural pieces the translator needs: the primary table, the joined
//! tables, and the ordered bind values for its `?` placeholders. The
//! translator qualifies every table reference against the target dataset
//! and inlines the bindings, because the warehouse dialect takes a single
//! SQL string.
//!
//! Translation is deliberately not a SQL parser: it handles the limited
//! query shapes the warehouse read path actually produces (selects,
//! simple joins, where-bindings). Inlined bindings are quoted but not
//! escaped — callers passing untrusted values inherit that injection
//! risk.

use serde::{Deserialize, Serialize};

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    String(String),
}

impl BindValue {
    /// Render the value for inlining: numerics bare, everything else
    /// single-quoted, NULL as the keyword.
    fn render(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => format!("'{}'", b),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s),
        }
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for BindValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for BindValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for BindValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// A join clause from the relational builder. Only the table reference
/// matters for translation; `"orders o"` names the table `orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinClause {
    /// Joined table reference, possibly alias-suffixed.
    pub table: String,
}

impl JoinClause {
    /// Create a join clause.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// The bare table name (first word of the reference).
    pub fn table_name(&self) -> &str {
        self.table.split_whitespace().next().unwrap_or(&self.table)
    }
}

/// The relational query builder's output: generated SQL plus the
/// structure needed to retarget it at the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Primary table.
    pub from: String,
    /// Joined tables.
    #[serde(default)]
    pub joins: Vec<JoinClause>,
    /// Parameter-bound SQL text.
    pub sql: String,
    /// Bind values, in placeholder order.
    #[serde(default)]
    pub bindings: Vec<BindValue>,
}

impl QueryDescriptor {
    /// Create a descriptor for a query over one table.
    pub fn new(from: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            joins: Vec::new(),
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    /// Add a joined table.
    pub fn join(mut self, table: impl Into<String>) -> Self {
        self.joins.push(JoinClause::new(table));
        self
    }

    /// Add a bind value.
    pub fn bind(mut self, value: impl Into<BindValue>) -> Self {
        self.bindings.push(value.into());
        self
    }
}

/// SQL input to the executor: a structured descriptor to translate, or a
/// raw string the caller has already qualified.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// Pre-qualified SQL; translation is skipped entirely.
    Raw(String),
    /// Builder output to translate.
    Query(QueryDescriptor),
}

impl From<&str> for QuerySource {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for QuerySource {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

impl From<QueryDescriptor> for QuerySource {
    fn from(query: QueryDescriptor) -> Self {
        Self::Query(query)
    }
}

/// Rewrites builder SQL into warehouse-qualified SQL.
#[derive(Debug, Clone)]
pub struct Translator {
    dataset: String,
}

impl Translator {
    /// Create a translator targeting the given dataset.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
        }
    }

    /// The dataset this translator qualifies against.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Translate a query source. Raw SQL passes through untouched.
    pub fn translate(&self, source: &QuerySource) -> String {
        match source {
            QuerySource::Raw(sql) => sql.clone(),
            QuerySource::Query(query) => self.translate_query(query),
        }
    }

    /// Translate builder output: qualify the primary and joined tables,
    /// then inline the bind values left to right.
    pub fn translate_query(&self, query: &QueryDescriptor) -> String {
        let mut sql = self.qualify_table(&query.sql, &query.from);
        for join in &query.joins {
            sql = self.qualify_table(&sql, join.table_name());
        }

        substitute_bindings(&sql, &query.bindings)
    }

    /// Qualify one table reference. The backtick-quoted form is rewritten
    /// in place; otherwise bare whole-word occurrences are prefixed.
    fn qualify_table(&self, sql: &str, table: &str) -> String {
        let quoted = format!("`{}`", table);
        if sql.contains(&quoted) {
            return sql.replace(&quoted, &format!("`{}.{}`", self.dataset, table));
        }

        replace_bare_table(sql, table, &format!("{}.{}", self.dataset, table))
    }
}

/// Replace whole-word occurrences of a table name, leaving qualified
/// references (`other.table`) and column qualifiers (`table.column`)
/// alone.
fn replace_bare_table(sql: &str, table: &str, replacement: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut pos = 0;

    while let Some(found) = sql[pos..].find(table) {
        let start = pos + found;
        let end = start + table.len();

        let prev_ok = start == 0 || !is_ident_boundary(bytes[start - 1]);
        let next_ok = end == sql.len() || !is_ident_boundary(bytes[end]);

        out.push_str(&sql[pos..start]);
        if prev_ok && next_ok {
            out.push_str(replacement);
        } else {
            out.push_str(table);
        }
        pos = end;
    }

    out.push_str(&sql[pos..]);
    out
}

fn is_ident_boundary(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'`'
}

/// Substitute each `?` placeholder, in order, with its rendered binding.
/// Placeholders beyond the binding list are left as-is.
fn substitute_bindings(sql: &str, bindings: &[BindValue]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut values = bindings.iter();

    for c in sql.chars() {
        if c == '?' {
            if let Some(value) = values.next() {
                out.push_str(&value.render());
                continue;
            }
        }
        out.push(c);
    }

    out
}
