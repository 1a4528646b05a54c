//! # rowlake-schema
//!
//! Field schemas for the columnar warehouse and the type mapping engine
//! that produces them from relational column metadata.
//!
//! This crate provides:
//! - The warehouse field model ([`Field`], [`FieldType`], [`FieldMode`],
//!   [`TableSchema`]) including the implicit leading `id` field every
//!   created table receives
//! - Source column descriptors ([`SourceColumn`]) as returned by a
//!   `DESCRIBE`-style introspection of the relational store
//! - The mapping rules from source type families to warehouse types
//!   ([`map_columns`]), with explicit [`StructHints`] for JSON columns
//! - Struct inference for nested insert payloads ([`infer_struct`])
//! - A TTL cache for mapped table schemas ([`CachedMapper`]) — source
//!   schemas change rarely, so mappings are reused for days at a time
//!
//! JSON columns are the one deliberate gap: without a struct hint the
//! column has no inferable shape, so it is skipped rather than guessed.

pub mod cache;
pub mod field;
pub mod mapping;
pub mod source;

// Re-exports
pub use cache::{CacheStats, CachedMapper, DEFAULT_MAPPING_TTL};
pub use field::{Field, FieldMode, FieldType, TableSchema};
pub use mapping::{infer_struct, map_columns, StructHints};
pub use source::SourceColumn;
