//! Uniform relational-database access layer.
//!
//! One surface over PostgreSQL, MySQL, and SQLite: a driver descriptor
//! registry, ontology-to-native type mapping built per connection,
//! dialect-aware SQL text generation, a connection handler for table
//! creation and batched loads with generated-key harvesting, and a
//! per-connection metadata cache.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;

pub use db::{ConnectionHandler, CreateTableOptions, MetadataCache, OverwritePolicy};
pub use error::{DbError, DbResult};
pub use models::{Attribute, CellValue, ColumnRef, DataRow, TableRef, ValueType};
pub use registry::DriverRegistry;
