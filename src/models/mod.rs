//! Data models for the database access layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod driver;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use driver::{DriverDescriptor, DriverSummary};
pub use table::{ColumnRef, QUALIFIER_SEPARATOR, TableRef};
pub use value::{Attribute, CellValue, DataRow, ValueType};
