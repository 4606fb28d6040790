//! Table and column value objects.
//!
//! `TableRef` and `ColumnRef` are immutable descriptions of database objects,
//! produced by metadata introspection or by callers naming a target table.
//! Identity of a `TableRef` is (catalog, schema, table); the free-text comment
//! does not participate in equality, hashing, or ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Separator between table and column in a qualified column alias.
pub const QUALIFIER_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableRef {
    /// Create a table reference with just a table name.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            catalog: None,
            comment: None,
        }
    }

    /// Set the schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the catalog name.
    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Attach a free-text comment. The comment is carried along but is not
    /// part of the reference's identity.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn identity(&self) -> (Option<&str>, Option<&str>, &str) {
        (
            self.catalog.as_deref(),
            self.schema.as_deref(),
            self.table.as_str(),
        )
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for TableRef {}

impl Hash for TableRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for TableRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.{}", schema, self.table)
        } else {
            write!(f, "{}", self.table)
        }
    }
}

/// A column as reported by introspection: owning table, name, and the
/// native type it was created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: TableRef,
    pub name: String,
    /// JDBC-style numeric type code reported by the driver.
    pub type_code: i32,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl ColumnRef {
    pub fn new(
        table: TableRef,
        name: impl Into<String>,
        type_code: i32,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            table,
            name: name.into(),
            type_code,
            type_name: type_name.into(),
            remarks: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    /// Bare column identifier, for single-table contexts.
    pub fn bare_name(&self) -> &str {
        &self.name
    }

    /// Qualified alias (`table__column`), unambiguous when columns from
    /// several tables are combined in one result.
    pub fn qualified_alias(&self) -> String {
        format!("{}{}{}", self.table.table, QUALIFIER_SEPARATOR, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_ref_identity_ignores_comment() {
        let a = TableRef::new("orders").with_schema("public");
        let b = TableRef::new("orders")
            .with_schema("public")
            .with_comment("loaded 2024-01-01");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_table_ref_differs_by_schema() {
        let a = TableRef::new("orders").with_schema("public");
        let b = TableRef::new("orders").with_schema("staging");
        assert_ne!(a, b);
    }

    #[test]
    fn test_table_ref_ordering() {
        let mut refs = vec![
            TableRef::new("b"),
            TableRef::new("a").with_schema("z"),
            TableRef::new("a"),
        ];
        refs.sort();
        // Unqualified tables sort before schema-qualified ones.
        assert_eq!(refs[0].table, "a");
        assert!(refs[0].schema.is_none());
        assert_eq!(refs[1].table, "b");
        assert_eq!(refs[2].schema.as_deref(), Some("z"));
    }

    #[test]
    fn test_qualified_alias() {
        let col = ColumnRef::new(TableRef::new("orders"), "total", 8, "DOUBLE");
        assert_eq!(col.bare_name(), "total");
        assert_eq!(col.qualified_alias(), "orders__total");
    }
}
