//! Ontology to native SQL type mapping.
//!
//! A `TypeMapper` is built once per connection. It indexes the native types
//! the database actually supports, then resolves each ontology value type to
//! its preferred native type by walking a fixed fallback list. Ontology
//! types without a direct mapping climb their parent links toward the root.

use crate::db::connection::{DatabaseType, DbConn};
use crate::error::{DbError, DbResult};
use crate::models::value::ValueType;
use std::collections::HashMap;
use tracing::{debug, warn};

/// JDBC-style numeric SQL type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlTypeCode {
    Char,
    Numeric,
    Integer,
    Float,
    Real,
    Double,
    Varchar,
    Boolean,
    BigInt,
    LongVarchar,
    LongNVarchar,
    Binary,
    Date,
    Time,
    Timestamp,
    Blob,
    Clob,
}

impl SqlTypeCode {
    /// The numeric code as drivers report it.
    pub const fn code(self) -> i32 {
        match self {
            SqlTypeCode::Char => 1,
            SqlTypeCode::Numeric => 2,
            SqlTypeCode::Integer => 4,
            SqlTypeCode::Float => 6,
            SqlTypeCode::Real => 7,
            SqlTypeCode::Double => 8,
            SqlTypeCode::Varchar => 12,
            SqlTypeCode::Boolean => 16,
            SqlTypeCode::BigInt => -5,
            SqlTypeCode::LongVarchar => -1,
            SqlTypeCode::LongNVarchar => -16,
            SqlTypeCode::Binary => -2,
            SqlTypeCode::Date => 91,
            SqlTypeCode::Time => 92,
            SqlTypeCode::Timestamp => 93,
            SqlTypeCode::Blob => 2004,
            SqlTypeCode::Clob => 2005,
        }
    }

    /// Classify a native type name into a code. Length suffixes like
    /// `VARCHAR(255)` are stripped before matching.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let normalized = normalize_type_name(name);
        match normalized.as_str() {
            "CHAR" | "BPCHAR" | "CHARACTER" | "NCHAR" => Some(SqlTypeCode::Char),
            "NUMERIC" | "DECIMAL" | "NUMBER" => Some(SqlTypeCode::Numeric),
            "INT" | "INT4" | "INTEGER" | "MEDIUMINT" | "SMALLINT" | "INT2" | "TINYINT" => {
                Some(SqlTypeCode::Integer)
            }
            "FLOAT" | "FLOAT4" => Some(SqlTypeCode::Float),
            "REAL" => Some(SqlTypeCode::Real),
            "DOUBLE" | "FLOAT8" | "DOUBLE PRECISION" => Some(SqlTypeCode::Double),
            "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" => Some(SqlTypeCode::Varchar),
            "BOOL" | "BOOLEAN" => Some(SqlTypeCode::Boolean),
            "BIGINT" | "INT8" => Some(SqlTypeCode::BigInt),
            "TEXT" | "LONGVARCHAR" | "MEDIUMTEXT" => Some(SqlTypeCode::LongVarchar),
            "NTEXT" | "LONGNVARCHAR" => Some(SqlTypeCode::LongNVarchar),
            "BINARY" | "VARBINARY" | "BYTEA" => Some(SqlTypeCode::Binary),
            "DATE" => Some(SqlTypeCode::Date),
            "TIME" => Some(SqlTypeCode::Time),
            "TIMESTAMP" | "DATETIME" | "TIMESTAMPTZ" => Some(SqlTypeCode::Timestamp),
            "BLOB" | "LONGBLOB" => Some(SqlTypeCode::Blob),
            "CLOB" | "LONGTEXT" => Some(SqlTypeCode::Clob),
            _ => None,
        }
    }
}

/// Uppercase a native type name and strip any parenthesized length suffix.
pub fn normalize_type_name(name: &str) -> String {
    let trimmed = match name.find('(') {
        Some(idx) => &name[..idx],
        None => name,
    };
    trimmed.trim().to_uppercase()
}

/// One supported native type, as reported by (or known for) the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTypeSyntax {
    pub name: String,
    pub code: SqlTypeCode,
    /// Maximum length/precision, when the type has one.
    pub precision: Option<u32>,
    pub literal_prefix: Option<String>,
    pub literal_suffix: Option<String>,
}

impl NativeTypeSyntax {
    pub fn new(name: impl Into<String>, code: SqlTypeCode) -> Self {
        Self {
            name: name.into(),
            code,
            precision: None,
            literal_prefix: None,
            literal_suffix: None,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_literal_quotes(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.literal_prefix = Some(prefix.into());
        self.literal_suffix = Some(suffix.into());
        self
    }

    /// Whether the type takes a length argument in DDL.
    pub fn is_sized(&self) -> bool {
        matches!(self.code, SqlTypeCode::Varchar | SqlTypeCode::Char)
    }
}

/// Preferred native type codes per ontology type, tried in order. The first
/// code the database supports wins.
pub fn fallback_order(value_type: ValueType) -> &'static [SqlTypeCode] {
    use SqlTypeCode::*;
    match value_type {
        ValueType::Text => &[Clob, Blob, LongVarchar, LongNVarchar, Varchar],
        ValueType::Nominal => &[Varchar, LongVarchar, Clob],
        ValueType::Binominal => &[Varchar, Char, LongVarchar],
        ValueType::Integer => &[Integer, BigInt, Numeric, Double],
        ValueType::Real => &[Double, Real, Float, Numeric],
        ValueType::Numerical => &[Double, Numeric, Real, Float],
        ValueType::Date => &[Date, Timestamp],
        ValueType::Time => &[Time, Timestamp],
        ValueType::DateTime => &[Timestamp, Date],
        ValueType::AttributeValue => &[Varchar, LongVarchar, Clob],
    }
}

const ALL_VALUE_TYPES: &[ValueType] = &[
    ValueType::AttributeValue,
    ValueType::Nominal,
    ValueType::Binominal,
    ValueType::Text,
    ValueType::Numerical,
    ValueType::Integer,
    ValueType::Real,
    ValueType::DateTime,
    ValueType::Date,
    ValueType::Time,
];

/// Maps ontology value types onto the native types of one connection.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    mappings: HashMap<ValueType, NativeTypeSyntax>,
}

impl TypeMapper {
    /// Build a mapper from a live connection, reading the type catalog once.
    pub async fn build(conn: &mut DbConn) -> DbResult<Self> {
        let catalog = match conn.db_type() {
            DatabaseType::PostgreSQL => postgres_catalog(conn).await?,
            DatabaseType::MySQL => builtin_mysql_catalog(),
            DatabaseType::SQLite => builtin_sqlite_catalog(),
        };
        Ok(Self::from_catalog(catalog))
    }

    /// Build from an explicit native type catalog.
    pub fn from_catalog(catalog: Vec<NativeTypeSyntax>) -> Self {
        // First syntax registered per code wins.
        let mut by_code: HashMap<SqlTypeCode, NativeTypeSyntax> = HashMap::new();
        for syntax in catalog {
            by_code.entry(syntax.code).or_insert(syntax);
        }

        let mut mappings = HashMap::new();
        for &value_type in ALL_VALUE_TYPES {
            let chosen = fallback_order(value_type)
                .iter()
                .find_map(|code| by_code.get(code));
            match chosen {
                Some(syntax) => {
                    debug!(
                        value_type = ?value_type,
                        native = %syntax.name,
                        "Mapped ontology type"
                    );
                    mappings.insert(value_type, syntax.clone());
                }
                None => {
                    warn!(
                        value_type = ?value_type,
                        "No supported native type; columns of this type will fail at creation"
                    );
                }
            }
        }
        Self { mappings }
    }

    /// Resolve an ontology type to its native type, climbing parent links
    /// when the type itself has no mapping.
    pub fn resolve(&self, value_type: ValueType) -> DbResult<&NativeTypeSyntax> {
        let mut current = value_type;
        loop {
            if let Some(syntax) = self.mappings.get(&current) {
                return Ok(syntax);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => {
                    return Err(DbError::type_mapping(
                        "no native SQL type supported by this database",
                        format!("{:?}", value_type),
                    ));
                }
            }
        }
    }

    /// Direct mapping lookup without the ancestor climb.
    pub fn direct(&self, value_type: ValueType) -> Option<&NativeTypeSyntax> {
        self.mappings.get(&value_type)
    }
}

/// Read the supported base types from the PostgreSQL catalog.
async fn postgres_catalog(conn: &mut DbConn) -> DbResult<Vec<NativeTypeSyntax>> {
    let rows = conn
        .fetch_string_rows(
            "SELECT typname FROM pg_catalog.pg_type WHERE typtype = 'b'",
            &[],
        )
        .await?;
    let mut catalog = Vec::new();
    for row in rows {
        let Some(Some(name)) = row.into_iter().next() else {
            continue;
        };
        if let Some(syntax) = postgres_syntax(&name) {
            catalog.push(syntax);
        }
    }
    Ok(catalog)
}

fn postgres_syntax(typname: &str) -> Option<NativeTypeSyntax> {
    use SqlTypeCode::*;
    let syntax = match typname {
        "varchar" => NativeTypeSyntax::new("VARCHAR", Varchar)
            .with_precision(10_485_760)
            .with_literal_quotes("'", "'"),
        "bpchar" => NativeTypeSyntax::new("CHAR", Char)
            .with_precision(10_485_760)
            .with_literal_quotes("'", "'"),
        "text" => NativeTypeSyntax::new("TEXT", LongVarchar).with_literal_quotes("'", "'"),
        "int4" => NativeTypeSyntax::new("INTEGER", Integer),
        "int8" => NativeTypeSyntax::new("BIGINT", BigInt),
        "float4" => NativeTypeSyntax::new("REAL", Real),
        "float8" => NativeTypeSyntax::new("DOUBLE PRECISION", Double),
        "numeric" => NativeTypeSyntax::new("NUMERIC", Numeric).with_precision(1000),
        "bool" => NativeTypeSyntax::new("BOOLEAN", Boolean),
        "date" => NativeTypeSyntax::new("DATE", Date).with_literal_quotes("'", "'"),
        "time" => NativeTypeSyntax::new("TIME", Time).with_literal_quotes("'", "'"),
        "timestamp" => NativeTypeSyntax::new("TIMESTAMP", Timestamp).with_literal_quotes("'", "'"),
        "bytea" => NativeTypeSyntax::new("BYTEA", Binary),
        _ => return None,
    };
    Some(syntax)
}

/// MySQL's type set is fixed; there is no queryable catalog of base types.
fn builtin_mysql_catalog() -> Vec<NativeTypeSyntax> {
    use SqlTypeCode::*;
    vec![
        NativeTypeSyntax::new("VARCHAR", Varchar)
            .with_precision(65_535)
            .with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("CHAR", Char)
            .with_precision(255)
            .with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("TEXT", LongVarchar).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("LONGTEXT", Clob).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("BLOB", Blob),
        NativeTypeSyntax::new("INT", Integer),
        NativeTypeSyntax::new("BIGINT", BigInt),
        NativeTypeSyntax::new("DOUBLE", Double),
        NativeTypeSyntax::new("FLOAT", Float),
        NativeTypeSyntax::new("DECIMAL", Numeric).with_precision(65),
        NativeTypeSyntax::new("BOOLEAN", Boolean),
        NativeTypeSyntax::new("DATE", Date).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("TIME", Time).with_literal_quotes("'", "'"),
        // DATETIME over TIMESTAMP: no zone conversion, no auto-update.
        NativeTypeSyntax::new("DATETIME", Timestamp).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("VARBINARY", Binary).with_precision(65_535),
    ]
}

/// SQLite accepts nearly any type name and assigns affinities; this is the
/// conventional subset.
fn builtin_sqlite_catalog() -> Vec<NativeTypeSyntax> {
    use SqlTypeCode::*;
    vec![
        NativeTypeSyntax::new("VARCHAR", Varchar)
            .with_precision(2_000_000_000)
            .with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("CHAR", Char)
            .with_precision(2_000_000_000)
            .with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("TEXT", LongVarchar).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("CLOB", Clob).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("BLOB", Blob),
        NativeTypeSyntax::new("INTEGER", Integer),
        NativeTypeSyntax::new("BIGINT", BigInt),
        NativeTypeSyntax::new("DOUBLE", Double),
        NativeTypeSyntax::new("REAL", Real),
        NativeTypeSyntax::new("FLOAT", Float),
        NativeTypeSyntax::new("NUMERIC", Numeric),
        NativeTypeSyntax::new("BOOLEAN", Boolean),
        NativeTypeSyntax::new("DATE", Date).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("TIME", Time).with_literal_quotes("'", "'"),
        NativeTypeSyntax::new("TIMESTAMP", Timestamp).with_literal_quotes("'", "'"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(codes: &[(&str, SqlTypeCode)]) -> Vec<NativeTypeSyntax> {
        codes
            .iter()
            .map(|(name, code)| NativeTypeSyntax::new(*name, *code))
            .collect()
    }

    #[test]
    fn test_first_supported_fallback_wins() {
        // Text prefers CLOB over TEXT when both exist.
        let mapper = TypeMapper::from_catalog(catalog(&[
            ("TEXT", SqlTypeCode::LongVarchar),
            ("CLOB", SqlTypeCode::Clob),
        ]));
        assert_eq!(mapper.resolve(ValueType::Text).unwrap().name, "CLOB");
    }

    #[test]
    fn test_later_fallback_used_when_earlier_missing() {
        let mapper = TypeMapper::from_catalog(catalog(&[
            ("VARCHAR", SqlTypeCode::Varchar),
            ("TEXT", SqlTypeCode::LongVarchar),
        ]));
        // No CLOB or BLOB reported, so Text falls through to TEXT.
        assert_eq!(mapper.resolve(ValueType::Text).unwrap().name, "TEXT");
    }

    #[test]
    fn test_ancestor_climb_when_leaf_unmapped() {
        // Only numeric types: Binominal has no mapping, Nominal has none,
        // so resolution climbs to AttributeValue which also fails; but
        // Integer resolves directly.
        let mapper = TypeMapper::from_catalog(catalog(&[("INT", SqlTypeCode::Integer)]));
        assert!(mapper.direct(ValueType::Binominal).is_none());
        let err = mapper.resolve(ValueType::Binominal).unwrap_err();
        assert!(err.to_string().contains("Binominal"));
        assert_eq!(mapper.resolve(ValueType::Integer).unwrap().name, "INT");
    }

    #[test]
    fn test_climb_finds_mapped_parent() {
        // DateTime mapped, Date/Time not: both resolve via the parent.
        let mut catalog = catalog(&[("VARCHAR", SqlTypeCode::Varchar)]);
        catalog.push(NativeTypeSyntax::new("TIMESTAMP", SqlTypeCode::Timestamp));
        let mapper = TypeMapper::from_catalog(catalog);
        // Date's own fallback list contains Timestamp, so it maps directly.
        assert_eq!(mapper.resolve(ValueType::Date).unwrap().name, "TIMESTAMP");
        assert_eq!(mapper.resolve(ValueType::Time).unwrap().name, "TIMESTAMP");
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("varchar(255)"), "VARCHAR");
        assert_eq!(normalize_type_name("  text "), "TEXT");
    }

    #[test]
    fn test_from_type_name_classification() {
        assert_eq!(
            SqlTypeCode::from_type_name("VARCHAR(80)"),
            Some(SqlTypeCode::Varchar)
        );
        assert_eq!(SqlTypeCode::from_type_name("int8"), Some(SqlTypeCode::BigInt));
        assert_eq!(SqlTypeCode::from_type_name("geometry"), None);
    }

    #[test]
    fn test_builtin_catalogs_cover_all_ontology_types() {
        for catalog in [builtin_mysql_catalog(), builtin_sqlite_catalog()] {
            let mapper = TypeMapper::from_catalog(catalog);
            for &vt in ALL_VALUE_TYPES {
                assert!(mapper.resolve(vt).is_ok(), "{:?} unmapped", vt);
            }
        }
    }
}
