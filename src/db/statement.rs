//! Dialect-aware SQL text generation.
//!
//! Everything that turns table references, attributes, and row counts into
//! SQL strings lives here. The only wire format this layer produces is SQL
//! text; generated statements never contain an unescaped identifier-quote
//! character.

use crate::db::connection::DatabaseType;
use crate::db::typemap::TypeMapper;
use crate::error::{DbError, DbResult};
use crate::models::table::TableRef;
use crate::models::value::{Attribute, DataRow, ValueType};

/// Identifier-quoting and placeholder conventions of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub db_type: DatabaseType,
    /// Identifier quote string; `None` means identifiers pass unquoted.
    pub quote: Option<&'static str>,
    /// `$n` placeholders instead of `?`.
    numbered_placeholders: bool,
    /// Column type for auto-generated surrogate keys.
    auto_increment_type: &'static str,
}

impl Dialect {
    pub fn for_db(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::PostgreSQL => Self {
                db_type,
                quote: Some("\""),
                numbered_placeholders: true,
                auto_increment_type: "BIGSERIAL",
            },
            DatabaseType::MySQL => Self {
                db_type,
                quote: Some("`"),
                numbered_placeholders: false,
                auto_increment_type: "BIGINT AUTO_INCREMENT",
            },
            // INTEGER PRIMARY KEY is the rowid alias, which is what makes
            // last_insert_rowid() arithmetic valid.
            DatabaseType::SQLite => Self {
                db_type,
                quote: Some("\""),
                numbered_placeholders: false,
                auto_increment_type: "INTEGER",
            },
        }
    }

    /// A dialect that reports no identifier quote character.
    #[cfg(test)]
    pub fn unquoted(db_type: DatabaseType) -> Self {
        Self {
            quote: None,
            ..Self::for_db(db_type)
        }
    }

    fn placeholder(&self, index: usize) -> String {
        if self.numbered_placeholders {
            format!("${}", index)
        } else {
            "?".to_string()
        }
    }
}

/// Builds SQL statement text for one dialect.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    dialect: Dialect,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Quote an identifier. Any embedded quote characters are replaced with
    /// `_` first, so the output can never contain unbalanced quoting.
    /// Identity when the dialect has no quote character.
    pub fn quote_ident(&self, name: &str) -> String {
        match self.dialect.quote {
            Some(quote) => {
                let safe = name.replace(quote, "_");
                format!("{}{}{}", quote, safe, quote)
            }
            None => name.to_string(),
        }
    }

    /// Quoted, schema-qualified table name.
    pub fn table_name(&self, table: &TableRef) -> String {
        match &table.schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(&table.table)),
            None => self.quote_ident(&table.table),
        }
    }

    /// DDL type text for one attribute, sizing VARCHAR columns from the
    /// observed values.
    ///
    /// The width is the longest observed textual value (at least 1). An
    /// observed or requested width beyond the native precision, or a value
    /// longer than the caller's default, fails the whole statement.
    pub fn column_type_text(
        &self,
        mapper: &TypeMapper,
        attribute: &Attribute,
        rows: &[DataRow],
        column_index: usize,
        default_varchar_length: Option<u32>,
    ) -> DbResult<String> {
        let syntax = mapper.resolve(attribute.value_type).map_err(|_| {
            DbError::type_mapping(
                format!(
                    "no native SQL type supports value type {:?}",
                    attribute.value_type
                ),
                attribute.name.clone(),
            )
        })?;

        if !syntax.is_sized() {
            return Ok(syntax.name.clone());
        }

        let mut observed: u32 = 1;
        for row in rows {
            if let Some(cell) = row.get(column_index) {
                if let Some(text) = cell.as_text() {
                    observed = observed.max(text.chars().count() as u32);
                }
            }
        }

        if let Some(max) = syntax.precision {
            if observed > max {
                return Err(DbError::type_mapping(
                    format!(
                        "value of length {} exceeds the maximum precision {} of native type {}",
                        observed, max, syntax.name
                    ),
                    attribute.name.clone(),
                ));
            }
            if let Some(default) = default_varchar_length {
                if default > max {
                    return Err(DbError::type_mapping(
                        format!(
                            "requested length {} exceeds the maximum precision {} of native type {}",
                            default, max, syntax.name
                        ),
                        attribute.name.clone(),
                    ));
                }
            }
        }
        if let Some(default) = default_varchar_length {
            if observed > default {
                return Err(DbError::type_mapping(
                    format!(
                        "value of length {} exceeds the configured column length {}",
                        observed, default
                    ),
                    attribute.name.clone(),
                ));
            }
        }

        Ok(format!("{}({})", syntax.name, observed))
    }

    /// `CREATE TABLE` DDL. When `surrogate_key` is set, an auto-generated
    /// key column is prepended and becomes the primary key.
    pub fn create_table_sql(
        &self,
        mapper: &TypeMapper,
        attributes: &[Attribute],
        rows: &[DataRow],
        table: &TableRef,
        default_varchar_length: Option<u32>,
        surrogate_key: Option<&str>,
    ) -> DbResult<String> {
        let mut columns = Vec::with_capacity(attributes.len() + 1);
        if let Some(key) = surrogate_key {
            columns.push(format!(
                "{} {} NOT NULL PRIMARY KEY",
                self.quote_ident(key),
                self.dialect.auto_increment_type
            ));
        }
        for (i, attribute) in attributes.iter().enumerate() {
            let type_text =
                self.column_type_text(mapper, attribute, rows, i, default_varchar_length)?;
            columns.push(format!("{} {}", self.quote_ident(&attribute.name), type_text));
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.table_name(table),
            columns.join(", ")
        ))
    }

    /// Parameterized multi-row `INSERT`, sized for `row_count` tuples.
    pub fn insert_sql(&self, table: &TableRef, columns: &[&str], row_count: usize) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        let mut tuples = Vec::with_capacity(row_count);
        let mut index = 1;
        for _ in 0..row_count {
            let placeholders: Vec<String> = (0..columns.len())
                .map(|_| {
                    let p = self.dialect.placeholder(index);
                    index += 1;
                    p
                })
                .collect();
            tuples.push(format!("({})", placeholders.join(", ")));
        }
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table_name(table),
            quoted.join(", "),
            tuples.join(", ")
        )
    }

    /// `UPDATE ... SET ... WHERE key = ?` for one row.
    pub fn update_where_sql(
        &self,
        table: &TableRef,
        set_columns: &[&str],
        key_columns: &[&str],
    ) -> String {
        let mut index = 1;
        let assignments: Vec<String> = set_columns
            .iter()
            .map(|c| {
                let text = format!("{} = {}", self.quote_ident(c), self.dialect.placeholder(index));
                index += 1;
                text
            })
            .collect();
        let conditions: Vec<String> = key_columns
            .iter()
            .map(|c| {
                let text = format!("{} = {}", self.quote_ident(c), self.dialect.placeholder(index));
                index += 1;
                text
            })
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.table_name(table),
            assignments.join(", "),
            conditions.join(" AND ")
        )
    }

    pub fn drop_sql(&self, table: &TableRef) -> String {
        format!("DROP TABLE {}", self.table_name(table))
    }

    pub fn delete_all_sql(&self, table: &TableRef) -> String {
        format!("DELETE FROM {}", self.table_name(table))
    }

    pub fn select_all_sql(&self, table: &TableRef) -> String {
        format!("SELECT * FROM {}", self.table_name(table))
    }

    /// Zero-row probe used to derive a result shape without reading data.
    pub fn select_empty_sql(&self, table: &TableRef) -> String {
        format!("SELECT * FROM {} WHERE 1 = 0", self.table_name(table))
    }

    pub fn select_count_sql(&self, table: &TableRef) -> String {
        format!("SELECT COUNT(*) FROM {}", self.table_name(table))
    }

    /// `SELECT COUNT(*) ... WHERE key = ?`, the existence probe for upserts
    /// whose rows consist only of key columns.
    pub fn select_count_where_sql(&self, table: &TableRef, key_columns: &[&str]) -> String {
        let conditions: Vec<String> = key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(c), self.dialect.placeholder(i + 1)))
            .collect();
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.table_name(table),
            conditions.join(" AND ")
        )
    }

    pub fn alter_add_column_sql(&self, table: &TableRef, column: &str, type_text: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table_name(table),
            self.quote_ident(column),
            type_text
        )
    }

    pub fn alter_drop_column_sql(&self, table: &TableRef, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.table_name(table),
            self.quote_ident(column)
        )
    }

    /// Append the generated-key clause where the engine supports one.
    pub fn returning_clause(&self, insert_sql: &str, key: &str) -> String {
        match self.dialect.db_type {
            DatabaseType::PostgreSQL => {
                format!("{} RETURNING {}", insert_sql, self.quote_ident(key))
            }
            _ => insert_sql.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::typemap::{NativeTypeSyntax, SqlTypeCode};
    use crate::models::value::CellValue;

    fn builder() -> StatementBuilder {
        StatementBuilder::new(Dialect::for_db(DatabaseType::PostgreSQL))
    }

    fn text_mapper() -> TypeMapper {
        TypeMapper::from_catalog(vec![
            NativeTypeSyntax::new("VARCHAR", SqlTypeCode::Varchar).with_precision(100),
            NativeTypeSyntax::new("DOUBLE PRECISION", SqlTypeCode::Double),
            NativeTypeSyntax::new("INTEGER", SqlTypeCode::Integer),
        ])
    }

    #[test]
    fn test_quote_ident_replaces_embedded_quotes() {
        let b = builder();
        assert_eq!(b.quote_ident("plain"), "\"plain\"");
        assert_eq!(b.quote_ident("wei\"rd"), "\"wei_rd\"");
    }

    #[test]
    fn test_quote_ident_identity_without_quote_char() {
        let b = StatementBuilder::new(Dialect::unquoted(DatabaseType::SQLite));
        assert_eq!(b.quote_ident("name"), "name");
    }

    #[test]
    fn test_mysql_backtick_quoting() {
        let b = StatementBuilder::new(Dialect::for_db(DatabaseType::MySQL));
        assert_eq!(b.quote_ident("a`b"), "`a_b`");
    }

    #[test]
    fn test_insert_sql_postgres_numbering() {
        let b = builder();
        let sql = b.insert_sql(&TableRef::new("t"), &["a", "b"], 2);
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_insert_sql_question_marks() {
        let b = StatementBuilder::new(Dialect::for_db(DatabaseType::SQLite));
        let sql = b.insert_sql(&TableRef::new("t"), &["a"], 3);
        assert_eq!(sql, "INSERT INTO \"t\" (\"a\") VALUES (?), (?), (?)");
    }

    #[test]
    fn test_varchar_sized_from_observed_values() {
        let b = builder();
        let attrs = [Attribute::new("label", ValueType::Nominal)];
        let rows = [
            DataRow::new(vec![CellValue::from("yes")]),
            DataRow::new(vec![CellValue::from("unknown")]),
        ];
        let sql = b
            .create_table_sql(&text_mapper(), &attrs, &rows, &TableRef::new("t"), None, None)
            .unwrap();
        assert!(sql.contains("\"label\" VARCHAR(7)"), "got: {}", sql);
    }

    #[test]
    fn test_varchar_minimum_width_is_one() {
        let b = builder();
        let attrs = [Attribute::new("label", ValueType::Nominal)];
        let sql = b
            .create_table_sql(&text_mapper(), &attrs, &[], &TableRef::new("t"), None, None)
            .unwrap();
        assert!(sql.contains("VARCHAR(1)"), "got: {}", sql);
    }

    #[test]
    fn test_value_longer_than_default_fails() {
        let b = builder();
        let attrs = [Attribute::new("label", ValueType::Nominal)];
        let rows = [DataRow::new(vec![CellValue::from("toolongvalue")])];
        let err = b
            .create_table_sql(&text_mapper(), &attrs, &rows, &TableRef::new("t"), Some(5), None)
            .unwrap_err();
        assert!(err.to_string().contains("label"));
    }

    #[test]
    fn test_requested_length_beyond_precision_fails() {
        let b = builder();
        let attrs = [Attribute::new("label", ValueType::Nominal)];
        // Catalog precision is 100.
        let err = b
            .create_table_sql(&text_mapper(), &attrs, &[], &TableRef::new("t"), Some(500), None)
            .unwrap_err();
        assert!(matches!(err, DbError::TypeMapping { .. }));
    }

    #[test]
    fn test_surrogate_key_column_prepended() {
        let b = builder();
        let attrs = [Attribute::new("x", ValueType::Real)];
        let sql = b
            .create_table_sql(
                &text_mapper(),
                &attrs,
                &[],
                &TableRef::new("t"),
                None,
                Some("id"),
            )
            .unwrap();
        assert!(
            sql.starts_with("CREATE TABLE \"t\" (\"id\" BIGSERIAL NOT NULL PRIMARY KEY, "),
            "got: {}",
            sql
        );
    }

    #[test]
    fn test_update_where_sql() {
        let b = builder();
        let sql = b.update_where_sql(&TableRef::new("t"), &["a", "b"], &["k"]);
        assert_eq!(
            sql,
            "UPDATE \"t\" SET \"a\" = $1, \"b\" = $2 WHERE \"k\" = $3"
        );
    }

    #[test]
    fn test_schema_qualified_table_name() {
        let b = builder();
        let table = TableRef::new("orders").with_schema("sales");
        assert_eq!(b.drop_sql(&table), "DROP TABLE \"sales\".\"orders\"");
    }

    #[test]
    fn test_misc_statements() {
        let b = builder();
        let t = TableRef::new("t");
        assert_eq!(b.delete_all_sql(&t), "DELETE FROM \"t\"");
        assert_eq!(b.select_all_sql(&t), "SELECT * FROM \"t\"");
        assert_eq!(b.select_empty_sql(&t), "SELECT * FROM \"t\" WHERE 1 = 0");
        assert_eq!(b.select_count_sql(&t), "SELECT COUNT(*) FROM \"t\"");
        assert_eq!(
            b.select_count_where_sql(&t, &["k"]),
            "SELECT COUNT(*) FROM \"t\" WHERE \"k\" = $1"
        );
        assert_eq!(
            b.alter_add_column_sql(&t, "c", "VARCHAR(10)"),
            "ALTER TABLE \"t\" ADD COLUMN \"c\" VARCHAR(10)"
        );
        assert_eq!(
            b.alter_drop_column_sql(&t, "c"),
            "ALTER TABLE \"t\" DROP COLUMN \"c\""
        );
    }

    #[test]
    fn test_returning_clause_postgres_only() {
        let pg = builder();
        let insert = "INSERT INTO \"t\" (\"a\") VALUES ($1)";
        assert_eq!(
            pg.returning_clause(insert, "id"),
            "INSERT INTO \"t\" (\"a\") VALUES ($1) RETURNING \"id\""
        );
        let lite = StatementBuilder::new(Dialect::for_db(DatabaseType::SQLite));
        assert_eq!(lite.returning_clause(insert, "id"), insert);
    }
}
