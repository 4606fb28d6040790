//! Connection handler: table creation, batched loads, upserts, and
//! introspection over one owned connection.
//!
//! A handler owns exactly one live connection and the type mapper built for
//! it. It moves through Disconnected -> Connected -> Disconnected; `connect`
//! on an already-connected handler is an error, and every statement
//! operation requires the connected state.

use crate::db::connection::{BindValue, DatabaseType, DbConn};
use crate::db::statement::{Dialect, StatementBuilder};
use crate::db::typemap::{SqlTypeCode, TypeMapper};
use crate::error::{DbError, DbResult};
use crate::models::table::{ColumnRef, TableRef};
use crate::models::value::{Attribute, DataRow};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Type code reported for columns whose native type is not classifiable.
const TYPE_CODE_OTHER: i32 = 1111;

/// Default number of rows per insert batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// What to do when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Fail without executing any DDL or DML.
    FailIfExists,
    /// Drop and recreate unconditionally.
    Overwrite,
    /// Drop and recreate on the first attempt of a retry loop, append on
    /// later attempts.
    OverwriteOnFirstRun,
    /// Keep the table and append rows.
    Append,
}

/// Options for [`ConnectionHandler::create_table`].
pub struct CreateTableOptions {
    pub policy: OverwritePolicy,
    /// Whether this is the first attempt of the caller's retry loop; only
    /// consulted by [`OverwritePolicy::OverwriteOnFirstRun`].
    pub first_run: bool,
    pub default_varchar_length: Option<u32>,
    /// Name of the auto-generated key column, when one is wanted.
    pub surrogate_key: Option<String>,
    pub batch_size: usize,
    cancel: Option<Box<dyn Fn() -> bool + Send + Sync>>,
}

impl Default for CreateTableOptions {
    fn default() -> Self {
        Self {
            policy: OverwritePolicy::FailIfExists,
            first_run: true,
            default_varchar_length: None,
            surrogate_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
        }
    }
}

impl CreateTableOptions {
    pub fn with_policy(mut self, policy: OverwritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_first_run(mut self, first_run: bool) -> Self {
        self.first_run = first_run;
        self
    }

    pub fn with_default_varchar_length(mut self, length: u32) -> Self {
        self.default_varchar_length = Some(length);
        self
    }

    pub fn with_surrogate_key(mut self, key_name: impl Into<String>) -> Self {
        self.surrogate_key = Some(key_name.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Install a cancellation check, polled between batches. When it
    /// returns true the load stops with [`DbError::Cancelled`], leaving the
    /// transaction open for the caller to commit or roll back.
    pub fn with_cancel(mut self, cancel: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel = Some(Box::new(cancel));
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f())
    }
}

impl std::fmt::Debug for CreateTableOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateTableOptions")
            .field("policy", &self.policy)
            .field("first_run", &self.first_run)
            .field("default_varchar_length", &self.default_varchar_length)
            .field("surrogate_key", &self.surrogate_key)
            .field("batch_size", &self.batch_size)
            .field("has_cancel", &self.cancel.is_some())
            .finish()
    }
}

struct Connected {
    conn: DbConn,
    mapper: TypeMapper,
    builder: StatementBuilder,
}

enum State {
    Disconnected,
    Connected(Box<Connected>),
}

/// Owns one live connection and issues all DDL/DML through it.
pub struct ConnectionHandler {
    state: State,
}

impl Default for ConnectionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHandler {
    pub fn new() -> Self {
        Self {
            state: State::Disconnected,
        }
    }

    /// Open the connection and build the type mapper for it.
    pub async fn connect(&mut self, url: &str) -> DbResult<()> {
        if matches!(self.state, State::Connected(_)) {
            return Err(DbError::AlreadyConnected);
        }
        let mut conn = DbConn::connect(url).await?;
        let mapper = TypeMapper::build(&mut conn).await?;
        let builder = StatementBuilder::new(Dialect::for_db(conn.db_type()));
        info!(db_type = %conn.db_type(), "Connected");
        self.state = State::Connected(Box::new(Connected {
            conn,
            mapper,
            builder,
        }));
        Ok(())
    }

    /// Close the connection. Subsequent operations fail as disconnected.
    pub async fn disconnect(&mut self) -> DbResult<()> {
        match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Connected(inner) => inner.conn.close().await,
            State::Disconnected => Err(DbError::not_connected("disconnect")),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    pub fn db_type(&self) -> Option<DatabaseType> {
        match &self.state {
            State::Connected(inner) => Some(inner.conn.db_type()),
            State::Disconnected => None,
        }
    }

    /// The statement builder for the connected dialect.
    pub fn statement_builder(&self) -> DbResult<&StatementBuilder> {
        match &self.state {
            State::Connected(inner) => Ok(&inner.builder),
            State::Disconnected => Err(DbError::not_connected("statement_builder")),
        }
    }

    /// The type mapper built at connect time.
    pub fn type_mapper(&self) -> DbResult<&TypeMapper> {
        match &self.state {
            State::Connected(inner) => Ok(&inner.mapper),
            State::Disconnected => Err(DbError::not_connected("type_mapper")),
        }
    }

    fn connected(&mut self, operation: &str) -> DbResult<&mut Connected> {
        match &mut self.state {
            State::Connected(inner) => Ok(inner),
            State::Disconnected => Err(DbError::not_connected(operation)),
        }
    }

    /// Execute an ad-hoc statement; returns affected row count.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let inner = self.connected("execute")?;
        Ok(inner.conn.execute(sql).await?.rows_affected)
    }

    /// Commit the open transaction. Exposed so a caller that received
    /// [`DbError::Cancelled`] can decide the fate of flushed batches.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.connected("commit")?.conn.execute("COMMIT").await?;
        Ok(())
    }

    /// Roll back the open transaction.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.connected("rollback")?.conn.execute("ROLLBACK").await?;
        Ok(())
    }

    /// Check table existence with a single metadata probe.
    ///
    /// Only the schema qualifier narrows the probe; a catalog on the
    /// reference is ignored because the connection is already scoped to
    /// one database. SQLite has no schemas and checks the main database.
    pub async fn table_exists(&mut self, table: &TableRef) -> DbResult<bool> {
        let inner = self.connected("table_exists")?;
        let rows = match inner.conn.db_type() {
            DatabaseType::PostgreSQL => match &table.schema {
                Some(schema) => {
                    inner
                        .conn
                        .fetch_string_rows(queries::postgres::TABLE_EXISTS_IN_SCHEMA, &[
                            table.table.as_str(),
                            schema.as_str(),
                        ])
                        .await?
                }
                None => {
                    inner
                        .conn
                        .fetch_string_rows(queries::postgres::TABLE_EXISTS, &[table.table.as_str()])
                        .await?
                }
            },
            DatabaseType::MySQL => match &table.schema {
                Some(schema) => {
                    inner
                        .conn
                        .fetch_string_rows(queries::mysql::TABLE_EXISTS_IN_SCHEMA, &[
                            table.table.as_str(),
                            schema.as_str(),
                        ])
                        .await?
                }
                None => {
                    inner
                        .conn
                        .fetch_string_rows(queries::mysql::TABLE_EXISTS, &[table.table.as_str()])
                        .await?
                }
            },
            DatabaseType::SQLite => {
                inner
                    .conn
                    .fetch_string_rows(queries::sqlite::TABLE_EXISTS, &[table.table.as_str()])
                    .await?
            }
        };
        Ok(!rows.is_empty())
    }

    /// Create (or reuse, per policy) the target table and load the rows in
    /// batches inside one transaction. Returns the generated keys, in input
    /// row order, when a surrogate key was requested.
    pub async fn create_table(
        &mut self,
        attributes: &[Attribute],
        rows: &[DataRow],
        table: &TableRef,
        options: &CreateTableOptions,
    ) -> DbResult<Option<Vec<i64>>> {
        if attributes.is_empty() {
            return Err(DbError::invalid_input("at least one attribute is required"));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.cells.len() != attributes.len() {
                return Err(DbError::invalid_input(format!(
                    "row {} has {} cells but {} attributes are declared",
                    i,
                    row.cells.len(),
                    attributes.len()
                )));
            }
        }

        let exists = self.table_exists(table).await?;
        let mut create = true;
        if exists {
            match options.policy {
                OverwritePolicy::FailIfExists => {
                    return Err(DbError::schema(
                        "table already exists and the overwrite policy forbids replacing it",
                        table.to_string(),
                    ));
                }
                OverwritePolicy::Overwrite => {
                    self.drop_table(table).await?;
                }
                OverwritePolicy::OverwriteOnFirstRun => {
                    if options.first_run {
                        self.drop_table(table).await?;
                    } else {
                        create = false;
                    }
                }
                OverwritePolicy::Append => {
                    create = false;
                }
            }
        }

        if create {
            let inner = self.connected("create_table")?;
            let ddl = inner.builder.create_table_sql(
                &inner.mapper,
                attributes,
                rows,
                table,
                options.default_varchar_length,
                options.surrogate_key.as_deref(),
            )?;
            debug!(table = %table, "Creating table");
            inner.conn.execute(&ddl).await?;
        }

        if rows.is_empty() {
            return Ok(options.surrogate_key.as_ref().map(|_| Vec::new()));
        }
        self.insert_batched(attributes, rows, table, options).await
    }

    /// Batched insert under suspended auto-commit. Generated keys are
    /// harvested per batch when a surrogate key is requested; any failure
    /// rolls back the whole load and restores auto-commit. The one
    /// exception is cancellation, which leaves the transaction open for
    /// the caller to [`commit`](Self::commit) or [`rollback`](Self::rollback).
    async fn insert_batched(
        &mut self,
        attributes: &[Attribute],
        rows: &[DataRow],
        table: &TableRef,
        options: &CreateTableOptions,
    ) -> DbResult<Option<Vec<i64>>> {
        let inner = self.connected("insert")?;
        inner.conn.execute("BEGIN").await?;
        match Self::run_batches(inner, attributes, rows, table, options).await {
            Ok(keys) => {
                inner.conn.execute("COMMIT").await?;
                info!(table = %table, rows = rows.len(), "Load complete");
                Ok(keys)
            }
            Err(err @ DbError::Cancelled { .. }) => Err(err),
            Err(err) => {
                // Keep the original failure; a rollback failure is only logged.
                if let Err(rollback_err) = inner.conn.execute("ROLLBACK").await {
                    warn!(error = %rollback_err, "Rollback after failed load also failed");
                }
                Err(err)
            }
        }
    }

    async fn run_batches(
        inner: &mut Connected,
        attributes: &[Attribute],
        rows: &[DataRow],
        table: &TableRef,
        options: &CreateTableOptions,
    ) -> DbResult<Option<Vec<i64>>> {
        let columns: Vec<&str> = attributes.iter().map(|a| a.name.as_str()).collect();
        let mut keys: Vec<i64> = Vec::new();
        let harvest = options.surrogate_key.is_some();
        let mut flushed = 0usize;

        for batch in rows.chunks(options.batch_size) {
            if options.cancelled() {
                warn!(table = %table, rows_flushed = flushed, "Load cancelled");
                return Err(DbError::Cancelled {
                    rows_flushed: flushed,
                });
            }

            let mut sql = inner.builder.insert_sql(table, &columns, batch.len());
            let mut binds = Vec::with_capacity(batch.len() * attributes.len());
            for row in batch {
                for (cell, attribute) in row.cells.iter().zip(attributes) {
                    binds.push(BindValue::from_cell(cell, attribute.value_type)?);
                }
            }

            if harvest {
                let key_name = options.surrogate_key.as_deref().unwrap_or_default();
                let batch_keys = match inner.conn.db_type() {
                    DatabaseType::PostgreSQL => {
                        sql = inner.builder.returning_clause(&sql, key_name);
                        inner.conn.fetch_keys_bound(&sql, &binds).await?
                    }
                    DatabaseType::MySQL => {
                        // MySQL reports the first generated id of the batch.
                        let outcome = inner.conn.execute_bound(&sql, &binds).await?;
                        match outcome.last_insert_id {
                            Some(first) if first > 0 => {
                                (first..first + batch.len() as i64).collect()
                            }
                            _ => Vec::new(),
                        }
                    }
                    DatabaseType::SQLite => {
                        // SQLite reports the last generated rowid.
                        let outcome = inner.conn.execute_bound(&sql, &binds).await?;
                        match outcome.last_insert_id {
                            Some(last) if last >= batch.len() as i64 => {
                                (last - batch.len() as i64 + 1..=last).collect()
                            }
                            _ => Vec::new(),
                        }
                    }
                };
                if batch_keys.len() != batch.len() {
                    return Err(DbError::KeyMismatch {
                        table: table.to_string(),
                        expected: rows.len(),
                        actual: keys.len() + batch_keys.len(),
                    });
                }
                keys.extend(batch_keys);
            } else {
                inner.conn.execute_bound(&sql, &binds).await?;
            }
            flushed += batch.len();
            debug!(table = %table, flushed, "Flushed batch");
        }
        Ok(if harvest { Some(keys) } else { None })
    }

    /// Update-or-insert each row by its natural key. Per row, an `UPDATE`
    /// probe runs first and an `INSERT` follows when nothing matched; when
    /// every column is a key column a `SELECT COUNT(*)` probe decides.
    /// Deliberately portable; no vendor upsert syntax.
    pub async fn upsert_by_key(
        &mut self,
        attributes: &[Attribute],
        rows: &[DataRow],
        table: &TableRef,
        key_columns: &[&str],
    ) -> DbResult<()> {
        if key_columns.is_empty() {
            return Err(DbError::invalid_input("at least one key column is required"));
        }
        let mut key_indices = Vec::with_capacity(key_columns.len());
        for key in key_columns {
            let index = attributes
                .iter()
                .position(|a| a.name == *key)
                .ok_or_else(|| {
                    DbError::invalid_input(format!("key column '{}' is not an attribute", key))
                })?;
            key_indices.push(index);
        }
        let set_indices: Vec<usize> = (0..attributes.len())
            .filter(|i| !key_indices.contains(i))
            .collect();

        let inner = self.connected("upsert_by_key")?;
        let all_columns: Vec<&str> = attributes.iter().map(|a| a.name.as_str()).collect();
        let set_columns: Vec<&str> = set_indices.iter().map(|&i| all_columns[i]).collect();
        let insert_sql = inner.builder.insert_sql(table, &all_columns, 1);

        for (row_number, row) in rows.iter().enumerate() {
            if row.cells.len() != attributes.len() {
                return Err(DbError::invalid_input(format!(
                    "row {} has {} cells but {} attributes are declared",
                    row_number,
                    row.cells.len(),
                    attributes.len()
                )));
            }
            let key_binds: Vec<BindValue> = key_indices
                .iter()
                .map(|&i| BindValue::from_cell(&row.cells[i], attributes[i].value_type))
                .collect::<DbResult<_>>()?;

            let matched = if set_indices.is_empty() {
                let probe = inner.builder.select_count_where_sql(table, key_columns);
                inner.conn.fetch_scalar_i64(&probe, &key_binds).await? > 0
            } else {
                let update = inner
                    .builder
                    .update_where_sql(table, &set_columns, key_columns);
                let mut binds: Vec<BindValue> = set_indices
                    .iter()
                    .map(|&i| BindValue::from_cell(&row.cells[i], attributes[i].value_type))
                    .collect::<DbResult<_>>()?;
                binds.extend(key_binds);
                inner.conn.execute_bound(&update, &binds).await?.rows_affected > 0
            };

            if !matched {
                let binds: Vec<BindValue> = row
                    .cells
                    .iter()
                    .zip(attributes)
                    .map(|(cell, attribute)| BindValue::from_cell(cell, attribute.value_type))
                    .collect::<DbResult<_>>()?;
                inner.conn.execute_bound(&insert_sql, &binds).await?;
            }
        }
        Ok(())
    }

    /// Enumerate all tables and, optionally, their columns.
    ///
    /// One table's metadata failure never aborts the enumeration: the
    /// column fetch falls back to a zero-row `SELECT *` probe and derives
    /// the column shape from the described result.
    pub async fn describe_all_tables(
        &mut self,
        mut progress: impl FnMut(usize, usize),
        fetch_columns: bool,
        only_ordinary_tables: bool,
    ) -> DbResult<BTreeMap<TableRef, Vec<ColumnRef>>> {
        let inner = self.connected("describe_all_tables")?;
        let table_rows = match inner.conn.db_type() {
            DatabaseType::PostgreSQL => {
                inner
                    .conn
                    .fetch_string_rows(queries::postgres::LIST_TABLES, &[])
                    .await?
            }
            DatabaseType::MySQL => {
                inner
                    .conn
                    .fetch_string_rows(queries::mysql::LIST_TABLES, &[])
                    .await?
            }
            DatabaseType::SQLite => {
                inner
                    .conn
                    .fetch_string_rows(queries::sqlite::LIST_TABLES, &[])
                    .await?
            }
        };

        let mut tables = Vec::new();
        for row in table_rows {
            let mut fields = row.into_iter();
            let Some(Some(name)) = fields.next() else {
                continue;
            };
            let kind = fields.next().flatten().unwrap_or_default();
            if only_ordinary_tables && !is_ordinary_table(&kind) {
                continue;
            }
            tables.push(TableRef::new(name));
        }

        let total = tables.len();
        let mut result = BTreeMap::new();
        for (index, table) in tables.into_iter().enumerate() {
            progress(index + 1, total);
            let columns = if fetch_columns {
                match Self::fetch_table_columns(inner, &table).await {
                    Ok(columns) => columns,
                    Err(err) => {
                        debug!(
                            table = %table,
                            error = %err,
                            "Column metadata failed; probing with an empty select"
                        );
                        match Self::probe_table_columns(inner, &table).await {
                            Ok(columns) => columns,
                            Err(probe_err) => {
                                warn!(
                                    table = %table,
                                    error = %probe_err,
                                    "Skipping columns for table"
                                );
                                Vec::new()
                            }
                        }
                    }
                }
            } else {
                Vec::new()
            };
            result.insert(table, columns);
        }
        Ok(result)
    }

    async fn fetch_table_columns(inner: &mut Connected, table: &TableRef) -> DbResult<Vec<ColumnRef>> {
        let rows = match inner.conn.db_type() {
            DatabaseType::PostgreSQL => {
                inner
                    .conn
                    .fetch_string_rows(queries::postgres::LIST_COLUMNS, &[table.table.as_str()])
                    .await?
            }
            DatabaseType::MySQL => {
                inner
                    .conn
                    .fetch_string_rows(queries::mysql::LIST_COLUMNS, &[table.table.as_str()])
                    .await?
            }
            DatabaseType::SQLite => {
                inner
                    .conn
                    .fetch_string_rows(queries::sqlite::LIST_COLUMNS, &[table.table.as_str()])
                    .await?
            }
        };
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fields = row.into_iter();
            let Some(Some(name)) = fields.next() else {
                continue;
            };
            let type_name = fields.next().flatten().unwrap_or_default();
            let remarks = fields.next().flatten().filter(|r| !r.is_empty());
            let code = SqlTypeCode::from_type_name(&type_name)
                .map(SqlTypeCode::code)
                .unwrap_or(TYPE_CODE_OTHER);
            let mut column = ColumnRef::new(table.clone(), name, code, type_name);
            if let Some(remarks) = remarks {
                column = column.with_remarks(remarks);
            }
            columns.push(column);
        }
        if columns.is_empty() {
            return Err(DbError::schema(
                "metadata query returned no columns",
                table.to_string(),
            ));
        }
        Ok(columns)
    }

    /// Zero-row probe fallback: describe `SELECT * ... WHERE 1 = 0` and
    /// derive the columns from the result shape.
    async fn probe_table_columns(inner: &mut Connected, table: &TableRef) -> DbResult<Vec<ColumnRef>> {
        let sql = inner.builder.select_empty_sql(table);
        let described = inner.conn.describe_columns(&sql).await?;
        Ok(described
            .into_iter()
            .map(|(name, type_name)| {
                let code = SqlTypeCode::from_type_name(&type_name)
                    .map(SqlTypeCode::code)
                    .unwrap_or(TYPE_CODE_OTHER);
                ColumnRef::new(table.clone(), name, code, type_name)
            })
            .collect())
    }

    /// Read a whole table back as data rows, decoding by attribute type.
    pub async fn read_table(
        &mut self,
        table: &TableRef,
        attributes: &[Attribute],
    ) -> DbResult<Vec<DataRow>> {
        let inner = self.connected("read_table")?;
        let columns: Vec<String> = attributes
            .iter()
            .map(|a| inner.builder.quote_ident(&a.name))
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            inner.builder.table_name(table)
        );
        let kinds: Vec<_> = attributes.iter().map(|a| a.value_type).collect();
        inner.conn.fetch_data_rows(&sql, &kinds).await
    }

    /// Row count of a table.
    pub async fn count_rows(&mut self, table: &TableRef) -> DbResult<i64> {
        let inner = self.connected("count_rows")?;
        let sql = inner.builder.select_count_sql(table);
        inner.conn.fetch_scalar_i64(&sql, &[]).await
    }

    /// Drop a table.
    pub async fn drop_table(&mut self, table: &TableRef) -> DbResult<()> {
        let inner = self.connected("drop_table")?;
        let sql = inner.builder.drop_sql(table);
        inner.conn.execute(&sql).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn is_ordinary_table(kind: &str) -> bool {
    matches!(kind.to_uppercase().as_str(), "BASE TABLE" | "TABLE" | "")
}

/// Catalog queries per engine.
mod queries {
    pub mod postgres {
        pub const TABLE_EXISTS: &str = "SELECT table_name FROM information_schema.tables \
             WHERE table_name = $1 AND table_schema = current_schema()";
        pub const TABLE_EXISTS_IN_SCHEMA: &str = "SELECT table_name FROM information_schema.tables \
             WHERE table_name = $1 AND table_schema = $2";
        pub const LIST_TABLES: &str = "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_schema = current_schema() ORDER BY table_name";
        pub const LIST_COLUMNS: &str = "SELECT column_name, data_type \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position";
    }

    pub mod mysql {
        pub const TABLE_EXISTS: &str = "SELECT table_name FROM information_schema.tables \
             WHERE table_name = ? AND table_schema = DATABASE()";
        pub const TABLE_EXISTS_IN_SCHEMA: &str = "SELECT table_name FROM information_schema.tables \
             WHERE table_name = ? AND table_schema = ?";
        pub const LIST_TABLES: &str = "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_schema = DATABASE() ORDER BY table_name";
        pub const LIST_COLUMNS: &str = "SELECT column_name, data_type, column_comment \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position";
    }

    pub mod sqlite {
        pub const TABLE_EXISTS: &str =
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?";
        pub const LIST_TABLES: &str = "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name";
        pub const LIST_COLUMNS: &str = "SELECT name, type FROM pragma_table_info(?)";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value::{CellValue, ValueType};

    fn attrs() -> Vec<Attribute> {
        vec![
            Attribute::new("label", ValueType::Nominal),
            Attribute::new("amount", ValueType::Real),
        ]
    }

    fn rows(n: usize) -> Vec<DataRow> {
        (0..n)
            .map(|i| {
                DataRow::new(vec![
                    CellValue::Text(format!("row{}", i)),
                    CellValue::Real(i as f64 * 1.5),
                ])
            })
            .collect()
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let err = handler.connect("sqlite::memory:").await.unwrap_err();
        assert!(matches!(err, DbError::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut handler = ConnectionHandler::new();
        let err = handler.table_exists(&TableRef::new("t")).await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_then_fail() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        handler.disconnect().await.unwrap();
        let err = handler.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_create_and_count() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("items");
        handler
            .create_table(&attrs(), &rows(5), &table, &CreateTableOptions::default())
            .await
            .unwrap();
        assert_eq!(handler.count_rows(&table).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_refuse_if_exists_is_a_no_op() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("items");
        handler
            .create_table(&attrs(), &rows(2), &table, &CreateTableOptions::default())
            .await
            .unwrap();
        let err = handler
            .create_table(&attrs(), &rows(3), &table, &CreateTableOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
        // Nothing was inserted by the failed call.
        assert_eq!(handler.count_rows(&table).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_rows() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("items");
        handler
            .create_table(&attrs(), &rows(4), &table, &CreateTableOptions::default())
            .await
            .unwrap();
        let options = CreateTableOptions::default().with_policy(OverwritePolicy::Overwrite);
        handler
            .create_table(&attrs(), &rows(2), &table, &options)
            .await
            .unwrap();
        assert_eq!(handler.count_rows(&table).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_append_keeps_rows() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("items");
        handler
            .create_table(&attrs(), &rows(4), &table, &CreateTableOptions::default())
            .await
            .unwrap();
        let options = CreateTableOptions::default().with_policy(OverwritePolicy::Append);
        handler
            .create_table(&attrs(), &rows(3), &table, &options)
            .await
            .unwrap();
        assert_eq!(handler.count_rows(&table).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_mismatched_row_width_rejected() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let bad = vec![DataRow::new(vec![CellValue::from("only-one-cell")])];
        let err = handler
            .create_table(&attrs(), &bad, &TableRef::new("t"), &CreateTableOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_surrogate_keys_in_input_order() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("items");
        let options = CreateTableOptions::default()
            .with_surrogate_key("id")
            .with_batch_size(3);
        let keys = handler
            .create_table(&attrs(), &rows(7), &table, &options)
            .await
            .unwrap()
            .expect("keys were requested");
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_cancel_before_first_batch_leaves_transaction_open() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("items");
        let options = CreateTableOptions::default()
            .with_batch_size(2)
            .with_cancel(|| true);
        let err = handler
            .create_table(&attrs(), &rows(5), &table, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Cancelled { rows_flushed: 0 }));
        // The caller decides; roll back here so the table stays empty.
        handler.rollback().await.unwrap();
        assert_eq!(handler.count_rows(&table).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_load_rolls_back_and_frees_the_connection() {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        let table = TableRef::new("events");

        // Second row cannot bind into a date column; with batch size 1 the
        // first batch has already been flushed when the failure hits.
        let attrs = vec![Attribute::new("happened_on", ValueType::Date)];
        let rows = vec![
            DataRow::new(vec![CellValue::Date(
                chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            )]),
            DataRow::new(vec![CellValue::Int(42)]),
        ];
        let options = CreateTableOptions::default().with_batch_size(1);
        let err = handler
            .create_table(&attrs, &rows, &table, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        // The flushed batch was rolled back, nothing partial remains.
        assert_eq!(handler.count_rows(&table).await.unwrap(), 0);

        // Auto-commit is restored: a fresh load on the same handler works.
        let other = TableRef::new("events_ok");
        handler
            .create_table(&attrs, &rows[..1], &other, &CreateTableOptions::default())
            .await
            .unwrap();
        assert_eq!(handler.count_rows(&other).await.unwrap(), 1);
    }
}
