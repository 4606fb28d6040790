//! Database access: connections, type mapping, statement text, the
//! connection handler, and the metadata cache.

pub mod connection;
pub mod handler;
pub mod metadata_cache;
pub mod statement;
pub mod typemap;

pub use connection::{BindValue, DatabaseType, DbConn, ExecOutcome};
pub use handler::{ConnectionHandler, CreateTableOptions, DEFAULT_BATCH_SIZE, OverwritePolicy};
pub use metadata_cache::{MetadataCache, TableMap};
pub use statement::{Dialect, StatementBuilder};
pub use typemap::{NativeTypeSyntax, SqlTypeCode, TypeMapper};
