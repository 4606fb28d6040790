//! Driver providers: resolve descriptor module names to live drivers.
//!
//! A provider turns one module identifier into zero-or-one `DriverHandle`.
//! The default provider resolves against the compiled-in engines; a scoped
//! provider resolves only against manifest files named by a descriptor's
//! archive list, so externally-described modules stay isolated from the
//! default resolution table.

use crate::db::connection::DatabaseType;
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::path::Path;

/// A live, loaded driver: the module it came from and the engine it speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverHandle {
    module: String,
    kind: DatabaseType,
}

impl DriverHandle {
    pub fn new(module: impl Into<String>, kind: DatabaseType) -> Self {
        Self {
            module: module.into(),
            kind,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn kind(&self) -> DatabaseType {
        self.kind
    }

    /// Standardized probe: would this driver accept the URL?
    pub fn accepts_url(&self, url: &str) -> bool {
        DatabaseType::from_connection_string(url) == Some(self.kind)
    }
}

/// Loads driver modules by name.
pub trait DriverProvider {
    /// Resolve `module` to a live driver. Failures are values, not panics,
    /// so registry loading can continue past a bad entry.
    fn load(&self, module: &str) -> DbResult<DriverHandle>;
}

/// Resolves module identifiers against the compiled-in engines. Accepts
/// both short names and the class-style identifiers found in descriptor
/// documents written for other runtimes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinDrivers;

impl DriverProvider for BuiltinDrivers {
    fn load(&self, module: &str) -> DbResult<DriverHandle> {
        match builtin_engine(module) {
            Some(kind) => Ok(DriverHandle::new(module, kind)),
            None => Err(DbError::driver_load(
                module,
                "no compiled-in engine matches this module",
            )),
        }
    }
}

fn builtin_engine(module: &str) -> Option<DatabaseType> {
    let lower = module.to_lowercase();
    if lower.contains("postgres") || lower.contains("pgjdbc") {
        Some(DatabaseType::PostgreSQL)
    } else if lower.contains("mysql") || lower.contains("mariadb") {
        Some(DatabaseType::MySQL)
    } else if lower.contains("sqlite") {
        Some(DatabaseType::SQLite)
    } else {
        None
    }
}

/// Manifest shape for scoped archives: module identifier to engine name.
#[derive(Debug, serde::Deserialize)]
struct ArchiveManifest {
    modules: HashMap<String, String>,
}

/// Provider scoped to a set of archive manifests. Only modules the
/// manifests declare resolve; nothing falls through to the defaults.
#[derive(Debug, Clone)]
pub struct ScopedDrivers {
    table: HashMap<String, DatabaseType>,
}

impl ScopedDrivers {
    /// Build the resolution table from archive manifest files.
    pub fn from_archives<P: AsRef<Path>>(paths: &[P]) -> DbResult<Self> {
        let mut table = HashMap::new();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|e| {
                DbError::driver_load(
                    path.display().to_string(),
                    format!("cannot read archive manifest: {}", e),
                )
            })?;
            let manifest: ArchiveManifest = serde_json::from_str(&text).map_err(|e| {
                DbError::driver_load(
                    path.display().to_string(),
                    format!("malformed archive manifest: {}", e),
                )
            })?;
            for (module, engine) in manifest.modules {
                let kind = parse_engine_name(&engine).ok_or_else(|| {
                    DbError::driver_load(
                        module.clone(),
                        format!("unknown engine '{}' in archive manifest", engine),
                    )
                })?;
                table.insert(module, kind);
            }
        }
        Ok(Self { table })
    }

    #[cfg(test)]
    pub fn from_table(table: HashMap<String, DatabaseType>) -> Self {
        Self { table }
    }
}

impl DriverProvider for ScopedDrivers {
    fn load(&self, module: &str) -> DbResult<DriverHandle> {
        match self.table.get(module) {
            Some(kind) => Ok(DriverHandle::new(module, *kind)),
            None => Err(DbError::driver_load(
                module,
                "module is not declared by any archive in scope",
            )),
        }
    }
}

fn parse_engine_name(name: &str) -> Option<DatabaseType> {
    match name.to_lowercase().as_str() {
        "postgres" | "postgresql" => Some(DatabaseType::PostgreSQL),
        "mysql" | "mariadb" => Some(DatabaseType::MySQL),
        "sqlite" => Some(DatabaseType::SQLite),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_resolves_known_modules() {
        let handle = BuiltinDrivers.load("org.postgresql.Driver").unwrap();
        assert_eq!(handle.kind(), DatabaseType::PostgreSQL);
        assert_eq!(
            BuiltinDrivers.load("mysql").unwrap().kind(),
            DatabaseType::MySQL
        );
    }

    #[test]
    fn test_builtin_rejects_unknown_module() {
        let err = BuiltinDrivers.load("oracle.jdbc.OracleDriver").unwrap_err();
        assert!(matches!(err, DbError::DriverLoad { .. }));
    }

    #[test]
    fn test_accepts_url_probe() {
        let handle = DriverHandle::new("sqlite", DatabaseType::SQLite);
        assert!(handle.accepts_url("sqlite:data.db"));
        assert!(!handle.accepts_url("postgres://localhost/db"));
    }

    #[test]
    fn test_scoped_provider_is_isolated() {
        let scoped = ScopedDrivers::from_table(HashMap::from([(
            "custom-pg".to_string(),
            DatabaseType::PostgreSQL,
        )]));
        assert!(scoped.load("custom-pg").is_ok());
        // Builtin-resolvable modules do not leak into the scope.
        assert!(scoped.load("mysql").is_err());
    }

    #[test]
    fn test_scoped_from_manifest_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"modules": {{"acme-db": "postgresql"}}}}"#).unwrap();
        let scoped = ScopedDrivers::from_archives(&[file.path()]).unwrap();
        assert_eq!(
            scoped.load("acme-db").unwrap().kind(),
            DatabaseType::PostgreSQL
        );
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = ScopedDrivers::from_archives(&[file.path()]).unwrap_err();
        assert!(matches!(err, DbError::DriverLoad { .. }));
    }
}
