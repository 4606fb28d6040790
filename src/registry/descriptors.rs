//! Descriptor document parsing and persistence.
//!
//! A descriptor document is a JSON object with a `drivers` array. Three
//! sources are merged in order: the bundled defaults compiled into the
//! binary, an optional global file, and an optional user file. A document
//! that is not valid JSON (or lacks the `drivers` array) is rejected
//! wholesale; a single bad entry inside a valid document is skipped with a
//! warning and the rest still loads.

use crate::error::{DbError, DbResult};
use crate::models::driver::DriverDescriptor;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Descriptors for the engines this crate compiles in.
pub const BUNDLED_DESCRIPTORS: &str = r#"{
  "drivers": [
    {
      "name": "PostgreSQL",
      "modules": "postgres",
      "port": 5432,
      "url_prefix": "postgres://",
      "separator": "/"
    },
    {
      "name": "MySQL",
      "modules": "mysql,mariadb",
      "port": 3306,
      "url_prefix": "mysql://",
      "separator": "/"
    },
    {
      "name": "SQLite",
      "modules": "sqlite",
      "url_prefix": "sqlite:",
      "separator": ""
    }
  ]
}"#;

/// One driver entry as written in a document. The module list is a
/// comma-separated string, matching the persisted shape.
#[derive(Debug, Serialize, Deserialize)]
struct DescriptorEntry {
    name: String,
    modules: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    url_prefix: String,
    #[serde(default)]
    separator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    archives: Vec<String>,
}

impl DescriptorEntry {
    fn into_descriptor(self, user_defined: bool) -> DbResult<DriverDescriptor> {
        if self.name.trim().is_empty() {
            return Err(DbError::invalid_input("driver entry has an empty name"));
        }
        if self.url_prefix.trim().is_empty() {
            return Err(DbError::invalid_input(format!(
                "driver '{}' has an empty url_prefix",
                self.name
            )));
        }
        let modules: Vec<String> = self
            .modules
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        let mut descriptor = DriverDescriptor::new(self.name, self.url_prefix)
            .with_separator(self.separator)
            .with_modules(modules)
            .with_archives(self.archives);
        if let Some(port) = self.port {
            descriptor = descriptor.with_port(port);
        }
        if user_defined {
            descriptor = descriptor.user_defined();
        }
        Ok(descriptor)
    }

    fn from_descriptor(descriptor: &DriverDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            modules: descriptor.modules.join(","),
            port: descriptor.default_port,
            url_prefix: descriptor.url_prefix.clone(),
            separator: descriptor.separator.clone(),
            archives: descriptor.archives.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DescriptorDocument {
    drivers: Vec<serde_json::Value>,
}

/// Parse a descriptor document. Returns an error only when the document as
/// a whole is malformed; individual bad entries are skipped with a warning.
pub fn parse_document(text: &str, user_defined: bool) -> DbResult<Vec<DriverDescriptor>> {
    let document: DescriptorDocument = serde_json::from_str(text)
        .map_err(|e| DbError::invalid_input(format!("malformed descriptor document: {}", e)))?;

    let mut descriptors = Vec::with_capacity(document.drivers.len());
    for value in document.drivers {
        let parsed = serde_json::from_value::<DescriptorEntry>(value.clone())
            .map_err(|e| DbError::invalid_input(e.to_string()))
            .and_then(|entry| entry.into_descriptor(user_defined));
        match parsed {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(err) => {
                warn!(error = %err, entry = %value, "Skipping bad driver entry");
            }
        }
    }
    Ok(descriptors)
}

/// Serialize descriptors back into the document shape.
pub fn serialize_document(descriptors: &[&DriverDescriptor]) -> DbResult<String> {
    let entries: Vec<serde_json::Value> = descriptors
        .iter()
        .map(|d| serde_json::to_value(DescriptorEntry::from_descriptor(d)))
        .collect::<Result<_, _>>()
        .map_err(|e| DbError::internal(format!("descriptor serialization failed: {}", e)))?;
    serde_json::to_string_pretty(&serde_json::json!({ "drivers": entries }))
        .map_err(|e| DbError::internal(format!("descriptor serialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_defaults_parse() {
        let descriptors = parse_document(BUNDLED_DESCRIPTORS, false).unwrap();
        assert_eq!(descriptors.len(), 3);
        let mysql = descriptors.iter().find(|d| d.name == "MySQL").unwrap();
        assert_eq!(mysql.modules, vec!["mysql", "mariadb"]);
        assert_eq!(mysql.default_port, Some(3306));
        assert!(!mysql.user_defined);
    }

    #[test]
    fn test_malformed_document_rejected_wholesale() {
        assert!(parse_document("{not json", false).is_err());
        assert!(parse_document(r#"{"no_drivers": []}"#, false).is_err());
    }

    #[test]
    fn test_bad_entry_skipped_rest_loads() {
        let text = r#"{
          "drivers": [
            {"name": "Good", "modules": "postgres", "url_prefix": "postgres://"},
            {"name": "", "modules": "x", "url_prefix": "y://"},
            {"modules": "missing-name"},
            {"name": "AlsoGood", "modules": "sqlite", "url_prefix": "sqlite:"}
          ]
        }"#;
        let descriptors = parse_document(text, true).unwrap();
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Good", "AlsoGood"]);
        assert!(descriptors.iter().all(|d| d.user_defined));
    }

    #[test]
    fn test_round_trip_through_document_shape() {
        let original = parse_document(BUNDLED_DESCRIPTORS, false).unwrap();
        let refs: Vec<&DriverDescriptor> = original.iter().collect();
        let text = serialize_document(&refs).unwrap();
        let reparsed = parse_document(&text, false).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_modules_string_trims_whitespace() {
        let text = r#"{"drivers": [
          {"name": "X", "modules": " a , b ,, c", "url_prefix": "x://"}
        ]}"#;
        let descriptors = parse_document(text, false).unwrap();
        assert_eq!(descriptors[0].modules, vec!["a", "b", "c"]);
    }
}
