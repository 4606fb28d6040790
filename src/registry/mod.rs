//! Driver descriptor registry.
//!
//! Process-wide state describing which vendors are known and which driver
//! modules are live. The contract is single-writer at startup, many
//! readers afterward: descriptor and driver collections are only appended
//! to (or explicitly removed from), never mutated in place after
//! publication. Concurrent access goes through the coarse lock returned by
//! [`global`].

pub mod descriptors;
pub mod provider;

use crate::error::{DbError, DbResult};
use crate::models::driver::{DriverDescriptor, DriverSummary};
use provider::{BuiltinDrivers, DriverHandle, DriverProvider, ScopedDrivers};
use std::path::Path;
use std::sync::{LazyLock, RwLock};
use tracing::{info, warn};

pub use descriptors::BUNDLED_DESCRIPTORS;

#[derive(Debug, Default)]
pub struct DriverRegistry {
    descriptors: Vec<DriverDescriptor>,
    drivers: Vec<DriverHandle>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the bundled vendor descriptors.
    pub fn with_bundled_defaults() -> Self {
        let mut registry = Self::new();
        // The bundled document is compiled in and known-good.
        if let Err(err) = registry.load_descriptors(BUNDLED_DESCRIPTORS, false) {
            warn!(error = %err, "Bundled descriptors failed to load");
        }
        registry
    }

    /// Parse a descriptor document and register every descriptor in it,
    /// merging same-named ones and attempting to load their driver modules.
    /// A malformed document is an error and loads nothing.
    pub fn load_descriptors(&mut self, source: &str, user_defined: bool) -> DbResult<()> {
        let parsed = descriptors::parse_document(source, user_defined)?;
        for descriptor in parsed {
            self.register(descriptor);
        }
        Ok(())
    }

    /// Read and load a descriptor file. A missing file is not an error; a
    /// malformed one is logged and skipped wholesale.
    pub fn load_descriptor_file(&mut self, path: &Path, user_defined: bool) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Cannot read descriptor file");
                return;
            }
        };
        if let Err(err) = self.load_descriptors(&text, user_defined) {
            warn!(path = %path.display(), error = %err, "Skipping descriptor document");
        } else {
            info!(path = %path.display(), "Loaded descriptor file");
        }
    }

    /// Merge one descriptor into the registry and try to load every module
    /// in the merged module list. Module-load failure is non-fatal: the
    /// descriptor stays registered without a live driver so reporting can
    /// show it as missing.
    pub fn register(&mut self, descriptor: DriverDescriptor) {
        let index = match self.descriptors.iter().position(|d| d.name == descriptor.name) {
            Some(index) => {
                self.descriptors[index].merge(&descriptor);
                index
            }
            None => {
                self.descriptors.push(descriptor);
                self.descriptors.len() - 1
            }
        };
        let name = self.descriptors[index].name.clone();
        let modules = self.descriptors[index].modules.clone();
        let archives = self.descriptors[index].archives.clone();

        let scoped;
        let provider: &dyn DriverProvider = if archives.is_empty() {
            &BuiltinDrivers
        } else {
            match ScopedDrivers::from_archives(&archives) {
                Ok(p) => {
                    scoped = p;
                    &scoped
                }
                Err(err) => {
                    warn!(
                        driver = %name,
                        error = %err,
                        "Archive scope unavailable; descriptor kept without drivers"
                    );
                    return;
                }
            }
        };
        for module in modules {
            if self.drivers.iter().any(|d| d.module() == module) {
                continue;
            }
            match provider.load(&module) {
                Ok(handle) => {
                    info!(driver = %name, module = %module, "Driver module loaded");
                    self.drivers.push(handle);
                }
                Err(err) => {
                    warn!(driver = %name, module = %module, error = %err, "Driver module failed to load");
                }
            }
        }
    }

    /// Every known descriptor paired with a matching live driver (probed
    /// with a synthetic URL), plus live drivers no descriptor claims,
    /// sorted by display name then module.
    pub fn list_available(&self) -> Vec<DriverSummary> {
        let mut summaries = Vec::new();
        let mut claimed = vec![false; self.drivers.len()];

        for descriptor in &self.descriptors {
            let probe = descriptor.probe_url();
            let matched = self
                .drivers
                .iter()
                .enumerate()
                .find(|(_, d)| d.accepts_url(&probe));
            if let Some((index, _)) = matched {
                claimed[index] = true;
            }
            summaries.push(DriverSummary {
                descriptor: Some(descriptor.clone()),
                live_module: matched.map(|(_, d)| d.module().to_string()),
            });
        }

        for (index, driver) in self.drivers.iter().enumerate() {
            if !claimed[index] {
                summaries.push(DriverSummary {
                    descriptor: None,
                    live_module: Some(driver.module().to_string()),
                });
            }
        }

        summaries.sort();
        summaries
    }

    /// Write all user-defined descriptors to `path` in document shape.
    pub fn persist_user_defined(&self, path: &Path) -> DbResult<()> {
        let user_defined: Vec<&DriverDescriptor> =
            self.descriptors.iter().filter(|d| d.user_defined).collect();
        let text = descriptors::serialize_document(&user_defined)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::internal(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, text)
            .map_err(|e| DbError::internal(format!("cannot write {}: {}", path.display(), e)))?;
        info!(path = %path.display(), count = user_defined.len(), "Persisted user descriptors");
        Ok(())
    }

    /// Remove a descriptor by display name. Live drivers stay loaded.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| d.name != name);
        before != self.descriptors.len()
    }

    pub fn descriptor(&self, name: &str) -> Option<&DriverDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn descriptors(&self) -> &[DriverDescriptor] {
        &self.descriptors
    }

    pub fn live_drivers(&self) -> &[DriverHandle] {
        &self.drivers
    }
}

static REGISTRY: LazyLock<RwLock<DriverRegistry>> =
    LazyLock::new(|| RwLock::new(DriverRegistry::with_bundled_defaults()));

/// The process-wide registry. Populate it from the main thread during
/// startup; afterwards take read locks only.
pub fn global() -> &'static RwLock<DriverRegistry> {
    &REGISTRY
}
