//! Driver descriptor value objects.
//!
//! A `DriverDescriptor` describes one vendor's connectivity shape: URL
//! prefix, default port, the driver modules that implement it, and
//! optionally external archives to resolve those modules from. Descriptors
//! from later sources merge into earlier same-named ones field-by-field.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDescriptor {
    /// Vendor display name; merge key.
    pub name: String,
    pub url_prefix: String,
    pub default_port: Option<u16>,
    /// Separator between host/port and the database name in the URL.
    pub separator: String,
    /// Ordered driver module identifiers. Order matters: earlier modules
    /// are preferred when several load successfully.
    pub modules: Vec<String>,
    /// External archive paths to resolve modules from, when present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<String>,
    /// True when the descriptor came from (or was edited into) the
    /// user-level source.
    #[serde(default)]
    pub user_defined: bool,
}

impl DriverDescriptor {
    pub fn new(name: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_prefix: url_prefix.into(),
            default_port: None,
            separator: "/".to_string(),
            modules: Vec::new(),
            archives: Vec::new(),
            user_defined: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.default_port = Some(port);
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_modules(mut self, modules: Vec<String>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_archives(mut self, archives: Vec<String>) -> Self {
        self.archives = archives;
        self
    }

    pub fn user_defined(mut self) -> Self {
        self.user_defined = true;
        self
    }

    /// Merge `later` into this descriptor. Non-empty scalar fields from the
    /// later source win; module and archive lists are unioned preserving
    /// first-seen order; user_defined is sticky once set by any source.
    pub fn merge(&mut self, later: &DriverDescriptor) {
        if !later.url_prefix.is_empty() {
            self.url_prefix = later.url_prefix.clone();
        }
        if later.default_port.is_some() {
            self.default_port = later.default_port;
        }
        if !later.separator.is_empty() {
            self.separator = later.separator.clone();
        }
        for module in &later.modules {
            if !self.modules.contains(module) {
                self.modules.push(module.clone());
            }
        }
        for archive in &later.archives {
            if !self.archives.contains(archive) {
                self.archives.push(archive.clone());
            }
        }
        self.user_defined = self.user_defined || later.user_defined;
    }

    /// Synthetic URL used to probe whether a live driver accepts this
    /// vendor's connection strings.
    pub fn probe_url(&self) -> String {
        match self.default_port {
            Some(port) => format!("{}localhost:{}{}probe", self.url_prefix, port, self.separator),
            None => format!("{}localhost{}probe", self.url_prefix, self.separator),
        }
    }
}

/// Pairs a currently-loaded driver module (may be absent) with its
/// descriptor (may be absent). Reporting only.
#[derive(Debug, Clone, Serialize)]
pub struct DriverSummary {
    pub descriptor: Option<DriverDescriptor>,
    /// Module identifier of the live driver, when one is loaded.
    pub live_module: Option<String>,
}

impl DriverSummary {
    fn sort_key(&self) -> (&str, &str) {
        let name = self.descriptor.as_ref().map(|d| d.name.as_str()).unwrap_or("");
        let module = self.live_module.as_deref().unwrap_or("");
        (name, module)
    }

    /// True when a descriptor exists but no live driver backs it.
    pub fn driver_missing(&self) -> bool {
        self.descriptor.is_some() && self.live_module.is_none()
    }
}

impl PartialEq for DriverSummary {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for DriverSummary {}

impl PartialOrd for DriverSummary {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DriverSummary {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
