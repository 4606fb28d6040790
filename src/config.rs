//! Configuration handling.
//!
//! Settings come from CLI arguments and environment variables; descriptor
//! file locations resolve against the platform configuration directory.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_METADATA_TTL_SECS: u64 = 300;

/// Command line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "dbbridge", about = "Uniform SQL database access layer")]
pub struct Config {
    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, env = "DBBRIDGE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL, global = true)]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "DBBRIDGE_JSON_LOGS", default_value_t = false, global = true)]
    pub json_logs: bool,

    /// Global descriptor document to load after the bundled defaults
    #[arg(long, env = "DBBRIDGE_GLOBAL_DRIVERS", global = true)]
    pub global_drivers: Option<PathBuf>,

    /// User descriptor document; defaults to the platform config directory
    #[arg(long, env = "DBBRIDGE_USER_DRIVERS", global = true)]
    pub user_drivers: Option<PathBuf>,

    /// Include views when enumerating tables
    #[arg(long, env = "DBBRIDGE_INCLUDE_VIEWS", default_value_t = false, global = true)]
    pub include_views: bool,

    /// Metadata cache time-to-live in seconds; 0 disables staleness
    #[arg(long, env = "DBBRIDGE_METADATA_TTL", default_value_t = DEFAULT_METADATA_TTL_SECS, global = true)]
    pub metadata_ttl_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// List known drivers and whether a live module backs each
    Drivers,
    /// Connect and describe every table
    Tables {
        /// Connection URL (postgres://, mysql:// or sqlite:)
        #[arg(long, env = "DBBRIDGE_URL")]
        url: String,
        /// Skip per-table column introspection
        #[arg(long, default_value_t = false)]
        names_only: bool,
    },
}

impl Config {
    /// Whether enumeration is restricted to ordinary tables.
    pub fn only_standard_tables(&self) -> bool {
        !self.include_views
    }

    /// Metadata cache staleness policy; `None` disables it.
    pub fn metadata_ttl(&self) -> Option<Duration> {
        if self.metadata_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.metadata_ttl_secs))
        }
    }

    /// User descriptor file: the explicit override or the platform default.
    pub fn user_drivers_path(&self) -> Option<PathBuf> {
        self.user_drivers
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join("dbbridge").join("drivers.json")))
    }
}
