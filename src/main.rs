//! dbbridge - command line entry point.
//!
//! Thin operator surface over the library: list known drivers, or connect
//! to a database and describe its tables.

use clap::Parser;
use dbbridge::config::{Command, Config};
use dbbridge::db::{ConnectionHandler, MetadataCache};
use dbbridge::registry;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

/// Load the optional global and user descriptor files into the registry.
fn load_descriptor_sources(config: &Config) {
    let mut registry = match registry::global().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(path) = &config.global_drivers {
        registry.load_descriptor_file(path, false);
    }
    if let Some(path) = config.user_drivers_path() {
        registry.load_descriptor_file(&path, true);
    }
}

async fn run(config: &Config) -> dbbridge::DbResult<()> {
    match &config.command {
        Command::Drivers => {
            let summaries = {
                let registry = match registry::global().read() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                registry.list_available()
            };
            for summary in summaries {
                let name = summary
                    .descriptor
                    .as_ref()
                    .map(|d| d.name.as_str())
                    .unwrap_or("(no descriptor)");
                match &summary.live_module {
                    Some(module) => println!("{:<24} module: {}", name, module),
                    None => println!("{:<24} driver missing", name),
                }
            }
        }
        Command::Tables { url, names_only } => {
            let mut handler = ConnectionHandler::new();
            handler.connect(url).await?;
            let cache = MetadataCache::new(config.metadata_ttl(), config.only_standard_tables());

            let tables = if *names_only {
                handler
                    .describe_all_tables(
                        |current, total| info!(current, total, "Enumerating tables"),
                        false,
                        config.only_standard_tables(),
                    )
                    .await?
            } else {
                cache.get(url, &mut handler).await?
            };

            for (table, columns) in &tables {
                println!("{}", table);
                for column in columns {
                    println!("  {} {}", column.name, column.type_name);
                }
            }
            info!(count = tables.len(), "Done");
            handler.disconnect().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);
    load_descriptor_sources(&config);

    if let Err(err) = run(&config).await {
        error!(error = %err, "Command failed");
        if let Some(suggestion) = err.suggestion() {
            eprintln!("hint: {}", suggestion);
        }
        return Err(err.into());
    }
    Ok(())
}
