//! # Connector Configuration Validator
//!
//! Command-line tool for validating connector configuration across
//! environments before starting state machine managers.

use clap::{Parser, Subcommand};
use dataspace_core::config::{ConfigManager, ConnectorConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate dataspace connector configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: $DATASPACE_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate, printing the effective configuration as JSON
    Validate,

    /// List environments that have an override file
    Environments,

    /// Show settings that differ between two environments
    Compare {
        /// Base environment for comparison
        #[arg(short, long, default_value = "development")]
        base: String,

        /// Target environment for comparison
        #[arg(short, long)]
        target: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Compare { base, target }) => compare(&cli, base, target),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("Configuration invalid: {e}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> Result<ConnectorConfig, Box<dyn std::error::Error>> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)?;
    Ok(manager.config().clone())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(cli, &cli.environment)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn config_directory(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(|| {
        std::env::var("DATASPACE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    })
}

fn list_environments(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let dir = config_directory(cli);
    for environment in environments_in(&dir)? {
        println!("{environment}");
    }
    Ok(())
}

fn environments_in(dir: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut environments: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .filter(|stem| stem != "base")
        .collect();
    environments.sort();
    Ok(environments)
}

fn compare(cli: &Cli, base: &str, target: &str) -> Result<(), Box<dyn std::error::Error>> {
    let base_config = serde_json::to_value(load(cli, base)?)?;
    let target_config = serde_json::to_value(load(cli, target)?)?;

    let mut differences = Vec::new();
    diff("", &base_config, &target_config, &mut differences);

    if differences.is_empty() {
        println!("{base} and {target} are identical");
    }
    for (path, left, right) in differences {
        println!("{path}: {left} -> {right}");
    }
    Ok(())
}

fn diff(path: &str, left: &Value, right: &Value, out: &mut Vec<(String, Value, Value)>) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, lv) in l {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                diff(&child, lv, r.get(key).unwrap_or(&Value::Null), out);
            }
        }
        _ if left != right => out.push((path.to_string(), left.clone(), right.clone())),
        _ => {}
    }
}
