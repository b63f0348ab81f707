//! Config command - inspect and edit the configuration file.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;
use serde_json::Value;

use nfex_core::models::config::NfexConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "analysis.step_delay_ms")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value (parsed as JSON, otherwise taken as a string)
        value: String,
    },

    /// Restore a configuration value to its default
    Reset {
        /// Configuration key
        key: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    let store = ConfigStore::locate();

    match args.command {
        ConfigCommand::Show => {
            if !store.exists() {
                eprintln!("{} No config file found, showing defaults.", style("ℹ").blue());
            }
            println!("{}", serde_json::to_string_pretty(&store.load()?)?);
        }
        ConfigCommand::Init(init_args) => init(&store, init_args)?,
        ConfigCommand::Get { key } => {
            let value = lookup(&store.load()?, &key)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ConfigCommand::Set { key, value } => {
            let value = parse_value(&value);
            let updated = with_value(store.load()?, &key, value.clone())?;
            store.write(&updated)?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
        }
        ConfigCommand::Reset { key } => {
            let default = lookup(&NfexConfig::default(), &key)?;
            let updated = with_value(store.load()?, &key, default.clone())?;
            store.write(&updated)?;
            println!("{} Reset {} = {}", style("✓").green(), key, default);
        }
        ConfigCommand::Path => {
            println!("Configuration file: {}", store.path.display());
            if store.exists() {
                println!("Status: {}", style("exists").green());
            } else {
                println!("Status: {}", style("not created").yellow());
                println!();
                println!("Run 'nfex config init' to create a configuration file.");
            }
        }
    }

    Ok(())
}

/// `<config dir>/nfex/config.json`, or `NFEX_CONFIG` when set.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("NFEX_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nfex")
        .join("config.json")
}

/// The configuration file the CLI reads and writes.
struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    fn locate() -> Self {
        Self {
            path: default_config_path(),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Stored configuration, or the defaults when no file exists yet.
    fn load(&self) -> anyhow::Result<NfexConfig> {
        if !self.exists() {
            return Ok(NfexConfig::default());
        }
        NfexConfig::from_file(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    fn write(&self, config: &NfexConfig) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        config
            .save(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

fn init(store: &ConfigStore, args: InitArgs) -> anyhow::Result<()> {
    let target = match args.output {
        Some(path) => ConfigStore { path },
        None => ConfigStore {
            path: store.path.clone(),
        },
    };

    if target.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            target.path.display()
        );
    }

    target.write(&NfexConfig::default())?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        target.path.display()
    );

    Ok(())
}

/// JSON when it parses, a plain string otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Dotted key to a JSON pointer: `analysis.endpoint` → `/analysis/endpoint`.
fn pointer(key: &str) -> String {
    format!("/{}", key.replace('.', "/"))
}

fn lookup(config: &NfexConfig, key: &str) -> anyhow::Result<Value> {
    serde_json::to_value(config)?
        .pointer(&pointer(key))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))
}

/// Copy of `config` with `key` replaced. Only existing keys can be set, and
/// the result must deserialize and pass validation.
fn with_value(config: NfexConfig, key: &str, value: Value) -> anyhow::Result<NfexConfig> {
    let mut json = serde_json::to_value(&config)?;
    let slot = json
        .pointer_mut(&pointer(key))
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    *slot = value;

    let updated: NfexConfig =
        serde_json::from_value(json).with_context(|| format!("Invalid value for {}", key))?;
    updated.validate()?;

    Ok(updated)
}
