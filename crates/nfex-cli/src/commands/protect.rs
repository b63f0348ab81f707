//! Protect command - write an export with sensitive fields encrypted.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use nfex_core::protect::{PROTECTION_VERSION, ProtectionStats};
use nfex_core::{FieldProtector, Record, SelectiveProtector};

use super::{extractor, load_config};

/// Arguments for the protect command.
#[derive(Args)]
pub struct ProtectArgs {
    /// Input NF-e XML file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct SecureExport<'a> {
    metadata: ExportMetadata<'a>,
    header: &'a Record,
    items: &'a [Record],
}

#[derive(Serialize)]
struct ExportMetadata<'a> {
    source: &'a str,
    exported_at: String,
    protection_version: &'static str,
    stats: &'a ProtectionStats,
}

pub async fn run(args: ProtectArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let xml = fs::read_to_string(&args.input)?;
    let extraction = extractor(&config).extract(&xml)?;

    let mut protector = SelectiveProtector::from_config(&config.protection)?;
    let protected = protector.protect(&extraction)?;

    let source = args
        .input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("nfe.xml");

    let export = SecureExport {
        metadata: ExportMetadata {
            source,
            exported_at: Utc::now().to_rfc3339(),
            protection_version: PROTECTION_VERSION,
            stats: protector.stats(),
        },
        header: &protected.header,
        items: &protected.items,
    };

    let output = serde_json::to_string_pretty(&export)?;
    info!(
        "Protected {} fields of {}",
        protector.stats().encrypted_fields,
        source
    );

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Secure export written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}
