//! Extract command - pull header and line items from a single NF-e file.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info, warn};

use nfex_core::{FieldProtector, SelectiveProtector};

use super::{OutputFormat, extractor, format_extraction, load_config};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input NF-e XML file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Encrypt sensitive fields before output
    #[arg(long)]
    protect: bool,

    /// Show missing blocks and structural warnings
    #[arg(long)]
    report: bool,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Extracting {}", args.input.display());
    let xml = fs::read_to_string(&args.input)?;
    let report = extractor(&config).extract_with_report(&xml)?;

    if config.extraction.warn_on_missing_blocks {
        for block in &report.missing_blocks {
            warn!("Block '{}' missing from {}", block, args.input.display());
        }
    }

    let mut extraction = report.extraction;
    if args.protect {
        let mut protector = SelectiveProtector::from_config(&config.protection)?;
        extraction = protector.protect(&extraction)?;
        debug!("Protection stats: {:?}", protector.stats());
    }

    let source = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = format_extraction(&extraction, &source, args.format, &config)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.report {
        eprintln!();
        eprintln!(
            "{} {} header fields, {} items in {}ms",
            style("ℹ").blue(),
            extraction.header.len(),
            extraction.items.len(),
            report.processing_time_ms
        );
        if !report.missing_blocks.is_empty() {
            eprintln!(
                "{} Missing blocks: {}",
                style("ℹ").blue(),
                report.missing_blocks.join(", ")
            );
        }
        for warning in &report.warnings {
            eprintln!("{} {}", style("⚠").yellow(), warning);
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}
