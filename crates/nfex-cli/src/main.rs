//! CLI application for Brazilian NF-e extraction and analysis.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{analyze, batch, config, extract, protect};

/// NF-e extractor - Pull header and line items out of Brazilian electronic invoices
#[derive(Parser)]
#[command(name = "nfex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a single NF-e XML file
    Extract(extract::ExtractArgs),

    /// Extract multiple NF-e XML files
    Batch(batch::BatchArgs),

    /// Write a protected export of an NF-e
    Protect(protect::ProtectArgs),

    /// Run the analysis agents against an NF-e
    Analyze(analyze::AnalyzeArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Extract(args) => extract::run(args, cli.config.as_deref()).await,
        Commands::Batch(args) => batch::run(args, cli.config.as_deref()).await,
        Commands::Protect(args) => protect::run(args, cli.config.as_deref()).await,
        Commands::Analyze(args) => analyze::run(args, cli.config.as_deref()).await,
        Commands::Config(args) => config::run(args).await,
    }
}
