//! medscan - analyze photographed and scanned medical documents.
//!
//! Prints one JSON document per invocation on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use medscan::models::{DocumentKind, Gender};
use medscan::pipeline::import::read_document;
use medscan::{build_orchestrator, config, PipelineConfig};

#[derive(Parser)]
#[command(name = "medscan")]
#[command(about = "Extract vitals, medications and lab values from medical documents")]
#[command(version)]
struct Cli {
    /// Pipeline config file (JSON). Defaults to the per-user config if present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// External OCR command printing engine JSON, e.g. "paddleocr-json --lang en".
    /// The image path is appended as the last argument.
    #[arg(long, global = true, env = "MEDSCAN_OCR_COMMAND")]
    ocr_command: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis on an image or PDF
    Analyze {
        file: PathBuf,
        /// Patient gender for gender-specific lab ranges (male/female)
        #[arg(short, long)]
        gender: Option<String>,
    },

    /// Extract text only
    Text { file: PathBuf },

    /// Scan a plain-text file for vital signs
    Vitals { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();
    medscan::init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let ocr_command: Option<Vec<String>> = cli
        .ocr_command
        .as_deref()
        .map(|c| c.split_whitespace().map(str::to_string).collect());

    tracing::debug!(version = config::APP_VERSION, "medscan starting");

    match cli.command {
        Commands::Analyze { file, gender } => {
            let orchestrator = build_orchestrator(&config, ocr_command.as_deref())?;
            let gender = gender.as_deref().map(Gender::parse_loose);
            let result = orchestrator
                .analyze_file(&file, gender)
                .with_context(|| format!("analyzing {}", file.display()))?;
            print_json(&result, cli.pretty)
        }
        Commands::Text { file } => {
            let orchestrator = build_orchestrator(&config, ocr_command.as_deref())?;
            let (bytes, detection) = read_document(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            if detection.kind == DocumentKind::Unsupported {
                anyhow::bail!("{}: unsupported format ({})", file.display(), detection.mime_type);
            }
            let outcome = orchestrator
                .extractor()
                .extract(&bytes, detection.kind)
                .with_context(|| format!("extracting text from {}", file.display()))?;
            print_json(&outcome, cli.pretty)
        }
        Commands::Vitals { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let extractor = medscan::pipeline::fields::FieldExtractor::new(config.temperature);
            print_json(&extractor.extract(&text), cli.pretty)
        }
    }
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    if let Some(path) = explicit {
        return PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    match config::config_file_path() {
        Some(path) => PipelineConfig::load_or_default(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
