use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;

use billsense::config::{self, BillsenseConfig, ConfigError};
use billsense::models::facts::FactKey;
use billsense::pipeline::extraction::run_provider;
use billsense::pipeline::{canonicalize, classify, fingerprint, HeuristicExtractor, Session};

#[derive(Parser)]
#[command(name = "billsense", version = config::APP_VERSION)]
#[command(about = "Classify, fingerprint and reconcile healthcare billing documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest text files and print the session report as JSON
    Analyze {
        /// Document text files (bills, EOBs, receipts, FSA statements)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Write the report and snapshots under this directory
        #[arg(long)]
        dump_dir: Option<PathBuf>,
        /// Dump to the default location under the app data directory
        #[arg(long, conflicts_with = "dump_dir")]
        dump: bool,
        /// Description similarity threshold for the coverage join (0.0 to 1.0)
        #[arg(long)]
        threshold: Option<f64>,
        /// Day-level date tolerance for the coverage join
        #[arg(long)]
        date_window: Option<u32>,
        /// External analysis JSON whose savings are merged into the report
        #[arg(long)]
        analysis: Option<PathBuf>,
    },
    /// Print the canonical identity string and fingerprint of a document
    Fingerprint {
        file: PathBuf,
    },
    /// Print the classification of a document
    Classify {
        file: PathBuf,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid analysis JSON in {path}: {source}")]
    AnalysisJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

fn read_text(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn analyze(
    files: &[PathBuf],
    config: BillsenseConfig,
    analysis: Option<&Path>,
) -> Result<(), CliError> {
    config.validate()?;

    let texts = files
        .iter()
        .map(|f| read_text(f))
        .collect::<Result<Vec<_>, _>>()?;
    let external = analysis
        .map(|path| {
            let raw = read_text(path)?;
            serde_json::from_str::<serde_json::Value>(&raw).map_err(|source| {
                CliError::AnalysisJson {
                    path: path.to_path_buf(),
                    source,
                }
            })
        })
        .transpose()?;

    tracing::info!(files = files.len(), "Analyze: starting");

    let mut session = Session::new(config);
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let outcomes = session.ingest_batch(&refs, &HeuristicExtractor::new());
    for (file, outcome) in files.iter().zip(&outcomes) {
        tracing::info!(
            file = %file.display(),
            document_id = %outcome.document_id,
            fingerprint = %outcome.fingerprint,
            line_items = outcome.line_items_added,
            "Analyze: ingested"
        );
    }

    let report = session.report(external.as_ref());
    session.dump(&report);
    print_json(&report)
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Analyze {
            files,
            dump_dir,
            dump,
            threshold,
            date_window,
            analysis,
        } => {
            let mut config = BillsenseConfig::from_env()?;
            if let Some(t) = threshold {
                config.coverage.description_threshold = t;
            }
            if let Some(days) = date_window {
                config.coverage.date_window_days = days;
            }
            if dump_dir.is_some() {
                config.dump_dir = dump_dir;
            } else if dump {
                config.dump_dir = Some(config::default_dump_dir());
            }
            analyze(&files, config, analysis.as_deref())
        }
        Commands::Fingerprint { file } => {
            let text = read_text(&file)?;
            let classification = classify(&text);
            let extraction = run_provider(
                &HeuristicExtractor::new(),
                &text,
                classification.document_type,
            );
            let mut facts = extraction.facts;
            if facts.get(FactKey::DocumentType).is_none() {
                facts = facts.with(FactKey::DocumentType, classification.document_type.as_str());
            }
            let canonical = canonicalize(&facts);
            print_json(&serde_json::json!({
                "canonical": canonical,
                "fingerprint": fingerprint(&canonical),
                "facts": facts,
            }))
        }
        Commands::Classify { file } => {
            let text = read_text(&file)?;
            print_json(&classify(&text))
        }
    }
}

fn main() {
    billsense::init_tracing();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!(error = %e, "billsense failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
