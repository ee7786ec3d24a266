//! Fit text to a token budget, or inspect how it would be triaged.
//!
//! Generation goes through OpenRouter; the API key is read from the config
//! file or the `OPENROUTER_KEY` environment variable. Input is read from
//! `--input` or stdin.
//!
//! # Examples
//!
//! ```sh
//! # Show each segment's entropy and whether it would be kept (offline)
//! distill triage --input notes.md
//!
//! # Compress a transcript to 2000 tokens
//! cat transcript.txt | distill compress --budget 2000
//!
//! # Archive a document and query it
//! distill --config distill.json query --input manual.md --query "reset procedure"
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use distill_rs::config::{
    EmbeddingBackend, EngineConfig, EngineConfigOverrides, ProviderOverrides, TokenizerKind,
    TriageOverrides,
};
use distill_rs::engine::ContextEngine;
use distill_rs::error::Result;
use distill_rs::triage::{classify_by_entropy, split_into_batches};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Context budget manager: entropy triage, summarizing archive, recursive
/// compression.
#[derive(Parser)]
#[command(name = "distill", version)]
struct Cli {
    /// JSON config file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model used for summaries.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Embedding backend for the archive.
    #[arg(long, global = true, value_enum)]
    embedding: Option<EmbeddingArg>,

    /// Tokenizer used to measure budgets.
    #[arg(long, global = true, value_enum)]
    tokenizer: Option<TokenizerArg>,

    /// Maximum characters per triage segment.
    #[arg(long, global = true)]
    max_batch_chars: Option<usize>,

    /// Segments at or above this entropy are kept verbatim.
    #[arg(long, global = true)]
    entropy_threshold: Option<f64>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print each segment's entropy and classification. Needs no API key.
    Triage {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the input fitted to a token budget.
    Compress {
        /// Target size in tokens.
        #[arg(long)]
        budget: usize,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Ingest the input into a fresh session and print the archived texts
    /// most relevant to a query.
    Query {
        #[arg(long)]
        query: String,
        /// Number of results (default from config).
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbeddingArg {
    Hashing,
    #[value(name = "openrouter")]
    OpenRouter,
}

#[derive(Clone, Copy, ValueEnum)]
enum TokenizerArg {
    CharRatio,
    Words,
}

impl From<EmbeddingArg> for EmbeddingBackend {
    fn from(arg: EmbeddingArg) -> Self {
        match arg {
            EmbeddingArg::Hashing => EmbeddingBackend::Hashing,
            EmbeddingArg::OpenRouter => EmbeddingBackend::OpenRouter,
        }
    }
}

impl From<TokenizerArg> for TokenizerKind {
    fn from(arg: TokenizerArg) -> Self {
        match arg {
            TokenizerArg::CharRatio => TokenizerKind::CharRatio,
            TokenizerArg::Words => TokenizerKind::Words,
        }
    }
}

impl Cli {
    /// Defaults, then the config file, then flags.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        config.apply(EngineConfigOverrides {
            provider: ProviderOverrides {
                generation_model: self.model.clone(),
                embedding: self.embedding.map(Into::into),
                tokenizer: self.tokenizer.map(Into::into),
                ..Default::default()
            },
            triage: TriageOverrides {
                max_batch_chars: self.max_batch_chars,
                entropy_threshold: self.entropy_threshold,
            },
            ..Default::default()
        });
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// First `max` characters on one line, for segment listings.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .take(max)
        .collect();
    if text.chars().count() > max {
        format!("{flat}...")
    } else {
        flat
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.engine_config()?;

    match &cli.command {
        Command::Triage { input } => {
            let text = read_input(input.as_ref())?;
            let segments = split_into_batches(&text, config.triage.max_batch_chars);
            for segment in &segments {
                let verdict = if segment.entropy() >= config.triage.entropy_threshold {
                    "retain "
                } else {
                    "archive"
                };
                println!(
                    "{verdict} {:>5.3} {:>5} {}",
                    segment.entropy(),
                    segment.char_len,
                    preview(segment.text, 60)
                );
            }
            let classified = classify_by_entropy(segments, config.triage.entropy_threshold);
            info!(
                "{} segment(s): {} retained, {} archived",
                classified.len(),
                classified.retain.len(),
                classified.archive.len()
            );
        }
        Command::Compress { budget, input } => {
            let text = read_input(input.as_ref())?;
            let engine = ContextEngine::from_config(config)?;
            let compressed = engine.compress(&text, *budget).await?;
            info!(
                "{:?} after {} pass(es), {} segment(s) summarized",
                compressed.outcome, compressed.passes, compressed.archived_segments
            );
            println!("{}", compressed.text);
        }
        Command::Query {
            query,
            top_k,
            input,
        } => {
            let text = read_input(input.as_ref())?;
            let mut engine = ContextEngine::from_config(config)?;
            engine.ingest(&text).await?;
            let hits = engine.search(query, *top_k).await?;
            if hits.is_empty() {
                info!("no archived text matches the query");
            }
            for hit in hits {
                println!("── score {:.3} ── {}", hit.score, hit.summary);
                println!("{}\n", hit.original_text);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
