//! Command-line interface for lexipipe.
//!
//! `run` executes one ingestion pass (the scheduled entry point), `status`
//! summarizes durable state, `config` prints the resolved configuration.
//! Per-item failures never produce a non-zero exit; only setup failures do.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chrono::Local;

use crate::adapters::{CardClient, OpenAiEnricher, OpenAiTranscriber};
use crate::config::{load_config, ResolvedConfig, Secrets};
use crate::pipeline::{Orchestrator, RunLock};
use crate::store::{DurableIndex, Ledger, RetryFs, RotationController};

/// lexipipe - idempotent ingestion of captured vocabulary and audio
#[derive(Parser, Debug)]
#[command(name = "lexipipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one ingestion pass over both capture streams
    Run {
        /// Skip the card service entirely for this pass
        #[arg(long)]
        no_sync: bool,
    },

    /// Show counts from the durable indexes and ledger
    Status,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the parsed command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { no_sync } => run_pass(no_sync).await,
            Commands::Status => status().await,
            Commands::Config => show_config(),
        }
    }
}

/// Build the orchestrator from resolved config and bootstrap secrets.
fn build_orchestrator(config: ResolvedConfig, no_sync: bool) -> Result<Orchestrator> {
    let secrets = Secrets::from_env()?;

    let enricher = OpenAiEnricher::new(
        config.api.base_url.clone(),
        secrets.api_key.clone(),
        config.api.enrich_model.clone(),
        config.api.timeout,
    );
    let transcriber = OpenAiTranscriber::new(
        config.api.base_url.clone(),
        secrets.api_key,
        config.api.transcribe_model.clone(),
        config.api.timeout,
    );

    let cards = if no_sync {
        None
    } else {
        config.cards.as_ref().map(|c| {
            CardClient::new(
                c.endpoint.clone(),
                c.deck.clone(),
                c.note_model.clone(),
                Duration::from_secs(10),
            )
        })
    };

    Ok(Orchestrator::new(
        config,
        Box::new(enricher),
        Box::new(transcriber),
        cards,
    ))
}

async fn run_pass(no_sync: bool) -> Result<()> {
    let config = load_config()?;

    // Overlapping scheduled runs exit here without touching any state
    let _lock = RunLock::acquire(&config.lock_path())
        .context("Could not acquire the run lock")?;

    let orchestrator = build_orchestrator(config, no_sync)?;
    orchestrator.preflight().await?;

    let report = orchestrator.run_pass().await?;

    println!(
        "vocab: ok {} skipped {} failed {}",
        report.vocab.ok, report.vocab.skipped, report.vocab.failed
    );
    println!(
        "audio: ok {} skipped {} failed {}",
        report.audio.ok, report.audio.skipped, report.audio.failed
    );
    if report.rotated {
        println!("inbox rotated");
    }
    if let Some(cards) = report.cards {
        println!(
            "cards: accepted {} duplicates {}",
            cards.accepted, cards.duplicates
        );
    }

    Ok(())
}

/// Read-only inspection: tolerates a fresh install with nothing on disk
/// and never creates or repairs any file.
async fn status() -> Result<()> {
    let config = load_config()?;
    let fs = RetryFs::new(config.retry.clone());

    let audio_index = DurableIndex::load(config.audio_index(), fs.clone()).await?;
    let vocab_index = DurableIndex::load(config.vocab_index(), fs.clone()).await?;
    let ledger_words = Ledger::word_count(&config.ledger_path).await?;

    let rotation = RotationController::new(
        config.home.clone(),
        config.words_inbox(),
        config.archive_dir(),
        fs,
    );
    let today = Local::now().date_naive();

    println!("audio index:  {} items", audio_index.len());
    println!("vocab index:  {} items", vocab_index.len());
    println!("ledger:       {} words", ledger_words);
    println!(
        "rotation:     {}",
        if rotation.is_rotated(today) {
            "done for today"
        } else {
            "pending"
        }
    );

    Ok(())
}

fn show_config() -> Result<()> {
    let config = load_config()?;
    println!("{:#?}", config);
    Ok(())
}
