//! medrag - Command-line front-end for the multimodal medical imaging assistant
//!
//! # Commands
//!
//! - `ask`: Build the index, then answer a question (optionally about an image)
//! - `status`: Build the index and print collection diagnostics
//! - `ping`: Check the generation model is reachable
//! - `config init`: Write a settings file with defaults
//! - `config set-key` / `config clear-key`: Manage API keys in the OS keychain

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use medrag::config::Settings;
use medrag::embedding::provider_from_settings as embedder_from_settings;
use medrag::index::index_from_settings;
use medrag::providers::ai::provider_from_settings as llm_from_settings;
use medrag::services::{ping, Generator, LlmGenerator, MultimodalAssistant};
use medrag::storage::KeychainAccess;

/// Multimodal retrieval-augmented assistant for medical images
#[derive(Parser)]
#[command(name = "medrag")]
#[command(version)]
#[command(about = "Ask questions about medical scans, grounded in similar prior cases")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question, optionally about an image
    Ask {
        /// The question
        query: String,

        /// Scan to analyse alongside the question
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Print the retrieved references after the answer
        #[arg(long)]
        show_context: bool,
    },
    /// Build the index and print diagnostics
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send a test prompt to the generation model
    Ping,
    /// Settings and credentials
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write default settings (refuses to overwrite without --force)
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Store an API key in the OS keychain
    SetKey {
        /// Which credential to set
        #[arg(long, value_enum, default_value_t = KeyTarget::Generation)]
        target: KeyTarget,
        /// The secret
        value: String,
    },
    /// Remove an API key from the OS keychain
    ClearKey {
        /// Which credential to remove
        #[arg(long, value_enum, default_value_t = KeyTarget::Generation)]
        target: KeyTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyTarget {
    /// The generation provider's key
    Generation,
    /// The vector store's key
    Store,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let keychain = KeychainAccess::new();

    match cli.command {
        Commands::Config { action } => run_config(action, &path, &keychain).await,
        Commands::Ping => {
            let settings = Settings::load_or_default(&path)?;
            let generator = build_generator(&settings, &keychain).await?;
            let reply = ping(generator.as_ref())
                .await
                .context("API connection test failed")?;
            println!("API connection OK ({})", generator.describe());
            println!("{}", reply);
            Ok(())
        }
        Commands::Status { json } => {
            let settings = Settings::load_or_default(&path)?;
            let assistant = start(&settings, &keychain).await?;
            let status = assistant.status().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Collection:  {} ({})", status.collection, status.backend);
                println!("Records:     {}", status.record_count);
                println!("Embedder:    {}", status.embedder);
                println!("Generator:   {}", status.generator);
                println!("Top k:       {}", status.top_k);
                let build = &status.last_build;
                println!(
                    "Last build:  {} splits loaded, {} records upserted, {} batches skipped in {} ms",
                    build.splits_loaded(),
                    build.records_upserted(),
                    build.batches_skipped(),
                    build.duration().num_milliseconds()
                );
            }
            Ok(())
        }
        Commands::Ask {
            query,
            image,
            show_context,
        } => {
            let settings = Settings::load_or_default(&path)?;
            let assistant = start(&settings, &keychain).await?;
            let answer = assistant.answer(&query, image.as_deref()).await?;

            println!("{}", answer.text);
            if show_context {
                println!();
                for (i, hit) in answer.retrieval.context.iter().enumerate() {
                    println!(
                        "[{}] {} ({}, score {:.3}): {}",
                        i + 1,
                        hit.source_name(),
                        hit.modality,
                        hit.score,
                        hit.caption
                    );
                }
            }
            Ok(())
        }
    }
}

async fn run_config(
    action: ConfigCommands,
    path: &Path,
    keychain: &KeychainAccess,
) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Settings::default().save(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommands::SetKey { target, value } => {
            let settings = Settings::load_or_default(path)?;
            let key = keychain_key(&settings, target)?;
            keychain.store(&key, &value).await?;
            println!("Stored {}", key);
        }
        ConfigCommands::ClearKey { target } => {
            let settings = Settings::load_or_default(path)?;
            let key = keychain_key(&settings, target)?;
            keychain.delete(&key).await?;
            println!("Removed {}", key);
        }
    }
    Ok(())
}

fn keychain_key(settings: &Settings, target: KeyTarget) -> anyhow::Result<String> {
    match target {
        KeyTarget::Generation => Ok(settings.generation.keychain_key()),
        KeyTarget::Store => settings
            .index
            .keychain_key()
            .context("the configured store does not use an API key"),
    }
}

async fn build_generator(
    settings: &Settings,
    keychain: &KeychainAccess,
) -> anyhow::Result<Arc<dyn Generator>> {
    let api_key = keychain
        .resolve(
            settings.generation.api_key_env.as_deref(),
            &settings.generation.keychain_key(),
        )
        .await?;
    let provider = llm_from_settings(&settings.generation, api_key)?;
    Ok(Arc::new(LlmGenerator::from_settings(
        provider,
        &settings.generation,
    )))
}

/// Wires every collaborator and builds the index.
async fn start(
    settings: &Settings,
    keychain: &KeychainAccess,
) -> anyhow::Result<MultimodalAssistant> {
    let generator = build_generator(settings, keychain).await?;

    let store_key = match settings.index.keychain_key() {
        Some(key) => keychain.retrieve(&key).await?,
        None => None,
    };
    let index = index_from_settings(&settings.index, store_key)?;

    // Model loading is blocking and may download weights
    let embedding = settings.embedding.clone();
    let embedder = tokio::task::spawn_blocking(move || embedder_from_settings(&embedding))
        .await
        .context("embedding model loader panicked")??;

    let assistant = MultimodalAssistant::startup(settings, embedder, index, generator)
        .await
        .context("failed to build index")?;
    Ok(assistant)
}
