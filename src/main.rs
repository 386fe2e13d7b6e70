//! # IndexChat
//!
//! Ask questions over your own documents, images and audio.
//!
//! Usage:
//!   indexchat serve                        # HTTP API (default 127.0.0.1:3000)
//!   indexchat ask "How did Q3 revenue do?" # One answer with sources
//!   indexchat search "revenue" --top-k 3   # Raw retrieval hits
//!   indexchat config init                  # Write a default config

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexchat_core::config::IndexChatConfig;
use indexchat_gateway::AppState;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "indexchat",
    version,
    about = "Multi-modal retrieval-augmented chat over your indexed sources"
)]
struct Cli {
    /// Config file (default: ~/.indexchat/config.toml, or $INDEXCHAT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Answer one question and print the cited sources
    Ask {
        question: String,
        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what retrieval finds for a query
    Search {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config (refuses to overwrite unless --force)
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(|| std::env::var("INDEXCHAT_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(IndexChatConfig::default_path)
}

fn load_config(path: &Path) -> Result<IndexChatConfig> {
    if path.exists() {
        IndexChatConfig::load_from(path).with_context(|| format!("loading {}", path.display()))
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        Ok(IndexChatConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "indexchat=debug,indexchat_knowledge=debug,indexchat_agent=debug,tower_http=debug"
    } else {
        "indexchat=info,indexchat_knowledge=info,indexchat_agent=info,indexchat_gateway=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let path = config_path(&cli);

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init { force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                IndexChatConfig::default().save_to(&path)?;
                println!("Wrote default config to {}", path.display());
            }
            ConfigAction::Show => {
                let mut config = load_config(&path)?;
                redact(&mut config);
                println!("# {}\n{}", path.display(), toml::to_string_pretty(&config)?);
            }
        },

        Command::Serve { host, port } => {
            let mut config = load_config(&path)?;
            if let Some(h) = host {
                config.gateway.host = h;
            }
            if let Some(p) = port {
                config.gateway.port = p;
            }
            indexchat_gateway::start(config).await?;
        }

        Command::Ask { question, json } => {
            let state = AppState::from_config(load_config(&path)?)?;
            let answer = state.agent.answer(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}\n", answer.answer);
                if answer.sources.is_empty() {
                    println!("(no sources)");
                } else {
                    println!("Sources:");
                    for s in &answer.sources {
                        println!("  [{}] {}", s.id, s.file_name);
                    }
                }
            }
        }

        Command::Search { query, top_k } => {
            let state = AppState::from_config(load_config(&path)?)?;
            let top_k = state.config.index.top_k(top_k.map(|k| k as f64));
            let results = state.retriever.retrieve(&query, top_k).await?;
            if results.is_empty() {
                println!("No results for: {query}");
            }
            for r in &results {
                println!(
                    "{:>6.3}  {:<5}  #{:<6} {}",
                    r.rank_score,
                    r.modality.as_str(),
                    r.chunk_id,
                    r.file_name
                );
                println!("        {}", r.payload_text.lines().next().unwrap_or(""));
            }

            let counts = state.retriever.store().stats()?;
            let summary: Vec<String> = counts.iter().map(|(m, n)| format!("{n} {m}")).collect();
            if summary.is_empty() {
                println!("\nIndex {} is empty", state.retriever.store().path().display());
            } else {
                println!("\nIndex: {} chunk(s)", summary.join(", "));
            }
        }
    }

    Ok(())
}

/// Blank out credentials before printing.
fn redact(config: &mut IndexChatConfig) {
    let hide = |key: &mut String| {
        if !key.is_empty() {
            *key = "********".into();
        }
    };
    hide(&mut config.llm.api_key);
    hide(&mut config.embeddings.text.api_key);
    hide(&mut config.embeddings.image.api_key);
    hide(&mut config.embeddings.audio.api_key);
}
