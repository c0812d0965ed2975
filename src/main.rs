//! # Context Vault CLI (`cvault`)
//!
//! ## Usage
//!
//! ```bash
//! cvault --config ./config/vault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cvault serve` | Start the HTTP server |
//! | `cvault hash-secret <secret>` | Print an Argon2 hash for `[[auth.users]]` |
//! | `cvault check-config` | Validate the config file and print a summary |
//!
//! Log verbosity follows `RUST_LOG` (default `info,context_vault=info`).
//! Logs go to stderr. A `.env` file in the working directory is loaded
//! before anything else.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use context_vault::config;
use context_vault::credentials::hash_secret;
use context_vault::server;

/// Context Vault: identity-scoped text ingestion and semantic retrieval.
#[derive(Parser)]
#[command(name = "cvault", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Hash a secret for the `secret_hash` field of a user entry.
    ///
    /// The plaintext is never written anywhere; paste the printed PHC string
    /// into the config file.
    HashSecret {
        /// The secret to hash.
        secret: String,
    },

    /// Load and validate the config file without starting anything.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,context_vault=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::HashSecret { secret } => {
            println!("{}", hash_secret(&secret)?);
        }
        Commands::CheckConfig => {
            let cfg = config::load_config(&cli.config)
                .with_context(|| format!("invalid config: {}", cli.config.display()))?;
            println!("config OK: {}", cli.config.display());
            println!("  bind:       {}", cfg.server.bind);
            println!("  users:      {}", cfg.auth.users.len());
            println!("  token ttl:  {}s", cfg.auth.token_ttl_secs);
            match std::env::var("VAULT_SIGNING_KEY")
                .ok()
                .or_else(|| cfg.auth.signing_key.clone())
            {
                Some(key) => println!("  signing key: {}", config::key_fingerprint(key.as_bytes())),
                None => println!("  signing key: ephemeral (generated at start-up)"),
            }
            println!(
                "  embedding:  {} ({})",
                cfg.embedding.provider,
                cfg.embedding.model.as_deref().unwrap_or("-")
            );
            println!(
                "  store:      {} / {}",
                cfg.store.provider, cfg.store.collection
            );
            println!(
                "  top_k:      default {}, max {} ({:?})",
                cfg.retrieval.default_top_k, cfg.retrieval.max_top_k, cfg.retrieval.top_k_policy
            );
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
