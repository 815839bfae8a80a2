//! `stockctl`: warehouse tooling for the stock ledger.
//!
//! Reads `stockledger.toml` (or the path given with `--config`), opens the
//! SQLite ledger, runs one command and prints its result as JSON.
//!
//! ```text
//! stockctl provision --product 6f1c... --location main --reorder-point 5 --opening 40
//! stockctl transfer <from-id> <to-id> 10 --reference T-88
//! stockctl summary <id> --days 30
//! ```

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use commands::Command;
use settings::Settings;
use stockledger_core::{analytics::Analytics, engine::StockEngine};
use stockledger_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stockctl", author, version, about = "Stock ledger tooling")]
struct Cli {
  /// Path to the TOML settings file.
  #[arg(short, long, default_value = "stockledger.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so stdout stays machine-readable.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open ledger at {:?}", settings.store_path))?;

  let engine = StockEngine::new(store.clone()).with_retry_policy(settings.retry.into());
  let analytics = Analytics::new(store);

  let output = commands::run(cli.command, &engine, &analytics).await?;
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}
