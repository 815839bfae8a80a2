//! Layered settings: an optional TOML file, overridden by `STOCKLEDGER_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;
use stockledger_core::retry::RetryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub retry:      RetryConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("stockledger.db") }

impl Settings {
  /// Read `path` if it exists, then apply the environment. Nested keys use a
  /// double underscore, e.g. `STOCKLEDGER_RETRY__MAX_ATTEMPTS=5`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let builder = Config::builder()
      .add_source(File::from(path.to_path_buf()).required(false))
      .add_source(
        Environment::with_prefix("STOCKLEDGER")
          .prefix_separator("_")
          .separator("__"),
      );
    Self::from_builder(builder)
  }

  fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
    let mut settings: Self = builder
      .build()
      .context("failed to read settings")?
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::FileFormat;

  use super::*;

  fn from_toml(toml: &str) -> Settings {
    Settings::from_builder(
      Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
    )
    .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let settings = from_toml("");
    assert_eq!(settings.store_path, PathBuf::from("stockledger.db"));
    assert_eq!(settings.retry, RetryConfig::default());
  }

  #[test]
  fn retry_table_overrides_only_named_fields() {
    let settings = from_toml(
      r#"
        store_path = "/var/lib/stock/ledger.db"

        [retry]
        max_attempts = 7
      "#,
    );
    assert_eq!(settings.store_path, PathBuf::from("/var/lib/stock/ledger.db"));
    assert_eq!(settings.retry.max_attempts, 7);
    assert_eq!(settings.retry.initial_delay_ms, RetryConfig::default().initial_delay_ms);
  }

  #[test]
  fn absolute_paths_are_left_alone() {
    assert_eq!(expand_tilde(Path::new("/tmp/x.db")), PathBuf::from("/tmp/x.db"));
  }
}
