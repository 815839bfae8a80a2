//! Error type for `stockledger-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A ledger-level failure detected by the store, such as a version
  /// conflict or a missing record.
  #[error(transparent)]
  Core(#[from] stockledger_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("unknown transaction kind: {0}")]
  Kind(#[from] strum::ParseError),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Ledger failures pass through unchanged; anything the database or the
/// row decoding raised means the store cannot be trusted for this call.
impl From<Error> for stockledger_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(inner) => inner,
      other => Self::store_unavailable(other),
    }
  }
}
