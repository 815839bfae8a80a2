//! Stock transactions: the append-only ledger of quantity changes.
//!
//! Transactions are the system of record. Once committed, no field is ever
//! updated and no row is ever deleted.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// What kind of movement a transaction records. The `snake_case` string form
/// is the value stored in the `kind` column.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionKind {
  Receive,
  Issue,
  Adjustment,
  TransferOut,
  TransferIn,
  Damage,
  Loss,
}

impl TransactionKind {
  /// Kinds that move stock out of a location as part of normal flow; these
  /// feed the turnover figure.
  pub fn counts_toward_turnover(self) -> bool {
    matches!(self, Self::Issue | Self::TransferOut)
  }

  pub fn is_transfer_leg(self) -> bool {
    matches!(self, Self::TransferOut | Self::TransferIn)
  }
}

// ─── Memo ────────────────────────────────────────────────────────────────────

/// Free-text context attached to a movement: an order id, a transfer batch,
/// an adjustment reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
  pub reference: Option<String>,
  pub notes:     Option<String>,
}

impl Memo {
  pub fn new() -> Self { Self::default() }

  pub fn reference(reference: impl Into<String>) -> Self {
    Self { reference: Some(reference.into()), notes: None }
  }

  pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = Some(notes.into());
    self
  }
}

// ─── StockTransaction ────────────────────────────────────────────────────────

/// One committed quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
  pub transaction_id:           Uuid,
  /// Store-assigned, strictly increasing across the whole ledger. Doubles as
  /// the history cursor key.
  pub sequence:                 i64,
  pub inventory_id:             Uuid,
  pub kind:                     TransactionKind,
  /// Signed change applied to the record's quantity.
  pub quantity_delta:           i64,
  /// The record's quantity immediately after this transaction.
  pub resulting_quantity:       i64,
  pub unit_cost_at_transaction: Decimal,
  pub reference:                Option<String>,
  pub notes:                    Option<String>,
  /// The other leg of a transfer; `None` for every other kind.
  pub linked_transaction_id:    Option<Uuid>,
  pub created_at:               DateTime<Utc>,
}

impl StockTransaction {
  pub fn is_within(&self, range: &TimeRange) -> bool {
    range.contains(self.created_at)
  }
}

// ─── NewStockTransaction ─────────────────────────────────────────────────────

/// Input to [`crate::store::LedgerStore::commit`].
///
/// The store fills in the identifiers, `sequence`, `created_at`, the resulting
/// quantity and the unit cost from the record it updates, so none of those can
/// disagree with the committed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockTransaction {
  pub kind:           TransactionKind,
  pub quantity_delta: i64,
  pub memo:           Memo,
}

impl NewStockTransaction {
  pub fn new(kind: TransactionKind, quantity_delta: i64, memo: Memo) -> Self {
    Self { kind, quantity_delta, memo }
  }
}

// ─── TimeRange ───────────────────────────────────────────────────────────────

/// A half-open interval `[start, end)` over `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl TimeRange {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self { start, end }
  }

  /// Every representable instant.
  pub fn all() -> Self {
    Self { start: DateTime::<Utc>::MIN_UTC, end: DateTime::<Utc>::MAX_UTC }
  }

  /// The `days` leading up to (and excluding) `end`. `days` must be
  /// positive and the start must be representable.
  pub fn trailing_days(end: DateTime<Utc>, days: i64) -> Result<Self> {
    if days <= 0 {
      return Err(Error::invalid_argument(format!(
        "window length must be a positive number of days (got {days})"
      )));
    }
    let start = TimeDelta::try_days(days)
      .and_then(|span| end.checked_sub_signed(span))
      .ok_or_else(|| {
        Error::invalid_argument(format!("a {days}-day window reaches past the earliest date"))
      })?;
    Ok(Self { start, end })
  }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.start <= at && at < self.end
  }

  /// Window length in fractional days; zero for empty or inverted ranges.
  pub fn length_days(&self) -> f64 {
    let seconds = (self.end - self.start).num_milliseconds() as f64 / 1000.0;
    (seconds / 86_400.0).max(0.0)
  }
}
