//! Encoding and decoding helpers between ledger types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with a fixed microsecond precision and a
//! `Z` suffix, so text comparison in SQL orders them chronologically. Money is
//! stored as decimal text. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, Datelike as _, SecondsFormat, Utc};
use rust_decimal::Decimal;
use stockledger_core::{
  record::InventoryRecord,
  transaction::{StockTransaction, TransactionKind},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode a query bound. Years outside `0000..=9999` do not sort correctly as
/// text, so the bound is clamped to the representable span.
pub fn encode_bound(dt: DateTime<Utc>) -> String {
  match dt.year() {
    ..0 => "0000-01-01T00:00:00.000000Z".to_owned(),
    10000.. => "9999-12-31T23:59:59.999999Z".to_owned(),
    _ => encode_dt(dt),
  }
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const RECORD_COLUMNS: &str = "inventory_id, product_id, location, quantity, \
   minimum_level, maximum_level, reorder_point, reorder_quantity, unit_cost, \
   version, created_at, last_modified, active";

pub const TRANSACTION_COLUMNS: &str = "sequence, transaction_id, inventory_id, \
   kind, quantity_delta, resulting_quantity, unit_cost_at_transaction, \
   reference, notes, linked_transaction_id, created_at";

/// Raw values read directly from an `inventory_records` row selected with
/// [`RECORD_COLUMNS`].
pub struct RawRecord {
  pub inventory_id:     String,
  pub product_id:       String,
  pub location:         String,
  pub quantity:         i64,
  pub minimum_level:    Option<i64>,
  pub maximum_level:    Option<i64>,
  pub reorder_point:    i64,
  pub reorder_quantity: i64,
  pub unit_cost:        String,
  pub version:          i64,
  pub created_at:       String,
  pub last_modified:    String,
  pub active:           bool,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      inventory_id:     row.get(0)?,
      product_id:       row.get(1)?,
      location:         row.get(2)?,
      quantity:         row.get(3)?,
      minimum_level:    row.get(4)?,
      maximum_level:    row.get(5)?,
      reorder_point:    row.get(6)?,
      reorder_quantity: row.get(7)?,
      unit_cost:        row.get(8)?,
      version:          row.get(9)?,
      created_at:       row.get(10)?,
      last_modified:    row.get(11)?,
      active:           row.get(12)?,
    })
  }

  pub fn into_record(self) -> Result<InventoryRecord> {
    Ok(InventoryRecord {
      inventory_id:     decode_uuid(&self.inventory_id)?,
      product_id:       decode_uuid(&self.product_id)?,
      location:         self.location,
      quantity:         self.quantity,
      minimum_level:    self.minimum_level,
      maximum_level:    self.maximum_level,
      reorder_point:    self.reorder_point,
      reorder_quantity: self.reorder_quantity,
      unit_cost:        decode_decimal(&self.unit_cost)?,
      version:          self.version,
      created_at:       decode_dt(&self.created_at)?,
      last_modified:    decode_dt(&self.last_modified)?,
      active:           self.active,
    })
  }
}

/// Raw values read directly from a `stock_transactions` row selected with
/// [`TRANSACTION_COLUMNS`].
pub struct RawTransaction {
  pub sequence:                 i64,
  pub transaction_id:           String,
  pub inventory_id:             String,
  pub kind:                     String,
  pub quantity_delta:           i64,
  pub resulting_quantity:       i64,
  pub unit_cost_at_transaction: String,
  pub reference:                Option<String>,
  pub notes:                    Option<String>,
  pub linked_transaction_id:    Option<String>,
  pub created_at:               String,
}

impl RawTransaction {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence:                 row.get(0)?,
      transaction_id:           row.get(1)?,
      inventory_id:             row.get(2)?,
      kind:                     row.get(3)?,
      quantity_delta:           row.get(4)?,
      resulting_quantity:       row.get(5)?,
      unit_cost_at_transaction: row.get(6)?,
      reference:                row.get(7)?,
      notes:                    row.get(8)?,
      linked_transaction_id:    row.get(9)?,
      created_at:               row.get(10)?,
    })
  }

  pub fn into_transaction(self) -> Result<StockTransaction> {
    let linked_transaction_id = self
      .linked_transaction_id
      .as_deref()
      .map(decode_uuid)
      .transpose()?;

    Ok(StockTransaction {
      transaction_id: decode_uuid(&self.transaction_id)?,
      sequence: self.sequence,
      inventory_id: decode_uuid(&self.inventory_id)?,
      kind: TransactionKind::from_str(&self.kind)?,
      quantity_delta: self.quantity_delta,
      resulting_quantity: self.resulting_quantity,
      unit_cost_at_transaction: decode_decimal(&self.unit_cost_at_transaction)?,
      reference: self.reference,
      notes: self.notes,
      linked_transaction_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn encoded_timestamps_sort_chronologically() {
    let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let later = early + chrono::Duration::microseconds(1);
    assert!(encode_dt(early) < encode_dt(later));
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn extreme_bounds_are_clamped() {
    let now = encode_dt(Utc::now());
    assert!(encode_bound(DateTime::<Utc>::MIN_UTC) < now);
    assert!(encode_bound(DateTime::<Utc>::MAX_UTC) > now);
  }

  #[test]
  fn decimal_text_is_exact() {
    let cost = Decimal::new(1999, 2);
    assert_eq!(encode_decimal(cost), "19.99");
    assert_eq!(decode_decimal("19.99").unwrap(), cost);
  }
}
