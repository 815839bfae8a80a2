//! Inventory records: the current quantity and restock policy for one
//! product at one stock location.
//!
//! A record's `quantity` is a cached value: it always equals the sum of the
//! `quantity_delta` of every committed transaction for that record. Records
//! are never deleted; retiring one flips `active` so historical transactions
//! keep resolving.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── InventoryRecord ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
  pub inventory_id:     Uuid,
  /// Opaque reference to a product owned by the catalog.
  pub product_id:       Uuid,
  pub location:         String,
  /// Units on hand. Never negative.
  pub quantity:         i64,
  pub minimum_level:    Option<i64>,
  pub maximum_level:    Option<i64>,
  pub reorder_point:    i64,
  pub reorder_quantity: i64,
  pub unit_cost:        Decimal,
  /// Incremented by every committed mutation; the optimistic concurrency
  /// token.
  pub version:          i64,
  pub created_at:       DateTime<Utc>,
  pub last_modified:    DateTime<Utc>,
  pub active:           bool,
}

impl InventoryRecord {
  /// `quantity * unit_cost`.
  pub fn stock_value(&self) -> Decimal {
    Decimal::from(self.quantity) * self.unit_cost
  }

  pub fn is_at_or_below_reorder_point(&self) -> bool {
    self.quantity <= self.reorder_point
  }

  /// Fails with [`Error::Inactive`] for soft-retired records.
  pub fn ensure_active(&self) -> Result<()> {
    if self.active {
      Ok(())
    } else {
      Err(Error::Inactive(self.inventory_id))
    }
  }
}

// ─── Restock policy ──────────────────────────────────────────────────────────

/// The restock-policy fields shared by provisioning and policy updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPolicy {
  pub minimum_level:    Option<i64>,
  pub maximum_level:    Option<i64>,
  pub reorder_point:    i64,
  pub reorder_quantity: i64,
  pub unit_cost:        Decimal,
}

impl Default for StockPolicy {
  fn default() -> Self {
    Self {
      minimum_level:    None,
      maximum_level:    None,
      reorder_point:    0,
      reorder_quantity: 0,
      unit_cost:        Decimal::ZERO,
    }
  }
}

impl StockPolicy {
  /// Check the non-negativity and ordering constraints.
  pub fn validate(&self) -> Result<()> {
    let levels = [
      ("minimum_level", self.minimum_level),
      ("maximum_level", self.maximum_level),
      ("reorder_point", Some(self.reorder_point)),
      ("reorder_quantity", Some(self.reorder_quantity)),
    ];
    for (name, value) in levels {
      if let Some(v) = value
        && v < 0
      {
        return Err(Error::invalid_argument(format!(
          "{name} must not be negative (got {v})"
        )));
      }
    }
    if let (Some(min), Some(max)) = (self.minimum_level, self.maximum_level)
      && min > max
    {
      return Err(Error::invalid_argument(format!(
        "minimum_level {min} exceeds maximum_level {max}"
      )));
    }
    if self.unit_cost < Decimal::ZERO {
      return Err(Error::invalid_argument(format!(
        "unit_cost must not be negative (got {})",
        self.unit_cost
      )));
    }
    Ok(())
  }

  /// Copy the policy fields onto `record`.
  pub fn apply_to(&self, record: &mut InventoryRecord) {
    record.minimum_level = self.minimum_level;
    record.maximum_level = self.maximum_level;
    record.reorder_point = self.reorder_point;
    record.reorder_quantity = self.reorder_quantity;
    record.unit_cost = self.unit_cost;
  }
}

impl From<&InventoryRecord> for StockPolicy {
  fn from(record: &InventoryRecord) -> Self {
    Self {
      minimum_level:    record.minimum_level,
      maximum_level:    record.maximum_level,
      reorder_point:    record.reorder_point,
      reorder_quantity: record.reorder_quantity,
      unit_cost:        record.unit_cost,
    }
  }
}

// ─── NewInventoryRecord ──────────────────────────────────────────────────────

/// Input to [`crate::store::LedgerStore::create_record`].
///
/// Records always start empty; opening stock is booked with a `Receive` so the
/// ledger accounts for every unit.
#[derive(Debug, Clone)]
pub struct NewInventoryRecord {
  pub product_id: Uuid,
  pub location:   String,
  pub policy:     StockPolicy,
}

impl NewInventoryRecord {
  /// Convenience constructor with the default (empty) policy.
  pub fn new(product_id: Uuid, location: impl Into<String>) -> Self {
    Self {
      product_id,
      location: location.into(),
      policy: StockPolicy::default(),
    }
  }

  pub fn with_policy(mut self, policy: StockPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.location.trim().is_empty() {
      return Err(Error::invalid_argument("location must not be empty"));
    }
    self.policy.validate()
  }

  /// Materialise the record a store persists for this input.
  pub fn into_record(self, now: DateTime<Utc>) -> InventoryRecord {
    let mut record = InventoryRecord {
      inventory_id:     Uuid::new_v4(),
      product_id:       self.product_id,
      location:         self.location,
      quantity:         0,
      minimum_level:    None,
      maximum_level:    None,
      reorder_point:    0,
      reorder_quantity: 0,
      unit_cost:        Decimal::ZERO,
      version:          0,
      created_at:       now,
      last_modified:    now,
      active:           true,
    };
    self.policy.apply_to(&mut record);
    record
  }
}

// ─── RecordUpdate ────────────────────────────────────────────────────────────

/// The quantity change half of a commit. The store applies it only if the
/// stored version still equals `expected_version`, then bumps the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordUpdate {
  pub inventory_id:     Uuid,
  pub expected_version: i64,
  pub quantity:         i64,
}

impl RecordUpdate {
  /// Build an update for `record` that moves it to `quantity`.
  pub fn from_record(record: &InventoryRecord, quantity: i64) -> Self {
    Self {
      inventory_id: record.inventory_id,
      expected_version: record.version,
      quantity,
    }
  }
}
