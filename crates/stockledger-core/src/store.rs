//! The `LedgerStore` trait: the storage contract the engine runs on.
//!
//! The trait is implemented by storage backends (e.g.
//! `stockledger-store-sqlite`, or [`crate::memory::MemoryStore`]). The engine
//! and analytics layers depend on this abstraction, not on any concrete
//! backend.
//!
//! Every mutating method is conditional on the caller's `expected_version`
//! and either applies completely or not at all.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error,
  record::{InventoryRecord, NewInventoryRecord, RecordUpdate, StockPolicy},
  transaction::{NewStockTransaction, StockTransaction, TimeRange},
};

/// Default number of transactions fetched per history page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an inventory ledger backend.
///
/// Backend errors must convert into the shared [`crate::Error`] taxonomy: a
/// failed version check becomes [`crate::Error::Conflict`], I/O failures
/// become [`crate::Error::StoreUnavailable`].
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  // ── Provisioning ──────────────────────────────────────────────────────

  /// Create and persist a new, empty record. Fails if the product already
  /// has a record at that location.
  fn create_record(
    &self,
    input: NewInventoryRecord,
  ) -> impl Future<Output = Result<InventoryRecord, Self::Error>> + Send + '_;

  /// Replace the restock policy of a record.
  fn update_policy(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    policy: StockPolicy,
  ) -> impl Future<Output = Result<InventoryRecord, Self::Error>> + Send + '_;

  /// Soft-retire (`false`) or reactivate (`true`) a record.
  fn set_active(
    &self,
    inventory_id: Uuid,
    expected_version: i64,
    active: bool,
  ) -> impl Future<Output = Result<InventoryRecord, Self::Error>> + Send + '_;

  // ── Record reads ──────────────────────────────────────────────────────

  /// Retrieve a record by id. Returns `None` if not found.
  fn get(
    &self,
    inventory_id: Uuid,
  ) -> impl Future<Output = Result<Option<InventoryRecord>, Self::Error>> + Send + '_;

  /// The product's oldest active record, or its oldest record when every
  /// location is retired. Returns `None` if the product was never stocked.
  fn get_by_product(
    &self,
    product_id: Uuid,
  ) -> impl Future<Output = Result<Option<InventoryRecord>, Self::Error>> + Send + '_;

  /// Every record of a product, oldest first.
  fn list_by_product(
    &self,
    product_id: Uuid,
  ) -> impl Future<Output = Result<Vec<InventoryRecord>, Self::Error>> + Send + '_;

  fn list_records(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<InventoryRecord>, Self::Error>> + Send + '_;

  /// Active records whose quantity is at or below their reorder point.
  fn list_low_stock(
    &self,
  ) -> impl Future<Output = Result<Vec<InventoryRecord>, Self::Error>> + Send + '_;

  // ── Ledger writes ─────────────────────────────────────────────────────

  /// Atomically apply `update` and append `transaction` against the same
  /// record. Fails with a conflict if the stored version moved.
  fn commit(
    &self,
    update: RecordUpdate,
    transaction: NewStockTransaction,
  ) -> impl Future<Output = Result<StockTransaction, Self::Error>> + Send + '_;

  /// Atomically apply two updates and append two mutually linked
  /// transactions. Both version checks must pass or nothing is written.
  /// Returns the transactions in argument order.
  fn commit_pair(
    &self,
    update_a: RecordUpdate,
    transaction_a: NewStockTransaction,
    update_b: RecordUpdate,
    transaction_b: NewStockTransaction,
  ) -> impl Future<Output = Result<(StockTransaction, StockTransaction), Self::Error>>
  + Send
  + '_;

  // ── Ledger reads ──────────────────────────────────────────────────────

  /// Up to `limit` committed transactions for a record inside `range`, with
  /// `sequence` strictly greater than `after`, in ascending sequence order.
  fn history_page(
    &self,
    inventory_id: Uuid,
    range: TimeRange,
    after: Option<i64>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<StockTransaction>, Self::Error>> + Send + '_;

  /// The record's quantity as of `at`: the `resulting_quantity` of the last
  /// transaction created at or before `at`, or `0` when there is none.
  fn quantity_at(
    &self,
    inventory_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;
}

// ─── Error conversion ────────────────────────────────────────────────────────

/// Lifts a backend result into the shared taxonomy at call sites that are
/// generic over the store.
pub trait StoreResultExt<T> {
  fn into_ledger(self) -> crate::Result<T>;
}

impl<T, E: Into<Error>> StoreResultExt<T> for Result<T, E> {
  fn into_ledger(self) -> crate::Result<T> { self.map_err(Into::into) }
}

// ─── Shared validation ───────────────────────────────────────────────────────

/// The store-side conservation check shared by every backend: the new
/// quantity must be non-negative and equal old quantity plus delta.
pub fn check_commit(
  current: &InventoryRecord,
  update: &RecordUpdate,
  input: &NewStockTransaction,
) -> crate::Result<()> {
  if update.quantity < 0 {
    return Err(Error::InvalidQuantity {
      quantity: update.quantity,
      reason:   "resulting quantity would be negative",
    });
  }
  if current.quantity + input.quantity_delta != update.quantity {
    return Err(Error::invalid_argument(format!(
      "delta {} does not move quantity {} to {}",
      input.quantity_delta, current.quantity, update.quantity
    )));
  }
  Ok(())
}
