//! `ProductIndex`: an in-process side-cache from product id to inventory
//! record id.
//!
//! The index only remembers *which* record a product resolved to. Every hit
//! is re-read from the store and discarded if it has been retired or moved
//! to another product. A hit cannot tell that an older record of the same
//! product became active again, so whoever flips a record's active flag must
//! call [`ProductIndex::invalidate`] for its product.

use std::{
  collections::HashMap,
  sync::{Arc, RwLock},
};

use uuid::Uuid;

use crate::{
  Result,
  record::InventoryRecord,
  store::{LedgerStore, StoreResultExt as _},
};

#[derive(Debug, Clone, Default)]
pub struct ProductIndex {
  entries: Arc<RwLock<HashMap<Uuid, Uuid>>>,
}

impl ProductIndex {
  pub fn new() -> Self { Self::default() }

  /// Resolve `product_id` through the index, falling back to
  /// [`LedgerStore::get_by_product`] on a miss or a stale hit.
  pub async fn resolve<S: LedgerStore>(
    &self,
    store: &S,
    product_id: Uuid,
  ) -> Result<Option<InventoryRecord>> {
    if let Some(inventory_id) = self.lookup(product_id) {
      let cached = store.get(inventory_id).await.into_ledger()?;
      match cached {
        Some(record) if record.product_id == product_id && record.active => {
          return Ok(Some(record));
        }
        _ => self.invalidate(product_id),
      }
    }

    let record = store.get_by_product(product_id).await.into_ledger()?;
    if let Some(record) = &record
      && record.active
      && let Ok(mut entries) = self.entries.write()
    {
      entries.insert(product_id, record.inventory_id);
    }
    Ok(record)
  }

  pub fn invalidate(&self, product_id: Uuid) {
    if let Ok(mut entries) = self.entries.write() {
      entries.remove(&product_id);
    }
  }

  pub fn clear(&self) {
    if let Ok(mut entries) = self.entries.write() {
      entries.clear();
    }
  }

  pub fn len(&self) -> usize {
    self.entries.read().map_or(0, |e| e.len())
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn lookup(&self, product_id: Uuid) -> Option<Uuid> {
    self.entries.read().ok()?.get(&product_id).copied()
  }
}
