//! Error taxonomy shared by the engine, the analytics layer, and every store
//! backend.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("inventory record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("no inventory record for product {0}")]
  ProductNotFound(Uuid),

  /// The record has been soft-retired and accepts no further movements.
  #[error("inventory record {0} is inactive")]
  Inactive(Uuid),

  #[error("invalid quantity {quantity}: {reason}")]
  InvalidQuantity { quantity: i64, reason: &'static str },

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("insufficient stock: {available} available, {requested} requested")]
  InsufficientStock { available: i64, requested: i64 },

  /// Optimistic version check failed. Retried inside the engine and only
  /// surfaced by direct store calls.
  #[error("version conflict on {inventory_id}: expected version {expected}")]
  Conflict { inventory_id: Uuid, expected: i64 },

  #[error("gave up after {attempts} conflicting attempts")]
  Busy { attempts: u32 },

  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn invalid_argument(msg: impl Into<String>) -> Self {
    Self::InvalidArgument(msg.into())
  }

  pub fn store_unavailable(
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self::StoreUnavailable(err.into())
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::RecordNotFound(_) | Self::ProductNotFound(_))
  }

  pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict { .. }) }

  /// The HTTP status an outer transport layer should answer with.
  pub fn http_status(&self) -> u16 {
    match self {
      Self::RecordNotFound(_) | Self::ProductNotFound(_) => 404,
      Self::Inactive(_)
      | Self::InvalidQuantity { .. }
      | Self::InvalidArgument(_)
      | Self::InsufficientStock { .. } => 400,
      Self::Conflict { .. } => 409,
      Self::Busy { .. } | Self::StoreUnavailable(_) => 503,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_mapping_follows_error_class() {
    let id = Uuid::new_v4();
    assert_eq!(Error::RecordNotFound(id).http_status(), 404);
    assert_eq!(
      Error::InsufficientStock { available: 3, requested: 5 }.http_status(),
      400
    );
    assert_eq!(Error::Busy { attempts: 3 }.http_status(), 503);
    assert_eq!(Error::store_unavailable("disk gone").http_status(), 503);
  }

  #[test]
  fn insufficient_stock_message_names_both_quantities() {
    let msg = Error::InsufficientStock { available: 3, requested: 5 }.to_string();
    assert_eq!(msg, "insufficient stock: 3 available, 5 requested");
  }
}
