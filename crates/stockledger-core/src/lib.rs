//! Core types and the stock movement engine for the stockledger inventory
//! ledger.
//!
//! No SQL or HTTP lives here. Storage backends implement
//! [`store::LedgerStore`]; callers drive stock through [`engine::StockEngine`]
//! and read derived figures through [`analytics::Analytics`].

// Trait methods spell out their `Send` futures; impls use plain `async fn`.
#![allow(async_fn_in_trait)]

pub mod analytics;
pub mod cache;
pub mod engine;
pub mod error;
pub mod history;
pub mod memory;
pub mod record;
pub mod retry;
pub mod store;
pub mod transaction;

pub use error::{Error, Result};
