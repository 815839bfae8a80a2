//! Subcommands and their dispatch onto the engine and analytics.

use anyhow::Context as _;
use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use stockledger_core::{
  Error,
  analytics::{Analytics, LowStockPolicy},
  engine::StockEngine,
  record::{NewInventoryRecord, StockPolicy},
  store::{LedgerStore, StoreResultExt as _},
  transaction::{Memo, TimeRange},
};
use uuid::Uuid;

// ─── Arguments ───────────────────────────────────────────────────────────────

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create a record for a product at a location.
  Provision {
    #[arg(long)]
    product:  Uuid,
    #[arg(long)]
    location: String,
    #[command(flatten)]
    policy:   PolicyArgs,
    /// Book this many units as an opening receipt.
    #[arg(long)]
    opening:  Option<i64>,
  },
  /// Replace a record's restock policy.
  Policy {
    id:     Uuid,
    #[command(flatten)]
    policy: PolicyArgs,
  },
  Receive {
    id:       Uuid,
    quantity: i64,
    #[command(flatten)]
    memo:     MemoArgs,
  },
  Issue {
    id:       Uuid,
    quantity: i64,
    #[command(flatten)]
    memo:     MemoArgs,
  },
  Damage {
    id:       Uuid,
    quantity: i64,
    #[command(flatten)]
    memo:     MemoArgs,
  },
  Loss {
    id:       Uuid,
    quantity: i64,
    #[command(flatten)]
    memo:     MemoArgs,
  },
  /// Set the quantity to a counted value.
  Adjust {
    id:     Uuid,
    target: i64,
    #[arg(long)]
    reason: String,
  },
  Transfer {
    from:     Uuid,
    to:       Uuid,
    quantity: i64,
    #[command(flatten)]
    memo:     MemoArgs,
  },
  /// Print one record, by record id or with `--product` by product id.
  Show {
    id:      Uuid,
    #[arg(long)]
    product: bool,
  },
  List {
    #[arg(long)]
    include_inactive: bool,
  },
  History {
    id:     Uuid,
    #[command(flatten)]
    window: WindowArgs,
  },
  LowStock {
    #[arg(long, value_enum, default_value_t = Threshold::ReorderPoint)]
    threshold:   Threshold,
    /// Quantity limit for `--threshold at-or-below`.
    #[arg(long, default_value_t = 0)]
    at_or_below: i64,
  },
  Reorder,
  Summary {
    id:     Uuid,
    #[command(flatten)]
    window: WindowArgs,
  },
  /// Total stock value of a product across its locations.
  Value {
    product: Uuid,
  },
  Retire {
    id: Uuid,
  },
  Reactivate {
    id: Uuid,
  },
}

#[derive(Args, Debug)]
pub struct MemoArgs {
  #[arg(long)]
  reference: Option<String>,
  #[arg(long)]
  notes:     Option<String>,
}

impl From<MemoArgs> for Memo {
  fn from(args: MemoArgs) -> Self {
    Self { reference: args.reference, notes: args.notes }
  }
}

#[derive(Args, Debug)]
pub struct PolicyArgs {
  #[arg(long)]
  minimum_level:    Option<i64>,
  #[arg(long)]
  maximum_level:    Option<i64>,
  #[arg(long, default_value_t = 0)]
  reorder_point:    i64,
  #[arg(long, default_value_t = 0)]
  reorder_quantity: i64,
  #[arg(long, default_value_t = Decimal::ZERO)]
  unit_cost:        Decimal,
}

impl From<PolicyArgs> for StockPolicy {
  fn from(args: PolicyArgs) -> Self {
    Self {
      minimum_level:    args.minimum_level,
      maximum_level:    args.maximum_level,
      reorder_point:    args.reorder_point,
      reorder_quantity: args.reorder_quantity,
      unit_cost:        args.unit_cost,
    }
  }
}

#[derive(Args, Debug)]
pub struct WindowArgs {
  /// Trailing window length in days.
  #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..))]
  days: i64,
}

impl WindowArgs {
  fn range(&self) -> stockledger_core::Result<TimeRange> {
    TimeRange::trailing_days(Utc::now(), self.days)
  }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Threshold {
  ReorderPoint,
  MinimumLevel,
  AtOrBelow,
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

pub async fn run<S: LedgerStore>(
  command: Command,
  engine: &StockEngine<S>,
  analytics: &Analytics<S>,
) -> anyhow::Result<Value> {
  let value = match command {
    Command::Provision { product, location, policy, opening } => {
      if let Some(quantity) = opening
        && quantity <= 0
      {
        return Err(
          Error::InvalidQuantity { quantity, reason: "opening balance must be positive" }.into(),
        );
      }
      let input = NewInventoryRecord::new(product, location).with_policy(policy.into());
      let record = engine.provision(input).await?;
      match opening {
        Some(quantity) => {
          let opening = engine
            .receive(record.inventory_id, quantity, Memo::reference("opening balance"))
            .await
            .context("record created but the opening receipt failed")?;
          json!({ "record": engine.get(record.inventory_id).await?, "opening": opening })
        }
        None => json!({ "record": record }),
      }
    }
    Command::Policy { id, policy } => {
      serde_json::to_value(engine.update_policy(id, policy.into()).await?)?
    }
    Command::Receive { id, quantity, memo } => {
      serde_json::to_value(engine.receive(id, quantity, memo.into()).await?)?
    }
    Command::Issue { id, quantity, memo } => {
      serde_json::to_value(engine.issue(id, quantity, memo.into()).await?)?
    }
    Command::Damage { id, quantity, memo } => {
      serde_json::to_value(engine.record_damage(id, quantity, memo.into()).await?)?
    }
    Command::Loss { id, quantity, memo } => {
      serde_json::to_value(engine.record_loss(id, quantity, memo.into()).await?)?
    }
    Command::Adjust { id, target, reason } => {
      serde_json::to_value(engine.adjust(id, target, reason).await?)?
    }
    Command::Transfer { from, to, quantity, memo } => {
      serde_json::to_value(engine.transfer(from, to, quantity, memo.into()).await?)?
    }
    Command::Show { id, product } => {
      let record = if product {
        engine.get_by_product(id).await?
      } else {
        engine.get(id).await?
      };
      serde_json::to_value(record)?
    }
    Command::List { include_inactive } => {
      let records = engine
        .store()
        .list_records(include_inactive)
        .await
        .into_ledger()?;
      serde_json::to_value(records)?
    }
    Command::History { id, window } => {
      engine.get(id).await?;
      let transactions = engine.history(id, window.range()?).collect().await?;
      serde_json::to_value(transactions)?
    }
    Command::LowStock { threshold, at_or_below } => {
      let policy = match threshold {
        Threshold::ReorderPoint => LowStockPolicy::ReorderPoint,
        Threshold::MinimumLevel => LowStockPolicy::MinimumLevel,
        Threshold::AtOrBelow => LowStockPolicy::AtOrBelow(at_or_below),
      };
      serde_json::to_value(analytics.low_stock(policy).await?)?
    }
    Command::Reorder => serde_json::to_value(analytics.reorder_suggestions().await?)?,
    Command::Summary { id, window } => {
      serde_json::to_value(analytics.summary(id, window.range()?).await?)?
    }
    Command::Value { product } => {
      let total = analytics.total_stock_value(product).await?;
      json!({ "product_id": product, "stock_value": total })
    }
    Command::Retire { id } => serde_json::to_value(engine.retire(id).await?)?,
    Command::Reactivate { id } => serde_json::to_value(engine.reactivate(id).await?)?,
  };
  Ok(value)
}
