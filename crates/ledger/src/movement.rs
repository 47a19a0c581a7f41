//! Movement commands and events for the stock ledger.
//!
//! Movements are immutable facts: the ledger is the sequence of all of them,
//! and corrections are new offsetting movements, never edits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coldstock_core::{LocationId, LotId, PlanId, ProductId};
use coldstock_events::Event;

/// Kind of a recorded movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Entry,
    FefoExit,
    Adjustment,
}

/// Command: record an entry movement (goods received into a location/lot).
///
/// Creates the lot on first reference; the supplied expiration then becomes
/// immutable for that lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    /// Human-facing lot code, unique among the product's lots. Fixed by the
    /// lot's first entry, like the expiration date.
    pub lot_code: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: record a single exit movement against one position.
///
/// This is the commit primitive for one allocation-plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExit {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub plan_id: PlanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: plan a FEFO withdrawal against current state and commit all of
/// its exit movements in one decided batch (all-or-nothing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdraw {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Restrict consumption to a single location when set.
    pub location: Option<LocationId>,
    pub plan_id: PlanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: record a signed correction movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAdjustment {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    RecordEntry(RecordEntry),
    RecordExit(RecordExit),
    Withdraw(Withdraw),
    RecordAdjustment(RecordAdjustment),
}

/// Event: stock entered a (location, lot) position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntered {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub lot_code: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: stock left a (location, lot) position as part of a FEFO plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockWithdrawn {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub plan_id: PlanId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a position was corrected by a signed delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    StockEntered(StockEntered),
    StockWithdrawn(StockWithdrawn),
    StockAdjusted(StockAdjusted),
}

impl LedgerEvent {
    pub fn kind(&self) -> MovementKind {
        match self {
            LedgerEvent::StockEntered(_) => MovementKind::Entry,
            LedgerEvent::StockWithdrawn(_) => MovementKind::FefoExit,
            LedgerEvent::StockAdjusted(_) => MovementKind::Adjustment,
        }
    }

    /// Signed quantity this movement applies to its position.
    pub fn signed_quantity(&self) -> i64 {
        match self {
            LedgerEvent::StockEntered(e) => e.quantity,
            LedgerEvent::StockWithdrawn(e) => -e.quantity,
            LedgerEvent::StockAdjusted(e) => e.delta,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            LedgerEvent::StockEntered(e) => e.product_id,
            LedgerEvent::StockWithdrawn(e) => e.product_id,
            LedgerEvent::StockAdjusted(e) => e.product_id,
        }
    }

    pub fn location_id(&self) -> LocationId {
        match self {
            LedgerEvent::StockEntered(e) => e.location_id,
            LedgerEvent::StockWithdrawn(e) => e.location_id,
            LedgerEvent::StockAdjusted(e) => e.location_id,
        }
    }

    pub fn lot_id(&self) -> LotId {
        match self {
            LedgerEvent::StockEntered(e) => e.lot_id,
            LedgerEvent::StockWithdrawn(e) => e.lot_id,
            LedgerEvent::StockAdjusted(e) => e.lot_id,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::StockEntered(_) => "ledger.stock.entered",
            LedgerEvent::StockWithdrawn(_) => "ledger.stock.withdrawn",
            LedgerEvent::StockAdjusted(_) => "ledger.stock.adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::StockEntered(e) => e.occurred_at,
            LedgerEvent::StockWithdrawn(e) => e.occurred_at,
            LedgerEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}
