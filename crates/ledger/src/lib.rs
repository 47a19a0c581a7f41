//! `coldstock-ledger` — the stock ledger and FEFO allocation core.
//!
//! One event-sourced `StockLedger` aggregate per product: the movement
//! stream is the authoritative record, per-(location, lot) positions are a
//! fold of it, and withdrawals are planned First-Expired-First-Out against
//! that folded state.

pub mod allocator;
pub mod ledger;
pub mod movement;

pub use allocator::{AllocationPlan, PlanStep, plan_withdrawal};
pub use ledger::{LotRecord, StockLedger};
pub use movement::{
    LedgerCommand, LedgerEvent, MovementKind, RecordAdjustment, RecordEntry, RecordExit,
    StockAdjusted, StockEntered, StockWithdrawn, Withdraw,
};
