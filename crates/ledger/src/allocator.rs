//! FEFO allocation: plan which lots a withdrawal consumes.
//!
//! Candidates are every (location, lot) position with quantity > 0, ordered
//! by expiration date ascending (non-perishable lots last), then receipt
//! timestamp, then lot id, then location id. The last two keys exist purely
//! for determinism: identical inputs always yield the identical plan.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coldstock_core::{LocationId, LotId, PlanId, ProductId, StockError, StockResult};

use crate::ledger::StockLedger;

/// One consumption step of an allocation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub expiration: Option<NaiveDate>,
}

/// Result of FEFO planning: ordered consumption steps summing exactly to the
/// requested quantity. Ephemeral; committing it is the ledger's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub plan_id: PlanId,
    pub product_id: ProductId,
    pub requested: i64,
    pub steps: Vec<PlanStep>,
}

impl AllocationPlan {
    pub fn total(&self) -> i64 {
        self.steps.iter().map(|s| s.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug)]
struct Candidate {
    location_id: LocationId,
    lot_id: LotId,
    quantity: i64,
    expiration: Option<NaiveDate>,
    received_at: DateTime<Utc>,
}

impl Candidate {
    /// FEFO sort key. `expiration.is_none()` first makes absent expirations
    /// sort as a "latest possible" sentinel.
    fn sort_key(&self) -> (bool, Option<NaiveDate>, DateTime<Utc>, LotId, LocationId) {
        (
            self.expiration.is_none(),
            self.expiration,
            self.received_at,
            self.lot_id,
            self.location_id,
        )
    }
}

/// Compute a FEFO withdrawal plan against the ledger's current folded state.
///
/// All-or-nothing: if total eligible stock cannot cover `requested`, the
/// whole request fails with `InsufficientStock` and no plan is produced.
/// A requested quantity of zero yields an empty plan.
pub fn plan_withdrawal(
    ledger: &StockLedger,
    requested: i64,
    location: Option<LocationId>,
    plan_id: PlanId,
) -> StockResult<AllocationPlan> {
    if requested < 0 {
        return Err(StockError::validation(
            "requested quantity cannot be negative",
        ));
    }

    let empty = AllocationPlan {
        plan_id,
        product_id: ledger.product_id(),
        requested,
        steps: Vec::new(),
    };
    if requested == 0 {
        return Ok(empty);
    }

    let mut candidates: Vec<Candidate> = ledger
        .positions()
        .filter(|(loc, _, qty)| *qty > 0 && location.is_none_or(|l| l == *loc))
        .map(|(loc, lot, qty)| {
            // Positions only exist for lots the fold has seen, so the lot
            // record is always present.
            let record = ledger.lot(lot).cloned().ok_or_else(|| {
                StockError::invariant(format!("position references unknown lot {lot}"))
            })?;
            Ok(Candidate {
                location_id: loc,
                lot_id: lot,
                quantity: qty,
                expiration: record.expiration,
                received_at: record.received_at,
            })
        })
        .collect::<StockResult<_>>()?;

    let available: i64 = candidates.iter().map(|c| c.quantity).sum();
    if available < requested {
        return Err(StockError::insufficient(requested, available));
    }

    candidates.sort_by_key(Candidate::sort_key);

    let mut remaining = requested;
    let mut steps = Vec::new();
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(candidate.quantity);
        steps.push(PlanStep {
            location_id: candidate.location_id,
            lot_id: candidate.lot_id,
            quantity: take,
            expiration: candidate.expiration,
        });
        remaining -= take;
    }

    Ok(AllocationPlan { steps, ..empty })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::{LedgerCommand, RecordEntry};
    use coldstock_core::Aggregate;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn enter_at(
        ledger: &mut StockLedger,
        location_id: LocationId,
        lot_id: LotId,
        quantity: i64,
        expiration: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) {
        let events = ledger
            .handle(&LedgerCommand::RecordEntry(RecordEntry {
                product_id: ledger.product_id(),
                location_id,
                lot_id,
                quantity,
                lot_code: None,
                expiration,
                occurred_at: received_at,
            }))
            .unwrap();
        for e in &events {
            ledger.apply(e);
        }
    }

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn consumes_soonest_to_expire_first() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let (january, february) = (LotId::new(), LotId::new());

        // Entered in reverse expiration order on purpose.
        enter_at(&mut ledger, loc, february, 5, Some(date(2024, 2, 1)), ts(1));
        enter_at(&mut ledger, loc, january, 5, Some(date(2024, 1, 1)), ts(2));

        let plan = plan_withdrawal(&ledger, 7, None, PlanId::new()).unwrap();
        assert_eq!(plan.total(), 7);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!((plan.steps[0].lot_id, plan.steps[0].quantity), (january, 5));
        assert_eq!((plan.steps[1].lot_id, plan.steps[1].quantity), (february, 2));
    }

    #[test]
    fn equal_expirations_drain_in_receipt_order() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let (late_receipt, early_receipt) = (LotId::new(), LotId::new());
        let expiry = Some(date(2024, 3, 1));

        // Enumeration order must not matter: the later-received lot is
        // entered first.
        enter_at(&mut ledger, loc, late_receipt, 4, expiry, ts(9));
        enter_at(&mut ledger, loc, early_receipt, 4, expiry, ts(3));

        let plan = plan_withdrawal(&ledger, 6, None, PlanId::new()).unwrap();
        assert_eq!(plan.steps[0].lot_id, early_receipt);
        assert_eq!(plan.steps[0].quantity, 4);
        assert_eq!(plan.steps[1].lot_id, late_receipt);
        assert_eq!(plan.steps[1].quantity, 2);
    }

    #[test]
    fn identical_expiration_and_receipt_fall_back_to_lot_id_order() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let (a, b) = (LotId::new(), LotId::new());
        let expiry = Some(date(2024, 3, 1));

        enter_at(&mut ledger, loc, b, 2, expiry, ts(5));
        enter_at(&mut ledger, loc, a, 2, expiry, ts(5));

        let plan = plan_withdrawal(&ledger, 3, None, PlanId::new()).unwrap();
        let first_expected = if a < b { a } else { b };
        assert_eq!(plan.steps[0].lot_id, first_expected);
    }

    #[test]
    fn lots_without_expiration_are_consumed_last() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let (perishable, durable) = (LotId::new(), LotId::new());

        enter_at(&mut ledger, loc, durable, 10, None, ts(1));
        enter_at(&mut ledger, loc, perishable, 3, Some(date(2030, 1, 1)), ts(2));

        let plan = plan_withdrawal(&ledger, 5, None, PlanId::new()).unwrap();
        assert_eq!((plan.steps[0].lot_id, plan.steps[0].quantity), (perishable, 3));
        assert_eq!((plan.steps[1].lot_id, plan.steps[1].quantity), (durable, 2));
    }

    #[test]
    fn location_filter_restricts_candidates() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let (near, far) = (LocationId::new(), LocationId::new());
        let lot = LotId::new();
        let expiry = Some(date(2024, 5, 1));

        enter_at(&mut ledger, near, lot, 3, expiry, ts(1));
        enter_at(&mut ledger, far, lot, 9, expiry, ts(1));

        let plan = plan_withdrawal(&ledger, 3, Some(near), PlanId::new()).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].location_id, near);

        let err = plan_withdrawal(&ledger, 4, Some(near), PlanId::new()).unwrap_err();
        assert_eq!(err, StockError::insufficient(4, 3));
    }

    #[test]
    fn shortfall_reports_available_total() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        enter_at(&mut ledger, loc, LotId::new(), 8, None, ts(1));

        let err = plan_withdrawal(&ledger, 10, None, PlanId::new()).unwrap_err();
        assert_eq!(err, StockError::insufficient(10, 8));
        assert_eq!(err.shortfall(), Some(2));
    }

    #[test]
    fn zero_request_yields_empty_plan() {
        let ledger = StockLedger::empty(ProductId::new());
        let plan = plan_withdrawal(&ledger, 0, None, PlanId::new()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total(), 0);
    }

    #[test]
    fn plan_never_steps_past_the_request() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        for i in 0..5 {
            enter_at(
                &mut ledger,
                loc,
                LotId::new(),
                10,
                Some(date(2024, 1 + i, 1)),
                ts(i),
            );
        }

        let plan = plan_withdrawal(&ledger, 25, None, PlanId::new()).unwrap();
        assert_eq!(plan.total(), 25);
        // 10 + 10 + 5: the walk stops once the request is covered.
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[2].quantity, 5);
    }
}
