use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use coldstock_core::{
    Aggregate, AggregateRoot, LocationId, LotId, ProductId, StockError,
};

use crate::allocator::plan_withdrawal;
use crate::movement::{
    LedgerCommand, LedgerEvent, RecordAdjustment, RecordEntry, RecordExit, StockAdjusted,
    StockEntered, StockWithdrawn, Withdraw,
};

/// Immutable lot facts, fixed by the lot's first entry movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotRecord {
    /// Human-facing lot code, unique among the product's lots.
    pub code: Option<String>,
    /// None means non-perishable; sorts after every dated lot.
    pub expiration: Option<NaiveDate>,
    /// Business time of the first entry that opened the lot.
    pub received_at: DateTime<Utc>,
}

/// Aggregate root: the movement ledger for one product.
///
/// State is a pure fold of the product's movement stream: lot records and
/// per-(location, lot) quantities. Every mutating decision re-checks the
/// non-negativity invariant before emitting, so no committed stream can ever
/// fold to a negative position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLedger {
    product_id: ProductId,
    lots: HashMap<LotId, LotRecord>,
    positions: HashMap<(LocationId, LotId), i64>,
    version: u64,
}

impl StockLedger {
    /// Create an empty instance for rehydration.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            lots: HashMap::new(),
            positions: HashMap::new(),
            version: 0,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Current quantity for one (location, lot) position. Zero if no
    /// movements reference it.
    pub fn position(&self, location_id: LocationId, lot_id: LotId) -> i64 {
        self.positions
            .get(&(location_id, lot_id))
            .copied()
            .unwrap_or(0)
    }

    /// Total quantity across all positions, optionally restricted to one
    /// location.
    pub fn total_available(&self, location: Option<LocationId>) -> i64 {
        self.positions
            .iter()
            .filter(|((loc, _), _)| location.is_none_or(|l| l == *loc))
            .map(|(_, qty)| *qty)
            .sum()
    }

    pub fn lot(&self, lot_id: LotId) -> Option<&LotRecord> {
        self.lots.get(&lot_id)
    }

    /// Look a lot up by its human-facing code.
    pub fn lot_by_code(&self, code: &str) -> Option<(LotId, &LotRecord)> {
        self.lots
            .iter()
            .find(|(_, record)| record.code.as_deref() == Some(code))
            .map(|(id, record)| (*id, record))
    }

    /// All positions with their lot records (allocation candidates source).
    pub fn positions(&self) -> impl Iterator<Item = (LocationId, LotId, i64)> + '_ {
        self.positions
            .iter()
            .map(|((loc, lot), qty)| (*loc, *lot, *qty))
    }

    fn ensure_product(&self, product_id: ProductId) -> Result<(), StockError> {
        if self.product_id != product_id {
            return Err(StockError::invariant("command targets a different product"));
        }
        Ok(())
    }

    fn handle_entry(&self, cmd: &RecordEntry) -> Result<Vec<LedgerEvent>, StockError> {
        self.ensure_product(cmd.product_id)?;
        if cmd.quantity <= 0 {
            return Err(StockError::validation("entry quantity must be positive"));
        }
        match self.lots.get(&cmd.lot_id) {
            Some(record) => {
                if record.expiration != cmd.expiration {
                    return Err(StockError::LotExpirationMismatch {
                        lot: cmd.lot_id.to_string(),
                    });
                }
                // Code is fixed at first entry; later entries may omit it
                // but never contradict it.
                if cmd.lot_code.is_some() && cmd.lot_code != record.code {
                    return Err(StockError::conflict(format!(
                        "lot {} already carries a different code",
                        cmd.lot_id
                    )));
                }
            }
            None => {
                if let Some(code) = &cmd.lot_code {
                    if self
                        .lots
                        .values()
                        .any(|record| record.code.as_deref() == Some(code.as_str()))
                    {
                        return Err(StockError::conflict(format!(
                            "lot code '{code}' already in use for this product"
                        )));
                    }
                }
            }
        }
        Ok(vec![LedgerEvent::StockEntered(StockEntered {
            product_id: cmd.product_id,
            location_id: cmd.location_id,
            lot_id: cmd.lot_id,
            quantity: cmd.quantity,
            lot_code: cmd.lot_code.clone(),
            expiration: cmd.expiration,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_exit(&self, cmd: &RecordExit) -> Result<Vec<LedgerEvent>, StockError> {
        self.ensure_product(cmd.product_id)?;
        if cmd.quantity <= 0 {
            return Err(StockError::validation("exit quantity must be positive"));
        }
        if !self.lots.contains_key(&cmd.lot_id) {
            return Err(StockError::not_found(format!("lot {}", cmd.lot_id)));
        }
        let available = self.position(cmd.location_id, cmd.lot_id);
        if available < cmd.quantity {
            return Err(StockError::insufficient(cmd.quantity, available));
        }
        Ok(vec![LedgerEvent::StockWithdrawn(StockWithdrawn {
            product_id: cmd.product_id,
            location_id: cmd.location_id,
            lot_id: cmd.lot_id,
            quantity: cmd.quantity,
            plan_id: cmd.plan_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &Withdraw) -> Result<Vec<LedgerEvent>, StockError> {
        self.ensure_product(cmd.product_id)?;
        if cmd.quantity < 0 {
            return Err(StockError::validation("withdrawal quantity cannot be negative"));
        }

        // Plan and commit in one decision: the resulting batch is appended
        // atomically, so either every step lands or none do.
        let plan = plan_withdrawal(self, cmd.quantity, cmd.location, cmd.plan_id)?;

        Ok(plan
            .steps
            .into_iter()
            .map(|step| {
                LedgerEvent::StockWithdrawn(StockWithdrawn {
                    product_id: cmd.product_id,
                    location_id: step.location_id,
                    lot_id: step.lot_id,
                    quantity: step.quantity,
                    plan_id: cmd.plan_id,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }

    fn handle_adjustment(&self, cmd: &RecordAdjustment) -> Result<Vec<LedgerEvent>, StockError> {
        self.ensure_product(cmd.product_id)?;
        if cmd.delta == 0 {
            return Err(StockError::validation("adjustment delta cannot be zero"));
        }
        if !self.lots.contains_key(&cmd.lot_id) {
            return Err(StockError::not_found(format!("lot {}", cmd.lot_id)));
        }
        let current = self.position(cmd.location_id, cmd.lot_id);
        if current + cmd.delta < 0 {
            return Err(StockError::insufficient(-cmd.delta, current));
        }
        Ok(vec![LedgerEvent::StockAdjusted(StockAdjusted {
            product_id: cmd.product_id,
            location_id: cmd.location_id,
            lot_id: cmd.lot_id,
            delta: cmd.delta,
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl AggregateRoot for StockLedger {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for StockLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::StockEntered(e) => {
                // First entry fixes the lot's code, expiration and receipt
                // time.
                self.lots.entry(e.lot_id).or_insert_with(|| LotRecord {
                    code: e.lot_code.clone(),
                    expiration: e.expiration,
                    received_at: e.occurred_at,
                });
                *self
                    .positions
                    .entry((e.location_id, e.lot_id))
                    .or_insert(0) += e.quantity;
            }
            LedgerEvent::StockWithdrawn(e) => {
                *self
                    .positions
                    .entry((e.location_id, e.lot_id))
                    .or_insert(0) -= e.quantity;
            }
            LedgerEvent::StockAdjusted(e) => {
                *self
                    .positions
                    .entry((e.location_id, e.lot_id))
                    .or_insert(0) += e.delta;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::RecordEntry(cmd) => self.handle_entry(cmd),
            LedgerCommand::RecordExit(cmd) => self.handle_exit(cmd),
            LedgerCommand::Withdraw(cmd) => self.handle_withdraw(cmd),
            LedgerCommand::RecordAdjustment(cmd) => self.handle_adjustment(cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldstock_core::PlanId;

    fn ts() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(
        ledger: &mut StockLedger,
        location_id: LocationId,
        lot_id: LotId,
        quantity: i64,
        expiration: Option<NaiveDate>,
    ) {
        let events = ledger
            .handle(&LedgerCommand::RecordEntry(RecordEntry {
                product_id: ledger.product_id(),
                location_id,
                lot_id,
                quantity,
                lot_code: None,
                expiration,
                occurred_at: ts(),
            }))
            .unwrap();
        for e in &events {
            ledger.apply(e);
        }
    }

    #[test]
    fn entry_creates_lot_and_increments_position() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let lot = LotId::new();

        entry(&mut ledger, loc, lot, 10, Some(date(2024, 6, 1)));

        assert_eq!(ledger.position(loc, lot), 10);
        assert_eq!(ledger.lot(lot).unwrap().expiration, Some(date(2024, 6, 1)));
        assert_eq!(ledger.version(), 1);
    }

    #[test]
    fn entry_rejects_non_positive_quantity() {
        let ledger = StockLedger::empty(ProductId::new());
        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            product_id: ledger.product_id(),
            location_id: LocationId::new(),
            lot_id: LotId::new(),
            quantity: 0,
            lot_code: None,
            expiration: None,
            occurred_at: ts(),
        });
        assert!(matches!(
            ledger.handle(&cmd),
            Err(StockError::Validation(_))
        ));
    }

    #[test]
    fn entry_with_conflicting_expiration_is_rejected() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let lot = LotId::new();
        entry(&mut ledger, loc, lot, 5, Some(date(2024, 6, 1)));

        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: lot,
            quantity: 5,
            lot_code: None,
            expiration: Some(date(2024, 7, 1)),
            occurred_at: ts(),
        });
        assert!(matches!(
            ledger.handle(&cmd),
            Err(StockError::LotExpirationMismatch { .. })
        ));
    }

    #[test]
    fn repeat_entry_with_same_expiration_accumulates() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let lot = LotId::new();
        entry(&mut ledger, loc, lot, 5, Some(date(2024, 6, 1)));
        entry(&mut ledger, loc, lot, 3, Some(date(2024, 6, 1)));
        assert_eq!(ledger.position(loc, lot), 8);
    }

    #[test]
    fn lot_code_is_fixed_at_first_entry() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let lot = LotId::new();

        let events = ledger
            .handle(&LedgerCommand::RecordEntry(RecordEntry {
                product_id: ledger.product_id(),
                location_id: loc,
                lot_id: lot,
                quantity: 5,
                lot_code: Some("L-2024-001".to_string()),
                expiration: None,
                occurred_at: ts(),
            }))
            .unwrap();
        for e in &events {
            ledger.apply(e);
        }
        assert_eq!(ledger.lot(lot).unwrap().code.as_deref(), Some("L-2024-001"));
        assert_eq!(ledger.lot_by_code("L-2024-001").unwrap().0, lot);

        // Omitting the code on a later entry is fine.
        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: lot,
            quantity: 3,
            lot_code: None,
            expiration: None,
            occurred_at: ts(),
        });
        assert!(ledger.handle(&cmd).is_ok());

        // Contradicting it is not.
        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: lot,
            quantity: 3,
            lot_code: Some("L-2024-002".to_string()),
            expiration: None,
            occurred_at: ts(),
        });
        assert!(matches!(ledger.handle(&cmd), Err(StockError::Conflict(_))));
    }

    #[test]
    fn lot_code_is_unique_within_a_product() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();

        let events = ledger
            .handle(&LedgerCommand::RecordEntry(RecordEntry {
                product_id: ledger.product_id(),
                location_id: loc,
                lot_id: LotId::new(),
                quantity: 5,
                lot_code: Some("L-2024-001".to_string()),
                expiration: None,
                occurred_at: ts(),
            }))
            .unwrap();
        for e in &events {
            ledger.apply(e);
        }

        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: LotId::new(),
            quantity: 5,
            lot_code: Some("L-2024-001".to_string()),
            expiration: None,
            occurred_at: ts(),
        });
        assert!(matches!(ledger.handle(&cmd), Err(StockError::Conflict(_))));
    }

    #[test]
    fn exit_respects_available_position() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let lot = LotId::new();
        entry(&mut ledger, loc, lot, 5, None);

        let cmd = LedgerCommand::RecordExit(RecordExit {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: lot,
            quantity: 6,
            plan_id: PlanId::new(),
            occurred_at: ts(),
        });
        assert_eq!(
            ledger.handle(&cmd),
            Err(StockError::insufficient(6, 5))
        );
        // Failed decision leaves state untouched.
        assert_eq!(ledger.position(loc, lot), 5);
    }

    #[test]
    fn exit_on_unknown_lot_is_not_found() {
        let ledger = StockLedger::empty(ProductId::new());
        let cmd = LedgerCommand::RecordExit(RecordExit {
            product_id: ledger.product_id(),
            location_id: LocationId::new(),
            lot_id: LotId::new(),
            quantity: 1,
            plan_id: PlanId::new(),
            occurred_at: ts(),
        });
        assert!(matches!(ledger.handle(&cmd), Err(StockError::NotFound(_))));
    }

    #[test]
    fn withdraw_emits_one_exit_per_plan_step() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let (january, february) = (LotId::new(), LotId::new());
        entry(&mut ledger, loc, january, 5, Some(date(2024, 1, 1)));
        entry(&mut ledger, loc, february, 5, Some(date(2024, 2, 1)));

        let plan_id = PlanId::new();
        let events = ledger
            .handle(&LedgerCommand::Withdraw(Withdraw {
                product_id: ledger.product_id(),
                quantity: 7,
                location: None,
                plan_id,
                occurred_at: ts(),
            }))
            .unwrap();

        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (LedgerEvent::StockWithdrawn(a), LedgerEvent::StockWithdrawn(b)) => {
                assert_eq!((a.lot_id, a.quantity), (january, 5));
                assert_eq!((b.lot_id, b.quantity), (february, 2));
                assert_eq!(a.plan_id, plan_id);
                assert_eq!(b.plan_id, plan_id);
            }
            other => panic!("expected two StockWithdrawn events, got {other:?}"),
        }

        for e in &events {
            ledger.apply(e);
        }
        assert_eq!(ledger.position(loc, january), 0);
        assert_eq!(ledger.position(loc, february), 3);
    }

    #[test]
    fn withdraw_shortfall_emits_nothing() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        entry(&mut ledger, loc, LotId::new(), 8, None);

        let before = ledger.clone();
        let err = ledger
            .handle(&LedgerCommand::Withdraw(Withdraw {
                product_id: ledger.product_id(),
                quantity: 10,
                location: None,
                plan_id: PlanId::new(),
                occurred_at: ts(),
            }))
            .unwrap_err();

        assert_eq!(err, StockError::insufficient(10, 8));
        assert_eq!(ledger, before);
    }

    #[test]
    fn zero_quantity_withdrawal_is_a_no_op() {
        let ledger = StockLedger::empty(ProductId::new());
        let events = ledger
            .handle(&LedgerCommand::Withdraw(Withdraw {
                product_id: ledger.product_id(),
                quantity: 0,
                location: None,
                plan_id: PlanId::new(),
                occurred_at: ts(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn adjustment_cannot_drive_position_negative() {
        let mut ledger = StockLedger::empty(ProductId::new());
        let loc = LocationId::new();
        let lot = LotId::new();
        entry(&mut ledger, loc, lot, 4, None);

        let cmd = LedgerCommand::RecordAdjustment(RecordAdjustment {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: lot,
            delta: -5,
            occurred_at: ts(),
        });
        assert_eq!(ledger.handle(&cmd), Err(StockError::insufficient(5, 4)));

        let cmd = LedgerCommand::RecordAdjustment(RecordAdjustment {
            product_id: ledger.product_id(),
            location_id: loc,
            lot_id: lot,
            delta: -4,
            occurred_at: ts(),
        });
        let events = ledger.handle(&cmd).unwrap();
        for e in &events {
            ledger.apply(e);
        }
        assert_eq!(ledger.position(loc, lot), 0);
    }

    #[test]
    fn command_for_wrong_product_is_rejected() {
        let ledger = StockLedger::empty(ProductId::new());
        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            product_id: ProductId::new(),
            location_id: LocationId::new(),
            lot_id: LotId::new(),
            quantity: 1,
            lot_code: None,
            expiration: None,
            occurred_at: ts(),
        });
        assert!(matches!(
            ledger.handle(&cmd),
            Err(StockError::InvariantViolation(_))
        ));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Enter(i64),
            TryWithdraw(i64),
        }

        fn step_strategy() -> impl Strategy<Value = Step> {
            prop_oneof![
                (1i64..50).prop_map(Step::Enter),
                (1i64..80).prop_map(Step::TryWithdraw),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: under any interleaving of entries and withdrawal
            /// attempts, the folded position equals the running signed sum
            /// and never dips below zero.
            #[test]
            fn positions_never_go_negative(steps in proptest::collection::vec(step_strategy(), 1..40)) {
                let mut ledger = StockLedger::empty(ProductId::new());
                let loc = LocationId::new();
                let lot = LotId::new();
                let mut expected: i64 = 0;

                for step in steps {
                    let cmd = match step {
                        Step::Enter(q) => LedgerCommand::RecordEntry(RecordEntry {
                            product_id: ledger.product_id(),
                            location_id: loc,
                            lot_id: lot,
                            quantity: q,
                            lot_code: None,
                            expiration: None,
                            occurred_at: Utc::now(),
                        }),
                        Step::TryWithdraw(q) => LedgerCommand::Withdraw(Withdraw {
                            product_id: ledger.product_id(),
                            quantity: q,
                            location: None,
                            plan_id: PlanId::new(),
                            occurred_at: Utc::now(),
                        }),
                    };

                    match ledger.handle(&cmd) {
                        Ok(events) => {
                            for e in &events {
                                expected += e.signed_quantity();
                                ledger.apply(e);
                            }
                        }
                        Err(StockError::InsufficientStock { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                    }

                    prop_assert_eq!(ledger.position(loc, lot), expected);
                    prop_assert!(expected >= 0);
                }
            }

            /// Property: replaying a decided event sequence onto a fresh
            /// instance reproduces the state exactly.
            #[test]
            fn replay_is_deterministic(quantities in proptest::collection::vec(1i64..100, 1..20)) {
                let product_id = ProductId::new();
                let loc = LocationId::new();
                let lot = LotId::new();

                let mut ledger = StockLedger::empty(product_id);
                let mut log: Vec<LedgerEvent> = Vec::new();

                for q in quantities {
                    let events = ledger.handle(&LedgerCommand::RecordEntry(RecordEntry {
                        product_id,
                        location_id: loc,
                        lot_id: lot,
                        quantity: q,
                        lot_code: None,
                        expiration: None,
                        occurred_at: Utc::now(),
                    })).unwrap();
                    for e in &events {
                        ledger.apply(e);
                        log.push(e.clone());
                    }
                }

                let mut replayed = StockLedger::empty(product_id);
                for e in &log {
                    replayed.apply(e);
                }
                prop_assert_eq!(replayed, ledger);
            }
        }
    }
}
