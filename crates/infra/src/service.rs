//! Application service facade.
//!
//! The boundary an HTTP layer (or any other collaborator) calls: catalog
//! registration, movement recording (single and bulk), guarded FEFO
//! withdrawal and the stock queries. Composes the catalog registry, the
//! command dispatcher, the position projection and the per-product guard.
//!
//! Committed envelopes are applied to the projection synchronously before a
//! call returns, so reads within the same process always observe the writes
//! that preceded them. The event bus still receives every committed event
//! for external consumers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use coldstock_catalog::{CatalogRegistry, Certification, Location, Product, Warehouse};
use coldstock_core::{
    LocationId, LotId, PlanId, ProductId, StockError, StockResult, WarehouseId,
};
use coldstock_events::{EventBus, EventEnvelope};
use coldstock_ledger::{
    LedgerCommand, LedgerEvent, PlanStep, RecordAdjustment, RecordEntry, StockLedger, Withdraw,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::{EventStore, StoredEvent};
use crate::guard::ProductGuard;
use crate::projections::stock_positions::{PositionKey, PositionRow, StockPositionProjection};
use crate::read_model::ReadModelStore;

/// Stream type identifier for product movement ledgers.
const LEDGER_AGGREGATE_TYPE: &str = "ledger.product";

/// Default bounded wait for the per-product guard.
const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_secs(5);

/// One row of a bulk entry request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    /// Human-facing lot code, fixed by the lot's first entry.
    pub lot_code: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Consumed breakdown returned to the withdrawal caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    pub plan_id: PlanId,
    pub product_id: ProductId,
    pub requested: i64,
    pub steps: Vec<PlanStep>,
}

/// Application facade over catalog, ledger, projection and guard.
pub struct InventoryService<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: ReadModelStore<PositionKey, PositionRow>,
{
    catalog: Arc<CatalogRegistry>,
    dispatcher: CommandDispatcher<S, B>,
    projection: Arc<StockPositionProjection<R>>,
    guard: ProductGuard,
    guard_timeout: Duration,
}

impl<S, B, R> InventoryService<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: ReadModelStore<PositionKey, PositionRow>,
{
    pub fn new(
        catalog: Arc<CatalogRegistry>,
        dispatcher: CommandDispatcher<S, B>,
        projection: Arc<StockPositionProjection<R>>,
    ) -> Self {
        Self {
            catalog,
            dispatcher,
            projection,
            guard: ProductGuard::new(),
            guard_timeout: DEFAULT_GUARD_TIMEOUT,
        }
    }

    pub fn with_guard_timeout(mut self, timeout: Duration) -> Self {
        self.guard_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &CatalogRegistry {
        &self.catalog
    }

    /// Authoritative event store, useful for projection rebuilds.
    pub fn event_store(&self) -> &S {
        self.dispatcher.store()
    }

    // ---- catalog operations ----

    pub fn register_product(&self, product: Product) -> StockResult<ProductId> {
        let id = self.catalog.register_product(product)?;
        tracing::info!("registered product {id}");
        Ok(id)
    }

    pub fn register_warehouse(&self, warehouse: Warehouse) -> StockResult<WarehouseId> {
        let id = self.catalog.register_warehouse(warehouse)?;
        tracing::info!("registered warehouse {id}");
        Ok(id)
    }

    pub fn register_location(&self, location: Location) -> StockResult<LocationId> {
        let id = self.catalog.register_location(location)?;
        tracing::info!("registered location {id}");
        Ok(id)
    }

    /// Attach a certification to a product. Orthogonal to allocation: the
    /// ledger and allocator never look at it.
    pub fn add_certification(
        &self,
        product_id: ProductId,
        cert: Certification,
    ) -> StockResult<()> {
        self.catalog.add_certification(product_id, cert)?;
        tracing::info!("attached certification to product {product_id}");
        Ok(())
    }

    pub fn product(&self, product_id: ProductId) -> StockResult<Product> {
        self.catalog.product(product_id)
    }

    // ---- movement recording ----

    /// Record a single entry movement.
    pub fn record_entry(&self, request: &EntryRequest) -> StockResult<()> {
        self.catalog.ensure_product(request.product_id)?;
        self.catalog.ensure_location(request.location_id)?;

        let _lease = self
            .guard
            .acquire_timeout(request.product_id, self.guard_timeout)?;

        let committed = self
            .dispatcher
            .dispatch(
                request.product_id.into(),
                LEDGER_AGGREGATE_TYPE,
                LedgerCommand::RecordEntry(RecordEntry {
                    product_id: request.product_id,
                    location_id: request.location_id,
                    lot_id: request.lot_id,
                    quantity: request.quantity,
                    lot_code: request.lot_code.clone(),
                    expiration: request.expiration,
                    occurred_at: request.occurred_at,
                }),
                |id| StockLedger::empty(id.into()),
            )
            .map_err(|e| e.into_stock_error())?;

        self.project(&committed)?;
        tracing::debug!(
            "entry recorded: product {} lot {} qty {}",
            request.product_id,
            request.lot_id,
            request.quantity
        );
        Ok(())
    }

    /// Record a batch of entries, isolating failures per row: one bad row
    /// never aborts the rest of the batch.
    pub fn record_entries(&self, requests: &[EntryRequest]) -> Vec<StockResult<()>> {
        requests
            .iter()
            .map(|request| {
                let outcome = self.record_entry(request);
                if let Err(err) = &outcome {
                    tracing::warn!(
                        "bulk entry row failed for product {}: {err}",
                        request.product_id
                    );
                }
                outcome
            })
            .collect()
    }

    /// Record a signed correction against one position.
    pub fn record_adjustment(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        lot_id: LotId,
        delta: i64,
        occurred_at: DateTime<Utc>,
    ) -> StockResult<()> {
        self.catalog.ensure_product(product_id)?;
        self.catalog.ensure_location(location_id)?;

        let _lease = self.guard.acquire_timeout(product_id, self.guard_timeout)?;

        let committed = self
            .dispatcher
            .dispatch(
                product_id.into(),
                LEDGER_AGGREGATE_TYPE,
                LedgerCommand::RecordAdjustment(RecordAdjustment {
                    product_id,
                    location_id,
                    lot_id,
                    delta,
                    occurred_at,
                }),
                |id| StockLedger::empty(id.into()),
            )
            .map_err(|e| e.into_stock_error())?;

        self.project(&committed)?;
        tracing::info!("adjustment recorded: product {product_id} lot {lot_id} delta {delta}");
        Ok(())
    }

    /// FEFO withdrawal: plan against current stock and commit the exit
    /// movements, serialized per product.
    ///
    /// All-or-nothing: on `InsufficientStock` no movement is recorded. A
    /// zero quantity succeeds trivially with an empty receipt.
    pub fn withdraw(
        &self,
        product_id: ProductId,
        quantity: i64,
        location: Option<LocationId>,
    ) -> StockResult<WithdrawalReceipt> {
        self.catalog.ensure_product(product_id)?;
        if let Some(location_id) = location {
            self.catalog.ensure_location(location_id)?;
        }

        let plan_id = PlanId::new();

        // Plan and commit happen inside one guarded section: the observed
        // stock cannot change between planning and the atomic append.
        let _lease = self.guard.acquire_timeout(product_id, self.guard_timeout)?;

        let committed = self
            .dispatcher
            .dispatch(
                product_id.into(),
                LEDGER_AGGREGATE_TYPE,
                LedgerCommand::Withdraw(Withdraw {
                    product_id,
                    quantity,
                    location,
                    plan_id,
                    occurred_at: Utc::now(),
                }),
                |id| StockLedger::empty(id.into()),
            )
            .map_err(|e| e.into_stock_error())?;

        self.project(&committed)?;

        let steps = self.steps_from_committed(&committed)?;
        tracing::info!(
            "withdrawal {plan_id} committed: product {product_id} qty {quantity} over {} lots",
            steps.len()
        );

        Ok(WithdrawalReceipt {
            plan_id,
            product_id,
            requested: quantity,
            steps,
        })
    }

    // ---- stock queries ----

    /// Total stock for a product across all locations and lots.
    pub fn total_stock(&self, product_id: ProductId) -> StockResult<i64> {
        self.catalog.ensure_product(product_id)?;
        Ok(self.projection.total_for_product(product_id))
    }

    /// Per-(location, lot) breakdown with expirations, FEFO-ordered.
    pub fn stock_detail(&self, product_id: ProductId) -> StockResult<Vec<PositionRow>> {
        self.catalog.ensure_product(product_id)?;
        Ok(self.projection.detail_for_product(product_id))
    }

    /// Distinct locations holding nonzero stock of a product.
    pub fn stock_locations(&self, product_id: ProductId) -> StockResult<Vec<LocationId>> {
        self.catalog.ensure_product(product_id)?;
        Ok(self.projection.locations_for_product(product_id))
    }

    /// Current quantity of one (product, location, lot) position.
    pub fn current_position(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        lot_id: LotId,
    ) -> StockResult<i64> {
        self.catalog.ensure_product(product_id)?;
        Ok(self.projection.position(&PositionKey {
            product_id,
            location_id,
            lot_id,
        }))
    }

    // ---- internals ----

    /// Fold committed events into the projection before returning to the
    /// caller (read-after-write consistency in-process).
    fn project(&self, committed: &[StoredEvent]) -> StockResult<()> {
        for stored in committed {
            self.projection
                .apply_envelope(&stored.to_envelope())
                .map_err(|e| StockError::invariant(e.to_string()))?;
        }
        Ok(())
    }

    fn steps_from_committed(&self, committed: &[StoredEvent]) -> StockResult<Vec<PlanStep>> {
        committed
            .iter()
            .map(|stored| {
                let event: LedgerEvent = serde_json::from_value(stored.payload.clone())
                    .map_err(|e| StockError::invariant(e.to_string()))?;
                match event {
                    LedgerEvent::StockWithdrawn(e) => {
                        let expiration = self
                            .projection
                            .row(&PositionKey {
                                product_id: e.product_id,
                                location_id: e.location_id,
                                lot_id: e.lot_id,
                            })
                            .and_then(|row| row.expiration);
                        Ok(PlanStep {
                            location_id: e.location_id,
                            lot_id: e.lot_id,
                            quantity: e.quantity,
                            expiration,
                        })
                    }
                    other => Err(StockError::invariant(format!(
                        "withdrawal committed a non-exit movement: {other:?}"
                    ))),
                }
            })
            .collect()
    }
}
