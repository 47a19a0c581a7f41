//! Stock position projection: the read side of the movement ledger.
//!
//! Maintains per-(product, location, lot) quantities by folding published
//! movement envelopes. Exposed values always equal the fold of committed
//! movements; the read model itself is disposable and rebuildable.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use coldstock_core::{AggregateId, LocationId, LotId, ProductId};
use coldstock_events::EventEnvelope;
use coldstock_ledger::LedgerEvent;

use crate::read_model::ReadModelStore;

/// Identity of one stock position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
}

/// Queryable position: current quantity plus the lot facts needed to order
/// rows the way the allocator consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRow {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub lot_code: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub received_at: DateTime<Utc>,
}

impl PositionRow {
    /// FEFO display/consumption order: expiration asc (absent last), then
    /// receipt time, then lot id, then location id.
    fn fefo_key(&self) -> (bool, Option<NaiveDate>, DateTime<Utc>, LotId, LocationId) {
        (
            self.expiration.is_none(),
            self.expiration,
            self.received_at,
            self.lot_id,
            self.location_id,
        )
    }
}

/// Lot-level facts, shared by every position row of the lot. Fixed by the
/// lot's first entry movement, mirroring the ledger's own lot records.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LotFacts {
    lot_code: Option<String>,
    expiration: Option<NaiveDate>,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize movement event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    /// A panic while a projection lock was held. The read model may be
    /// missing movements and must be rebuilt.
    #[error("projection lock poisoned")]
    LockPoisoned,
}

/// Stock position projection.
///
/// Consumes published envelopes (JSON payloads) and maintains the position
/// read model. Idempotent for at-least-once delivery: a per-stream cursor
/// ignores replays at or below the last applied sequence number.
#[derive(Debug)]
pub struct StockPositionProjection<S>
where
    S: ReadModelStore<PositionKey, PositionRow>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    lots: RwLock<HashMap<LotId, LotFacts>>,
}

impl<S> StockPositionProjection<S>
where
    S: ReadModelStore<PositionKey, PositionRow>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            lots: RwLock::new(HashMap::new()),
        }
    }

    /// Current quantity for one position (0 if never seen).
    pub fn position(&self, key: &PositionKey) -> i64 {
        self.store.get(key).map(|row| row.quantity).unwrap_or(0)
    }

    /// Full row for one position, zeroed rows included.
    pub fn row(&self, key: &PositionKey) -> Option<PositionRow> {
        self.store.get(key)
    }

    /// Total stock for a product across all locations and lots.
    pub fn total_for_product(&self, product_id: ProductId) -> i64 {
        self.store
            .list()
            .into_iter()
            .filter(|row| row.product_id == product_id && row.quantity > 0)
            .map(|row| row.quantity)
            .sum()
    }

    /// Per-position breakdown for a product, FEFO-ordered, quantity > 0 only.
    pub fn detail_for_product(&self, product_id: ProductId) -> Vec<PositionRow> {
        let mut rows: Vec<PositionRow> = self
            .store
            .list()
            .into_iter()
            .filter(|row| row.product_id == product_id && row.quantity > 0)
            .collect();
        rows.sort_by_key(PositionRow::fefo_key);
        rows
    }

    /// Distinct locations holding nonzero stock of a product.
    pub fn locations_for_product(&self, product_id: ProductId) -> Vec<LocationId> {
        let mut locations: Vec<LocationId> = self
            .store
            .list()
            .into_iter()
            .filter(|row| row.product_id == product_id && row.quantity > 0)
            .map(|row| row.location_id)
            .collect();
        locations.sort();
        locations.dedup();
        locations
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces monotonic sequence per aggregate stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StockProjectionError::LockPoisoned)?;
        let last = *cursors.get(&aggregate_id).unwrap_or(&0);

        if seq == 0 {
            return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            // First event may carry any positive sequence; after that we
            // enforce strict monotonic increments.
            return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: LedgerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        // The ledger streams one aggregate per product.
        if AggregateId::from(*event.product_id().as_uuid()) != aggregate_id {
            return Err(StockProjectionError::StreamMismatch(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let key = PositionKey {
            product_id: event.product_id(),
            location_id: event.location_id(),
            lot_id: event.lot_id(),
        };

        // Lot facts are lot-level, not position-level: an adjustment or
        // withdrawal opening a new location for a known lot must still carry
        // the lot's expiration and true receipt time.
        if let LedgerEvent::StockEntered(e) = &event {
            let mut lots = self
                .lots
                .write()
                .map_err(|_| StockProjectionError::LockPoisoned)?;
            lots.entry(e.lot_id).or_insert_with(|| LotFacts {
                lot_code: e.lot_code.clone(),
                expiration: e.expiration,
                received_at: e.occurred_at,
            });
        }
        let facts = self
            .lots
            .read()
            .map_err(|_| StockProjectionError::LockPoisoned)?
            .get(&key.lot_id)
            .cloned();
        let (lot_code, expiration, received_at) = match facts {
            Some(f) => (f.lot_code, f.expiration, f.received_at),
            // Committed streams always open a lot with an entry; anything
            // else has no facts to report.
            None => (None, None, coldstock_events::Event::occurred_at(&event)),
        };

        let mut row = self.store.get(&key).unwrap_or(PositionRow {
            product_id: key.product_id,
            location_id: key.location_id,
            lot_id: key.lot_id,
            quantity: 0,
            lot_code: lot_code.clone(),
            expiration,
            received_at,
        });
        row.lot_code = lot_code;
        row.expiration = expiration;
        row.received_at = received_at;
        row.quantity += event.signed_quantity();
        self.store.upsert(key, row);

        // Advance cursor after successful apply.
        cursors.insert(aggregate_id, seq);

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockProjectionError> {
        self.cursors
            .write()
            .map_err(|_| StockProjectionError::LockPoisoned)?
            .clear();
        self.lots
            .write()
            .map_err(|_| StockProjectionError::LockPoisoned)?
            .clear();
        self.store.clear();

        // Deterministic replay order: aggregate, then sequence.
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
