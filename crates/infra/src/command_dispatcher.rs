//! Command execution pipeline (application-level orchestration).
//!
//! Implements the command dispatch pattern for event-sourced aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections and external consumers)
//! ```
//!
//! Events are persisted before publication: if the append fails nothing is
//! published, and if publication fails the events are already durable (the
//! store is the source of truth; delivery is at-least-once). The append of a
//! decided batch is atomic, which is what guarantees a multi-step withdrawal
//! plan commits all-or-nothing.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use coldstock_core::{Aggregate, AggregateId, ExpectedVersion, StockError};
use coldstock_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic domain failure (validation, invariant, insufficiency,
    /// expiration mismatch). Carried through unchanged so callers keep the
    /// typed payload (e.g. the shortfall of an `InsufficientStock`).
    #[error(transparent)]
    Domain(#[from] StockError),

    /// Failed to deserialize historical event payloads into the aggregate
    /// event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// Persisting to the event store failed (includes optimistic
    /// concurrency conflicts from a racing writer).
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// Publication failed after a successful append (at-least-once; retry
    /// may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl DispatchError {
    /// Collapse into a domain error for the service boundary, where the
    /// `StockError` kinds are the contract.
    pub fn into_stock_error(self) -> StockError {
        match self {
            DispatchError::Domain(e) => e,
            DispatchError::Store(EventStoreError::Concurrency(msg)) => StockError::conflict(msg),
            DispatchError::Store(e) => StockError::conflict(e.to_string()),
            DispatchError::Deserialize(msg) => StockError::invariant(msg),
            DispatchError::Publish(msg) => StockError::conflict(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the service facade and the infrastructure (event store,
/// event bus), giving every command the same execution model while keeping
/// domain code pure and testable. Generic over store and bus so tests wire
/// in-memory implementations and production can swap durable ones without
/// touching domain code.
///
/// Concurrency is optimistic: the stream version observed during rehydration
/// is expected at append time, so a racing writer surfaces as a
/// `Store(Concurrency)` error. The per-product guard already serializes
/// writers; the version check still runs on every append.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` constructs a fresh instance for rehydration (e.g.
    /// `StockLedger::empty(product_id)`), keeping the dispatcher generic over
    /// aggregate types.
    ///
    /// Returns the committed `StoredEvent`s with assigned sequence numbers;
    /// an empty vector means the command decided nothing (a no-op such as a
    /// zero-quantity withdrawal).
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = StockError>,
        A::Event: coldstock_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Guard against a buggy backend returning a foreign or reordered stream.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
