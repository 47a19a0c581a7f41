//! Infrastructure layer: event store, dispatch pipeline, projections,
//! per-product concurrency guard and the application service facade.

pub mod command_dispatcher;
pub mod event_store;
pub mod guard;
pub mod projections;
pub mod read_model;
pub mod service;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use guard::{ProductGuard, ProductLease};
pub use projections::stock_positions::{PositionKey, PositionRow, StockPositionProjection};
pub use read_model::{InMemoryReadModelStore, ReadModelStore};
pub use service::{EntryRequest, InventoryService, WithdrawalReceipt};
