//! Append-only event store boundary.
//!
//! Infrastructure-facing abstraction for storing and loading per-product
//! movement streams without making any storage assumptions. Durable backends
//! are a collaborator concern behind the same trait.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
