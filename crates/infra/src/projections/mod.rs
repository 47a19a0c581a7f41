//! Projection implementations (read model builders).
//!
//! Projections consume movement events and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: reconstructible from the event stream
//! - **Idempotent**: safe for at-least-once delivery

pub mod stock_positions;

pub use stock_positions::{
    PositionKey, PositionRow, StockPositionProjection, StockProjectionError,
};
