//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type StockResult<T> = Result<T, StockError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts, allocation shortfalls). Infrastructure concerns
/// belong elsewhere.
///
/// `InsufficientStock` is an expected, frequently-occurring outcome of a
/// withdrawal request, not a fault; callers may retry after new entries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity is not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. duplicate SKU, stale stream version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An allocation or exit could not be fully satisfied. No partial
    /// fulfillment is ever performed; `available` reports what was on hand.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// An entry supplied a different expiration date for an existing lot.
    /// A lot's expiration is set by its first entry and immutable after.
    #[error("expiration date conflicts with existing lot {lot}")]
    LotExpirationMismatch { lot: String },

    /// The per-product guard could not be acquired within the bounded wait.
    /// Transient; safe to retry.
    #[error("concurrency guard acquisition timed out")]
    ConcurrencyTimeout,
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    /// Shortfall of an insufficiency error, if this is one.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            Self::InsufficientStock {
                requested,
                available,
            } => Some(requested - available),
            _ => None,
        }
    }
}
