//! Per-product concurrency guard.
//!
//! At most one in-flight plan-then-commit sequence per product at a time;
//! different products proceed independently. Acquisition blocks (or times
//! out, when bounded) until the prior holder releases; release happens on
//! every exit path via the RAII lease.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use coldstock_core::{ProductId, StockError, StockResult};

/// Blocking mutual exclusion keyed by product identifier.
#[derive(Debug, Default)]
pub struct ProductGuard {
    in_flight: Mutex<HashSet<ProductId>>,
    released: Condvar,
}

/// RAII lease on one product. Dropping it releases the guard and wakes
/// waiters.
#[derive(Debug)]
pub struct ProductLease<'a> {
    guard: &'a ProductGuard,
    product_id: ProductId,
}

impl ProductGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard for a product, blocking until it is free.
    pub fn acquire(&self, product_id: ProductId) -> StockResult<ProductLease<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| StockError::conflict("product guard lock poisoned"))?;

        while in_flight.contains(&product_id) {
            in_flight = self
                .released
                .wait(in_flight)
                .map_err(|_| StockError::conflict("product guard lock poisoned"))?;
        }

        in_flight.insert(product_id);
        Ok(ProductLease {
            guard: self,
            product_id,
        })
    }

    /// Acquire with a bounded wait. `ConcurrencyTimeout` is transient and
    /// safe to retry.
    pub fn acquire_timeout(
        &self,
        product_id: ProductId,
        timeout: Duration,
    ) -> StockResult<ProductLease<'_>> {
        let deadline = Instant::now() + timeout;
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| StockError::conflict("product guard lock poisoned"))?;

        while in_flight.contains(&product_id) {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(StockError::ConcurrencyTimeout)?;
            let (next, wait) = self
                .released
                .wait_timeout(in_flight, remaining)
                .map_err(|_| StockError::conflict("product guard lock poisoned"))?;
            in_flight = next;
            if wait.timed_out() && in_flight.contains(&product_id) {
                return Err(StockError::ConcurrencyTimeout);
            }
        }

        in_flight.insert(product_id);
        Ok(ProductLease {
            guard: self,
            product_id,
        })
    }
}

impl Drop for ProductLease<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.guard.in_flight.lock() {
            in_flight.remove(&self.product_id);
        }
        self.guard.released.notify_all();
    }
}
