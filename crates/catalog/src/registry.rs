//! In-process catalog registry.
//!
//! Registration and existence checks for products, warehouses and locations.
//! Backed by `RwLock`ed maps; a durable backend would sit behind the same
//! operations.

use std::collections::HashMap;
use std::sync::RwLock;

use coldstock_core::{Entity, LocationId, ProductId, StockError, StockResult, WarehouseId};

use crate::product::{Certification, Product};
use crate::warehouse::{Location, Warehouse};

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    skus: HashMap<String, ProductId>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    locations: HashMap<LocationId, Location>,
}

/// Registry of catalog entities.
///
/// All mutating operations reject duplicates (by id, by SKU, by physical
/// slot); all lookups return `NotFound` for unregistered identifiers.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    state: RwLock<CatalogState>,
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StockResult<std::sync::RwLockReadGuard<'_, CatalogState>> {
        self.state
            .read()
            .map_err(|_| StockError::conflict("catalog lock poisoned"))
    }

    fn write(&self) -> StockResult<std::sync::RwLockWriteGuard<'_, CatalogState>> {
        self.state
            .write()
            .map_err(|_| StockError::conflict("catalog lock poisoned"))
    }

    pub fn register_product(&self, product: Product) -> StockResult<ProductId> {
        let mut state = self.write()?;
        let id = *product.id();
        if state.products.contains_key(&id) {
            return Err(StockError::conflict(format!("product {id} already registered")));
        }
        if state.skus.contains_key(product.sku()) {
            return Err(StockError::conflict(format!(
                "sku '{}' already registered",
                product.sku()
            )));
        }
        state.skus.insert(product.sku().to_string(), id);
        state.products.insert(id, product);
        Ok(id)
    }

    pub fn register_warehouse(&self, warehouse: Warehouse) -> StockResult<WarehouseId> {
        let mut state = self.write()?;
        let id = *warehouse.id();
        if state.warehouses.contains_key(&id) {
            return Err(StockError::conflict(format!(
                "warehouse {id} already registered"
            )));
        }
        let key = warehouse.slot_key();
        if state.warehouses.values().any(|w| w.slot_key() == key) {
            return Err(StockError::conflict("warehouse address already registered"));
        }
        state.warehouses.insert(id, warehouse);
        Ok(id)
    }

    /// Register a location; its warehouse must already exist and the
    /// (aisle, shelf, slot) triple must be free within that warehouse.
    pub fn register_location(&self, location: Location) -> StockResult<LocationId> {
        let mut state = self.write()?;
        if !state.warehouses.contains_key(&location.warehouse_id()) {
            return Err(StockError::not_found(format!(
                "warehouse {}",
                location.warehouse_id()
            )));
        }
        let id = *location.id();
        if state.locations.contains_key(&id) {
            return Err(StockError::conflict(format!(
                "location {id} already registered"
            )));
        }
        let key = location.slot_key();
        if state.locations.values().any(|l| l.slot_key() == key) {
            return Err(StockError::conflict(
                "location slot already occupied in this warehouse",
            ));
        }
        state.locations.insert(id, location);
        Ok(id)
    }

    /// Attach a certification to an existing product (dedicated operation;
    /// the only way certification state changes).
    pub fn add_certification(
        &self,
        product_id: ProductId,
        cert: Certification,
    ) -> StockResult<()> {
        let mut state = self.write()?;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StockError::not_found(format!("product {product_id}")))?;
        product.attach_certification(cert)
    }

    pub fn product(&self, id: ProductId) -> StockResult<Product> {
        self.read()?
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StockError::not_found(format!("product {id}")))
    }

    pub fn product_by_sku(&self, sku: &str) -> StockResult<Product> {
        let state = self.read()?;
        let id = state
            .skus
            .get(sku)
            .ok_or_else(|| StockError::not_found(format!("product sku '{sku}'")))?;
        Ok(state.products[id].clone())
    }

    pub fn warehouse(&self, id: WarehouseId) -> StockResult<Warehouse> {
        self.read()?
            .warehouses
            .get(&id)
            .cloned()
            .ok_or_else(|| StockError::not_found(format!("warehouse {id}")))
    }

    pub fn location(&self, id: LocationId) -> StockResult<Location> {
        self.read()?
            .locations
            .get(&id)
            .cloned()
            .ok_or_else(|| StockError::not_found(format!("location {id}")))
    }

    /// Existence check used by movement validation.
    pub fn ensure_product(&self, id: ProductId) -> StockResult<()> {
        self.product(id).map(|_| ())
    }

    pub fn ensure_location(&self, id: LocationId) -> StockResult<()> {
        self.location(id).map(|_| ())
    }
}
