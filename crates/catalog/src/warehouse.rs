use serde::{Deserialize, Serialize};

use coldstock_core::{Entity, LocationId, StockError, StockResult, WarehouseId};

/// Countries the operation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    Co,
    Ec,
    Mx,
    Pe,
}

/// A physical warehouse, container for storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    id: WarehouseId,
    address: String,
    city: String,
    country: Country,
}

impl Warehouse {
    pub fn new(
        id: WarehouseId,
        address: impl Into<String>,
        city: impl Into<String>,
        country: Country,
    ) -> StockResult<Self> {
        let address = address.into();
        let city = city.into();
        if address.trim().is_empty() {
            return Err(StockError::validation("address cannot be empty"));
        }
        if city.trim().is_empty() {
            return Err(StockError::validation("city cannot be empty"));
        }
        Ok(Self {
            id,
            address,
            city,
            country,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn country(&self) -> Country {
        self.country
    }

    /// Uniqueness key: one warehouse per (country, city, address).
    pub(crate) fn slot_key(&self) -> (Country, String, String) {
        (self.country, self.city.clone(), self.address.clone())
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A physical slot (aisle/shelf/position) inside a warehouse.
///
/// Belongs to exactly one warehouse; unique per warehouse on its slot triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    id: LocationId,
    warehouse_id: WarehouseId,
    aisle: String,
    shelf: String,
    slot: String,
}

impl Location {
    pub fn new(
        id: LocationId,
        warehouse_id: WarehouseId,
        aisle: impl Into<String>,
        shelf: impl Into<String>,
        slot: impl Into<String>,
    ) -> StockResult<Self> {
        let aisle = aisle.into();
        let shelf = shelf.into();
        let slot = slot.into();
        if aisle.trim().is_empty() || shelf.trim().is_empty() || slot.trim().is_empty() {
            return Err(StockError::validation(
                "aisle, shelf and slot must all be non-empty",
            ));
        }
        Ok(Self {
            id,
            warehouse_id,
            aisle,
            shelf,
            slot,
        })
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn aisle(&self) -> &str {
        &self.aisle
    }

    pub fn shelf(&self) -> &str {
        &self.shelf
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub(crate) fn slot_key(&self) -> (WarehouseId, String, String, String) {
        (
            self.warehouse_id,
            self.aisle.clone(),
            self.shelf.clone(),
            self.slot.clone(),
        )
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warehouse_rejects_blank_fields() {
        assert!(Warehouse::new(WarehouseId::new(), " ", "Bogota", Country::Co).is_err());
        assert!(Warehouse::new(WarehouseId::new(), "Cra 7 #12", " ", Country::Co).is_err());
    }

    #[test]
    fn location_requires_full_slot_triple() {
        let wid = WarehouseId::new();
        assert!(Location::new(LocationId::new(), wid, "A", "", "1").is_err());
        assert!(Location::new(LocationId::new(), wid, "A", "3", "1").is_ok());
    }
}
