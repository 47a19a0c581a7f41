use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coldstock_core::{Entity, ProductId, StockError, StockResult};

/// Unit a product's quantities are counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOfMeasure {
    Unit,
    Box,
    Kilogram,
    Liter,
}

/// Issuing authority class for a sanitary certification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertificationKind {
    Invima,
    Fda,
    Ema,
    Local,
}

/// A sanitary certification attached to a product.
///
/// Informational only: the allocator never consults certifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    pub authority: String,
    pub kind: CertificationKind,
    pub valid_until: NaiveDate,
}

/// A product registered in the catalog.
///
/// `temp_min`/`temp_max` (cold-chain storage range in plain Celsius) and
/// `controlled` are carried as informational fields with no allocation
/// semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    unit: UnitOfMeasure,
    category: Option<String>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    controlled: bool,
    certifications: Vec<Certification>,
}

impl Product {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        unit: UnitOfMeasure,
    ) -> StockResult<Self> {
        let sku = sku.into();
        let name = name.into();
        if sku.trim().is_empty() {
            return Err(StockError::validation("sku cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(StockError::validation("name cannot be empty"));
        }
        Ok(Self {
            id,
            sku,
            name,
            unit,
            category: None,
            temp_min: None,
            temp_max: None,
            controlled: false,
            certifications: Vec::new(),
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_temperature_range(
        mut self,
        temp_min: Option<f64>,
        temp_max: Option<f64>,
    ) -> StockResult<Self> {
        if let (Some(lo), Some(hi)) = (temp_min, temp_max) {
            if lo > hi {
                return Err(StockError::validation("temp_min cannot exceed temp_max"));
            }
        }
        self.temp_min = temp_min;
        self.temp_max = temp_max;
        Ok(self)
    }

    pub fn with_controlled(mut self, controlled: bool) -> Self {
        self.controlled = controlled;
        self
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> UnitOfMeasure {
        self.unit
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn controlled(&self) -> bool {
        self.controlled
    }

    pub fn certifications(&self) -> &[Certification] {
        &self.certifications
    }

    /// A product is considered certified once at least one certification is
    /// attached. Orthogonal to allocation.
    pub fn is_certified(&self) -> bool {
        !self.certifications.is_empty()
    }

    pub(crate) fn attach_certification(&mut self, cert: Certification) -> StockResult<()> {
        if cert.authority.trim().is_empty() {
            return Err(StockError::validation("certification authority cannot be empty"));
        }
        self.certifications.push(cert);
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
