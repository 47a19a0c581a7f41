//! `coldstock-catalog` — identity and existence checks for products,
//! warehouses and storage locations.
//!
//! The catalog never participates in allocation decisions; it only answers
//! "does this identifier refer to something registered" and carries
//! informational metadata (certifications, temperature ranges).

pub mod product;
pub mod registry;
pub mod warehouse;

pub use product::{Certification, CertificationKind, Product, UnitOfMeasure};
pub use registry::CatalogRegistry;
pub use warehouse::{Country, Location, Warehouse};
