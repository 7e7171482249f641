//! Vendor registry collaborator
//!
//! The core only needs vendor identity: a lookup that says whether an id is
//! known. Company lifecycle data stays with the registry.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::VendorId;

/// Registered company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
}

impl Vendor {
    pub fn new(id: impl Into<VendorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lookup of vendors by id
pub trait VendorRegistry: Send + Sync {
    fn lookup(&self, id: &VendorId) -> Option<Vendor>;
}

/// Registry kept in memory
#[derive(Debug, Default)]
pub struct InMemoryVendorRegistry {
    vendors: RwLock<HashMap<VendorId, Vendor>>,
}

impl InMemoryVendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vendors(vendors: impl IntoIterator<Item = Vendor>) -> Self {
        let registry = Self::new();
        for vendor in vendors {
            registry.register(vendor);
        }
        registry
    }

    pub fn register(&self, vendor: Vendor) {
        tracing::debug!(vendor_id = %vendor.id, "Vendor registered");
        self.vendors.write().insert(vendor.id.clone(), vendor);
    }
}

impl VendorRegistry for InMemoryVendorRegistry {
    fn lookup(&self, id: &VendorId) -> Option<Vendor> {
        self.vendors.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let registry = InMemoryVendorRegistry::with_vendors([Vendor::new("V-1", "Acme Builders")]);
        assert_eq!(
            registry.lookup(&VendorId::from("V-1")).map(|v| v.name),
            Some("Acme Builders".to_string())
        );
        assert!(registry.lookup(&VendorId::from("V-2")).is_none());
    }
}
