//! Product catalog
//!
//! Public product ids are small slot numbers ("1", "2", ...) that map to a
//! Stripe price and product configured through `PRODUCT_PRICE<n>` and
//! `PRODUCT_ID<n>`.

use serde::Serialize;

use crate::error::{BillingError, BillingResult};
use crate::gateway::PaymentGateway;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub slot: String,
    pub price_id: String,
    pub product_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

/// Per-slot result of checking the catalog against Stripe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntryValidation {
    pub slot: String,
    pub price_id: String,
    pub price_valid: bool,
    pub product_id: String,
    pub product_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogValidation {
    pub all_valid: bool,
    pub products: Vec<CatalogEntryValidation>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Read slots 1, 2, ... until the first slot with neither variable set.
    pub fn from_lookup<F>(lookup: F) -> BillingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut entries = Vec::new();

        for n in 1.. {
            let price = lookup(&format!("PRODUCT_PRICE{}", n));
            let product = lookup(&format!("PRODUCT_ID{}", n));

            match (price, product) {
                (Some(price_id), Some(product_id)) => entries.push(CatalogEntry {
                    slot: n.to_string(),
                    price_id,
                    product_id,
                }),
                (None, None) => break,
                (Some(_), None) => {
                    return Err(BillingError::Config(format!(
                        "PRODUCT_PRICE{n} is set but PRODUCT_ID{n} is missing"
                    )))
                }
                (None, Some(_)) => {
                    return Err(BillingError::Config(format!(
                        "PRODUCT_ID{n} is set but PRODUCT_PRICE{n} is missing"
                    )))
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, slot: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    /// Resolve a public product id or fail with `UnknownProduct`.
    pub fn resolve(&self, slot: &str) -> BillingResult<&CatalogEntry> {
        self.get(slot)
            .ok_or_else(|| BillingError::UnknownProduct(format!("Product id {} requested, is invalid", slot)))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every configured price and product id against what Stripe lists.
    pub async fn validate(&self, gateway: &dyn PaymentGateway) -> BillingResult<CatalogValidation> {
        let price_ids = gateway.list_price_ids().await?;
        let product_ids = gateway.list_product_ids().await?;

        let products: Vec<CatalogEntryValidation> = self
            .entries
            .iter()
            .map(|entry| CatalogEntryValidation {
                slot: entry.slot.clone(),
                price_id: entry.price_id.clone(),
                price_valid: price_ids.contains(&entry.price_id),
                product_id: entry.product_id.clone(),
                product_valid: product_ids.contains(&entry.product_id),
            })
            .collect();

        let all_valid = products.iter().all(|p| p.price_valid && p.product_valid);

        for p in products.iter().filter(|p| !p.price_valid || !p.product_valid) {
            tracing::warn!(
                slot = %p.slot,
                price_id = %p.price_id,
                price_valid = p.price_valid,
                product_id = %p.product_id,
                product_valid = p.product_valid,
                "Catalog entry does not match Stripe"
            );
        }

        Ok(CatalogValidation {
            all_valid,
            products,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGateway;
    use std::collections::HashMap;

    fn catalog_from(vars: &[(&str, &str)]) -> BillingResult<Catalog> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Catalog::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_reads_consecutive_slots() {
        let catalog = catalog_from(&[
            ("PRODUCT_PRICE1", "price_1"),
            ("PRODUCT_ID1", "prod_1"),
            ("PRODUCT_PRICE2", "price_2"),
            ("PRODUCT_ID2", "prod_2"),
            // slot 4 is unreachable because slot 3 is missing
            ("PRODUCT_PRICE4", "price_4"),
            ("PRODUCT_ID4", "prod_4"),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.resolve("2").unwrap().price_id, "price_2");
        assert!(catalog.get("4").is_none());
    }

    #[test]
    fn test_half_configured_slot_is_rejected() {
        let err = catalog_from(&[("PRODUCT_PRICE1", "price_1")]).unwrap_err();
        assert!(matches!(err, BillingError::Config(_)));
    }

    #[test]
    fn test_resolve_rejects_unknown_slots() {
        let catalog = catalog_from(&[("PRODUCT_PRICE1", "price_1"), ("PRODUCT_ID1", "prod_1")]).unwrap();

        for slot in ["0", "3", "", "abc", "01"] {
            assert!(
                matches!(catalog.resolve(slot), Err(BillingError::UnknownProduct(_))),
                "slot {:?} should be rejected",
                slot
            );
        }
    }

    #[tokio::test]
    async fn test_validate_reports_missing_ids() {
        let catalog = catalog_from(&[
            ("PRODUCT_PRICE1", "price_1"),
            ("PRODUCT_ID1", "prod_1"),
            ("PRODUCT_PRICE2", "price_gone"),
            ("PRODUCT_ID2", "prod_2"),
        ])
        .unwrap();

        let gateway = ScriptedGateway::new()
            .with_price("price_1", "prod_1")
            .with_price("price_2", "prod_2");

        let report = catalog.validate(&gateway).await.unwrap();
        assert!(!report.all_valid);
        assert!(report.products[0].price_valid && report.products[0].product_valid);
        assert!(!report.products[1].price_valid);
        assert!(report.products[1].product_valid);
    }
}
