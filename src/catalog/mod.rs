//! Product catalog entities and the catalog export blob.
//!
//! Entities use camelCase on the wire. Monetary amounts and tax rates are
//! [`Decimal`]s, serialized as strings.

mod export;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use export::{ExportBlob, ExportError, decode_export, encode_export, try_decode_export};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Billing interval of a recurring price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub id: String,
    pub product_id: String,
    /// ISO 4217 code of a [`Currency`].
    pub currency: String,
    pub amount: Decimal,
    /// `None` for one-off prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<BillingInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tax {
    pub id: String,
    pub name: String,
    /// Percentage, e.g. `19.00`.
    pub rate: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Whether prices already include this tax.
    #[serde(default)]
    pub inclusive: bool,
}

impl Tax {
    /// Tax owed on `net`, rounded to 2 decimal places.
    pub fn amount_on(&self, net: Decimal) -> Decimal {
        (net * self.rate / Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Minor unit digits (2 for EUR, 0 for JPY).
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_true() -> bool {
    true
}

fn default_decimals() -> u32 {
    2
}

/// The whole catalog as exported and imported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogExport {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub prices: Vec<Price>,
    #[serde(default)]
    pub taxes: Vec<Tax>,
    #[serde(default)]
    pub currencies: Vec<Currency>,
}

impl CatalogExport {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
            && self.categories.is_empty()
            && self.prices.is_empty()
            && self.taxes.is_empty()
            && self.currencies.is_empty()
    }

    /// Prices whose currency is not part of the export.
    pub fn prices_with_unknown_currency(&self) -> Vec<&Price> {
        self.prices
            .iter()
            .filter(|p| !self.currencies.iter().any(|c| c.code == p.currency))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rust_decimal::dec;

    use super::*;

    pub(crate) fn sample_catalog() -> CatalogExport {
        CatalogExport {
            products: vec![Product {
                id: "prod_1".to_string(),
                name: "Agent Seat".to_string(),
                description: None,
                category_id: Some("cat_1".to_string()),
                active: true,
                created_at: None,
            }],
            categories: vec![Category {
                id: "cat_1".to_string(),
                name: "Seats".to_string(),
                parent_id: None,
                description: None,
            }],
            prices: vec![Price {
                id: "price_1".to_string(),
                product_id: "prod_1".to_string(),
                currency: "EUR".to_string(),
                amount: dec!(49.90),
                interval: Some(BillingInterval::Month),
                tax_id: Some("tax_de".to_string()),
                active: true,
            }],
            taxes: vec![Tax {
                id: "tax_de".to_string(),
                name: "USt".to_string(),
                rate: dec!(19),
                country: Some("DE".to_string()),
                inclusive: false,
            }],
            currencies: vec![Currency {
                code: "EUR".to_string(),
                name: "Euro".to_string(),
                symbol: Some("€".to_string()),
                decimals: 2,
            }],
        }
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let catalog = sample_catalog();
        let value = serde_json::to_value(&catalog.prices[0]).unwrap();
        assert_eq!(value["productId"], "prod_1");
        assert_eq!(value["amount"], "49.90");
        assert_eq!(value["interval"], "month");
        assert!(value.get("product_id").is_none());
    }

    #[test]
    fn test_defaults_on_sparse_input() {
        let product: Product = serde_json::from_str(r#"{"id": "p", "name": "P"}"#).unwrap();
        assert!(product.active);
        assert_eq!(product.category_id, None);

        let currency: Currency = serde_json::from_str(r#"{"code": "JPY", "name": "Yen"}"#).unwrap();
        assert_eq!(currency.decimals, 2);

        let price: Price = serde_json::from_str(
            r#"{"id": "x", "productId": "p", "currency": "USD", "amount": 10.5}"#,
        )
        .unwrap();
        assert_eq!(price.amount, dec!(10.5));
        assert_eq!(price.interval, None);
    }

    #[test]
    fn test_tax_amount() {
        let tax = &sample_catalog().taxes[0];
        assert_eq!(tax.amount_on(dec!(49.90)), dec!(9.48));
    }

    #[test]
    fn test_prices_with_unknown_currency() {
        let mut catalog = sample_catalog();
        assert!(catalog.prices_with_unknown_currency().is_empty());
        catalog.prices[0].currency = "USD".to_string();
        assert_eq!(catalog.prices_with_unknown_currency().len(), 1);
        assert!(!catalog.is_empty());
        assert!(CatalogExport::default().is_empty());
    }
}
