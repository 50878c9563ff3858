//! Order document transformation
//!
//! Turns a nested extraction row into the flat, serializable document both
//! sinks consume. Pure except for `etl_timestamp`, which is the wall-clock
//! time the transform ran (not the business order date). Malformed source
//! rows fail loudly as data errors instead of being coerced; the sinks
//! validate shape against their own schemas downstream.

use crate::error::{EtlError, Result};
use crate::extract::OrderRow;
use bigdecimal::ToPrimitive;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Tag identifying the origin system in every emitted document
pub const ETL_SOURCE: &str = "postgresql";

/// One order line item, denormalized with product/category/brand names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i32,
    pub product_name: String,
    pub category: String,
    pub brand: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_price: f64,
}

/// The canonical order document moved through the pipeline.
///
/// `order_id` is the idempotency key for both sinks: re-emitting a document
/// overwrites rather than duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDocument {
    pub order_id: i32,
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub order_date: NaiveDateTime,
    pub status: String,
    pub total_amount: f64,
    pub shipping_address: String,
    pub payment_method: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub items: Vec<OrderItem>,
    pub items_count: i32,
    pub total_quantity: i64,
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub etl_timestamp: DateTime<Utc>,
    pub etl_source: String,
}

/// Transform one extracted row into an order document
pub fn transform_order(row: OrderRow) -> Result<OrderDocument> {
    let items: Vec<OrderItem> = serde_json::from_value(row.items).map_err(|err| {
        EtlError::data(format!(
            "order {} has malformed items payload: {err}",
            row.order_id
        ))
    })?;

    if items.is_empty() {
        return Err(EtlError::data(format!(
            "order {} has no line items",
            row.order_id
        )));
    }

    let total_amount = row.total_amount.to_f64().ok_or_else(|| {
        EtlError::data(format!(
            "order {} total_amount {} is not representable as a float",
            row.order_id, row.total_amount
        ))
    })?;

    let total_quantity = items.iter().map(|item| i64::from(item.quantity)).sum();
    let categories: BTreeSet<String> = items.iter().map(|item| item.category.clone()).collect();
    let brands: BTreeSet<String> = items.iter().map(|item| item.brand.clone()).collect();

    Ok(OrderDocument {
        order_id: row.order_id,
        user_id: row.user_id,
        user_name: row.user_name,
        user_email: row.user_email,
        order_date: row.order_date,
        status: row.status,
        total_amount,
        shipping_address: row.shipping_address,
        payment_method: row.payment_method,
        created_at: row.created_at,
        updated_at: row.updated_at,
        items_count: items.len() as i32,
        total_quantity,
        categories: categories.into_iter().collect(),
        brands: brands.into_iter().collect(),
        items,
        etl_timestamp: Utc::now(),
        etl_source: ETL_SOURCE.to_string(),
    })
}

/// Transform a batch, preserving extraction order
pub fn transform_orders(rows: Vec<OrderRow>) -> Result<Vec<OrderDocument>> {
    let documents = rows
        .into_iter()
        .map(transform_order)
        .collect::<Result<Vec<_>>>()?;

    info!(count = documents.len(), "Transformed orders");
    Ok(documents)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::types::BigDecimal;
    use std::str::FromStr;

    fn sample_row(order_id: i32, items: serde_json::Value) -> OrderRow {
        OrderRow {
            order_id,
            user_id: 7,
            user_name: "Mina Park".to_string(),
            user_email: "mina@example.com".to_string(),
            order_date: NaiveDateTime::from_str("2026-08-20T10:15:00").unwrap(),
            status: "pending".to_string(),
            total_amount: BigDecimal::from_str("129.90").unwrap(),
            shipping_address: "12 Harbor Way".to_string(),
            payment_method: "credit_card".to_string(),
            created_at: NaiveDateTime::from_str("2026-08-20T10:15:01").unwrap(),
            updated_at: None,
            items,
        }
    }

    fn sample_items() -> serde_json::Value {
        json!([
            {
                "product_id": 11,
                "product_name": "Trail Shoe",
                "category": "Footwear",
                "brand": "Acme",
                "quantity": 2,
                "unit_price": 45.0,
                "total_price": 90.0
            },
            {
                "product_id": 12,
                "product_name": "Wool Socks",
                "category": "Apparel",
                "brand": "Acme",
                "quantity": 3,
                "unit_price": 13.3,
                "total_price": 39.9
            }
        ])
    }

    #[test]
    fn test_derived_fields() {
        let doc = transform_order(sample_row(42, sample_items())).unwrap();

        assert_eq!(doc.items_count, 2);
        assert_eq!(doc.items_count as usize, doc.items.len());
        assert_eq!(doc.total_quantity, 5);
        assert_eq!(doc.categories, vec!["Apparel", "Footwear"]);
        assert_eq!(doc.brands, vec!["Acme"]);
        assert_eq!(doc.etl_source, ETL_SOURCE);
    }

    #[test]
    fn test_decimal_amounts_become_floats() {
        let doc = transform_order(sample_row(42, sample_items())).unwrap();
        assert!((doc.total_amount - 129.90).abs() < 1e-9);
        assert!((doc.items[0].unit_price - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_nullable_updated_at_survives() {
        let doc = transform_order(sample_row(42, sample_items())).unwrap();
        assert_eq!(doc.updated_at, None);
    }

    #[test]
    fn test_malformed_items_fail_loudly() {
        let row = sample_row(42, json!([{"product_id": "not a number"}]));
        let err = transform_order(row).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Data);
    }

    #[test]
    fn test_empty_items_rejected() {
        let err = transform_order(sample_row(42, json!([]))).unwrap_err();
        assert!(err.to_string().contains("no line items"));
    }

    #[test]
    fn test_batch_preserves_order() {
        let rows = vec![sample_row(3, sample_items()), sample_row(1, sample_items())];
        let docs = transform_orders(rows).unwrap();
        assert_eq!(docs[0].order_id, 3);
        assert_eq!(docs[1].order_id, 1);
    }
}
