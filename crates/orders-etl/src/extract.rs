//! Incremental order extraction
//!
//! One parameterized query pulls the changed orders together with their line
//! items. The item fan-out is folded back into one row per order by the
//! database (`json_agg`), so the process boundary only ever carries one row
//! per order. With a high-water mark the filter re-extracts rows whose
//! `created_at` OR `updated_at` moved past it, so status-only updates
//! propagate; without one (cold start) the extraction is capped at the
//! configured row limit in descending order-date order.

use crate::error::Result;
use chrono::NaiveDateTime;
use sqlx::types::BigDecimal;
use sqlx::PgConnection;
use tracing::info;

/// Column list and joins shared by both extraction modes
const EXTRACT_BODY: &str = r#"
SELECT
    o.order_id,
    o.user_id,
    u.name AS user_name,
    u.email AS user_email,
    o.order_date,
    o.status,
    o.total_amount,
    o.shipping_address,
    o.payment_method,
    o.created_at,
    o.updated_at,
    json_agg(
        json_build_object(
            'product_id', oi.product_id,
            'product_name', p.name,
            'category', c.name,
            'brand', b.name,
            'quantity', oi.quantity,
            'unit_price', oi.unit_price,
            'total_price', oi.total_price
        )
    ) AS items
FROM orders o
JOIN users u ON o.user_id = u.user_id
JOIN order_items oi ON o.order_id = oi.order_id
JOIN products p ON oi.product_id = p.product_id
JOIN categories c ON p.category_id = c.category_id
JOIN brands b ON p.brand_id = b.brand_id
"#;

const EXTRACT_TAIL: &str = r#"
GROUP BY o.order_id, u.name, u.email
ORDER BY o.order_date DESC
"#;

/// One order row as returned by the extraction query, items pre-aggregated
/// into a JSON array by the database
#[derive(Debug, sqlx::FromRow)]
pub struct OrderRow {
    pub order_id: i32,
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub order_date: NaiveDateTime,
    pub status: String,
    pub total_amount: BigDecimal,
    pub shipping_address: String,
    pub payment_method: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub items: serde_json::Value,
}

/// Build the extraction SQL, with or without the incremental predicate
pub fn extract_sql(incremental: bool) -> String {
    if incremental {
        format!(
            "{EXTRACT_BODY}WHERE o.created_at > $1 OR o.updated_at > $1{EXTRACT_TAIL}LIMIT $2"
        )
    } else {
        format!("{EXTRACT_BODY}{EXTRACT_TAIL}LIMIT $1")
    }
}

/// Extract the orders changed since `since`, or the capped most-recent set
/// when no high-water mark exists yet.
///
/// An empty result is a normal outcome (nothing changed), not an error.
pub async fn extract_orders(
    conn: &mut PgConnection,
    since: Option<NaiveDateTime>,
    limit: i64,
) -> Result<Vec<OrderRow>> {
    let rows = match since {
        Some(mark) => {
            info!(since = %mark, "Extracting orders modified after high-water mark");
            sqlx::query_as::<_, OrderRow>(&extract_sql(true))
                .bind(mark)
                .bind(limit)
                .fetch_all(&mut *conn)
                .await?
        },
        None => {
            info!(limit, "Extracting most recent orders (initial run)");
            sqlx::query_as::<_, OrderRow>(&extract_sql(false))
                .bind(limit)
                .fetch_all(&mut *conn)
                .await?
        },
    };

    info!(count = rows.len(), "Extracted orders from PostgreSQL");
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_sql_filters_on_both_timestamps() {
        let sql = extract_sql(true);
        assert!(sql.contains("WHERE o.created_at > $1 OR o.updated_at > $1"));
        assert!(sql.contains("LIMIT $2"));
    }

    #[test]
    fn test_cold_start_sql_is_capped_not_filtered() {
        let sql = extract_sql(false);
        assert!(!sql.contains("WHERE"));
        assert!(sql.contains("LIMIT $1"));
        assert!(sql.contains("ORDER BY o.order_date DESC"));
    }

    #[test]
    fn test_sql_folds_items_at_the_source() {
        let sql = extract_sql(true);
        assert!(sql.contains("json_agg"));
        assert!(sql.contains("GROUP BY o.order_id"));
    }
}
