//! Partitioned file-store sink
//!
//! Order documents land in an hour-bucketed warehouse keyed by the *run*
//! time, not the business order date:
//!
//! ```text
//! <root>/year=YYYY/month=MM/day=DD/orders_YYYYMMDD_HH.parquet
//! <root>/year=YYYY/month=MM/day=DD/orders_YYYYMMDD_HH.json
//! ```
//!
//! Multiple cycles within one hour share a file pair, so every write is a
//! read-merge-write: load the hour's existing rows, append the new batch,
//! dedup by `order_id` keeping the newest occurrence, rewrite both files
//! from the merged set. The JSON file is the merge source; the Parquet file
//! is regenerated from the merged rows each time, keeping the pair in
//! lockstep. An unreadable existing file is logged and treated as absent,
//! trading that hour's history for availability in this non-authoritative
//! derived store.

use crate::error::Result;
use crate::transform::{OrderDocument, OrderItem};
use arrow::array::{
    ArrayRef, Float64Builder, Int32Builder, Int64Builder, ListBuilder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one file-store write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreSummary {
    /// Rows carried over from the hour's existing file
    pub merged_existing: usize,
    /// Distinct rows in the rewritten file pair
    pub rows_written: usize,
}

/// Sink maintaining the hour-partitioned Parquet/JSON warehouse
#[derive(Debug, Clone)]
pub struct FileStoreSink {
    root: PathBuf,
}

impl FileStoreSink {
    /// Create a sink rooted at `root`; directories are created on write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Merge `documents` into the file pair for the hour containing
    /// `run_time` and rewrite both encodings.
    pub fn write_batch(
        &self,
        documents: &[OrderDocument],
        run_time: DateTime<Utc>,
    ) -> Result<FileStoreSummary> {
        let dir = self.partition_dir(run_time);
        std::fs::create_dir_all(&dir)?;

        let stem = format!("orders_{}", run_time.format("%Y%m%d_%H"));
        let json_path = dir.join(format!("{stem}.json"));
        let parquet_path = dir.join(format!("{stem}.parquet"));

        let existing = read_existing(&json_path);
        let merged_existing = existing.len();
        let merged = merge_documents(existing, documents.to_vec());

        write_json(&json_path, &merged)?;
        write_parquet(&parquet_path, &merged)?;

        info!(
            rows = merged.len(),
            merged_existing,
            new = documents.len(),
            file = %json_path.display(),
            "Rewrote hourly warehouse files"
        );

        Ok(FileStoreSummary {
            merged_existing,
            rows_written: merged.len(),
        })
    }

    /// Partition directory for the calendar day of `run_time`
    pub fn partition_dir(&self, run_time: DateTime<Utc>) -> PathBuf {
        self.root
            .join(format!("year={}", run_time.format("%Y")))
            .join(format!("month={}", run_time.format("%m")))
            .join(format!("day={}", run_time.format("%d")))
    }
}

/// Load the hour's current rows; a missing file is an empty set and an
/// unreadable one (corruption, partial write from a crash) is logged and
/// treated the same way.
fn read_existing(json_path: &Path) -> Vec<OrderDocument> {
    if !json_path.exists() {
        return Vec::new();
    }

    let content = match std::fs::read_to_string(json_path) {
        Ok(content) => content,
        Err(err) => {
            warn!(file = %json_path.display(), error = %err,
                "Could not read existing hourly file, overwriting with new batch only");
            return Vec::new();
        },
    };

    match serde_json::from_str(&content) {
        Ok(documents) => documents,
        Err(err) => {
            warn!(file = %json_path.display(), error = %err,
                "Existing hourly file is corrupt, overwriting with new batch only");
            Vec::new()
        },
    }
}

/// Dedup by `order_id`, newest occurrence winning: existing rows first, then
/// the new batch in emission order. Output is sorted by `order_id`, so the
/// same merged state always produces the same file bytes.
fn merge_documents(
    existing: Vec<OrderDocument>,
    new: Vec<OrderDocument>,
) -> Vec<OrderDocument> {
    let mut by_id: BTreeMap<i32, OrderDocument> = BTreeMap::new();
    for document in existing.into_iter().chain(new) {
        by_id.insert(document.order_id, document);
    }
    by_id.into_values().collect()
}

fn write_json(path: &Path, documents: &[OrderDocument]) -> Result<()> {
    let content = serde_json::to_string(documents)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Encode the merged rows as one Parquet row group. Scalar columns are
/// typed; `items` is carried as its JSON encoding since the warehouse
/// readers explode it downstream.
fn write_parquet(path: &Path, documents: &[OrderDocument]) -> Result<()> {
    let mut order_id = Int32Builder::new();
    let mut user_id = Int32Builder::new();
    let mut user_name = StringBuilder::new();
    let mut user_email = StringBuilder::new();
    let mut order_date = TimestampMicrosecondBuilder::new();
    let mut status = StringBuilder::new();
    let mut total_amount = Float64Builder::new();
    let mut shipping_address = StringBuilder::new();
    let mut payment_method = StringBuilder::new();
    let mut created_at = TimestampMicrosecondBuilder::new();
    let mut updated_at = TimestampMicrosecondBuilder::new();
    let mut items = StringBuilder::new();
    let mut items_count = Int32Builder::new();
    let mut total_quantity = Int64Builder::new();
    let mut categories = ListBuilder::new(StringBuilder::new());
    let mut brands = ListBuilder::new(StringBuilder::new());
    let mut etl_timestamp = TimestampMicrosecondBuilder::new();
    let mut etl_source = StringBuilder::new();

    for document in documents {
        order_id.append_value(document.order_id);
        user_id.append_value(document.user_id);
        user_name.append_value(&document.user_name);
        user_email.append_value(&document.user_email);
        order_date.append_value(document.order_date.and_utc().timestamp_micros());
        status.append_value(&document.status);
        total_amount.append_value(document.total_amount);
        shipping_address.append_value(&document.shipping_address);
        payment_method.append_value(&document.payment_method);
        created_at.append_value(document.created_at.and_utc().timestamp_micros());
        updated_at.append_option(
            document
                .updated_at
                .map(|ts| ts.and_utc().timestamp_micros()),
        );
        items.append_value(items_json(&document.items)?);
        items_count.append_value(document.items_count);
        total_quantity.append_value(document.total_quantity);
        for category in &document.categories {
            categories.values().append_value(category);
        }
        categories.append(true);
        for brand in &document.brands {
            brands.values().append_value(brand);
        }
        brands.append(true);
        etl_timestamp.append_value(document.etl_timestamp.timestamp_micros());
        etl_source.append_value(&document.etl_source);
    }

    let batch = RecordBatch::try_from_iter(vec![
        ("order_id", Arc::new(order_id.finish()) as ArrayRef),
        ("user_id", Arc::new(user_id.finish()) as ArrayRef),
        ("user_name", Arc::new(user_name.finish()) as ArrayRef),
        ("user_email", Arc::new(user_email.finish()) as ArrayRef),
        ("order_date", Arc::new(order_date.finish()) as ArrayRef),
        ("status", Arc::new(status.finish()) as ArrayRef),
        ("total_amount", Arc::new(total_amount.finish()) as ArrayRef),
        (
            "shipping_address",
            Arc::new(shipping_address.finish()) as ArrayRef,
        ),
        (
            "payment_method",
            Arc::new(payment_method.finish()) as ArrayRef,
        ),
        ("created_at", Arc::new(created_at.finish()) as ArrayRef),
        ("updated_at", Arc::new(updated_at.finish()) as ArrayRef),
        ("items", Arc::new(items.finish()) as ArrayRef),
        ("items_count", Arc::new(items_count.finish()) as ArrayRef),
        (
            "total_quantity",
            Arc::new(total_quantity.finish()) as ArrayRef,
        ),
        ("categories", Arc::new(categories.finish()) as ArrayRef),
        ("brands", Arc::new(brands.finish()) as ArrayRef),
        (
            "etl_timestamp",
            Arc::new(etl_timestamp.finish()) as ArrayRef,
        ),
        ("etl_source", Arc::new(etl_source.finish()) as ArrayRef),
    ])?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn items_json(items: &[OrderItem]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

#[cfg(test)]
pub(crate) mod tests_support {
    use crate::transform::{OrderDocument, OrderItem, ETL_SOURCE};
    use chrono::{NaiveDate, Utc};

    /// Build order documents from `(order_id, status)` pairs, with one line
    /// item each and fixed business timestamps
    #[allow(clippy::unwrap_used)]
    pub fn sample_documents(orders: &[(i32, &str)]) -> Vec<OrderDocument> {
        orders
            .iter()
            .map(|&(order_id, status)| {
                let placed = NaiveDate::from_ymd_opt(2026, 8, 20)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap();
                OrderDocument {
                    order_id,
                    user_id: 7,
                    user_name: "Mina Park".to_string(),
                    user_email: "mina@example.com".to_string(),
                    order_date: placed,
                    status: status.to_string(),
                    total_amount: 90.0,
                    shipping_address: "12 Harbor Way".to_string(),
                    payment_method: "credit_card".to_string(),
                    created_at: placed,
                    updated_at: None,
                    items: vec![OrderItem {
                        product_id: 11,
                        product_name: "Trail Shoe".to_string(),
                        category: "Footwear".to_string(),
                        brand: "Acme".to_string(),
                        quantity: 2,
                        unit_price: 45.0,
                        total_price: 90.0,
                    }],
                    items_count: 1,
                    total_quantity: 2,
                    categories: vec!["Footwear".to_string()],
                    brands: vec!["Acme".to_string()],
                    etl_timestamp: Utc::now(),
                    etl_source: ETL_SOURCE.to_string(),
                }
            })
            .collect()
    }
}
