//! Search index sink
//!
//! Loads order documents into Elasticsearch over its REST API. The index is
//! created once with an explicit mapping (an already-existing index counts
//! as success), then documents go in through `_bulk` with `order_id` as the
//! document id, so re-indexing the same order overwrites rather than
//! duplicates. Per-document failures are logged and counted without
//! aborting the remaining batches.

use crate::error::{EtlError, Result};
use crate::transform::OrderDocument;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

// ============================================================================
// Search Sink Constants
// ============================================================================

/// Documents per `_bulk` request.
pub const BULK_BATCH_SIZE: usize = 1000;

/// Request timeout for index and bulk calls in seconds.
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 60;

/// Error type Elasticsearch reports when the index already exists.
const INDEX_EXISTS_ERROR: &str = "resource_already_exists_exception";

/// Outcome of one bulk load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    /// Documents handed to the sink
    pub attempted: usize,
    /// Documents the index acknowledged
    pub indexed: usize,
}

/// Sink writing order documents to the search index
pub struct SearchIndexSink {
    client: Client,
    base_url: String,
    index: String,
}

impl SearchIndexSink {
    /// Create a sink for `index` at the given Elasticsearch base URL
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: trim_trailing_slash(base_url.into()),
            index: index.into(),
        })
    }

    /// Create the index with its explicit mapping. An index that already
    /// exists (checked by the reported error type, not message text) is
    /// success; any other rejection is an error.
    pub async fn ensure_index(&self) -> Result<()> {
        let url = format!("{}/{}", self.base_url, self.index);
        let response = self
            .client
            .put(&url)
            .json(&order_index_mapping())
            .send()
            .await?;

        if response.status().is_success() {
            info!(index = %self.index, "Created search index");
            return Ok(());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let error_type = body
            .pointer("/error/type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        if error_type == INDEX_EXISTS_ERROR {
            info!(index = %self.index, "Search index already exists");
            return Ok(());
        }

        Err(EtlError::search_rejected(format!(
            "index creation failed: {error_type}"
        )))
    }

    /// Bulk-upsert documents in fixed-size batches, keyed by `order_id`.
    ///
    /// A batch that fails wholesale or partially is logged and skipped; the
    /// remaining batches are still attempted. The summary separates what was
    /// attempted from what the index acknowledged.
    pub async fn bulk_index(&self, documents: &[OrderDocument]) -> Result<IndexSummary> {
        let mut indexed = 0;

        for (batch_no, batch) in documents.chunks(BULK_BATCH_SIZE).enumerate() {
            let body = self.bulk_body(batch)?;

            match self.send_bulk(body).await {
                Ok(response) => {
                    let acknowledged = count_acknowledged(batch_no, batch.len(), &response);
                    indexed += acknowledged;
                    if acknowledged == batch.len() {
                        info!(batch = batch_no + 1, count = batch.len(),
                            "Successfully indexed batch");
                    }
                },
                Err(err) => {
                    error!(batch = batch_no + 1, error = %err, "Bulk indexing failed for batch");
                },
            }
        }

        info!(
            indexed,
            attempted = documents.len(),
            "Finished loading search index"
        );

        Ok(IndexSummary {
            attempted: documents.len(),
            indexed,
        })
    }

    /// Assemble the NDJSON `_bulk` payload for one batch
    fn bulk_body(&self, batch: &[OrderDocument]) -> Result<String> {
        let mut body = String::new();
        for document in batch {
            let action = json!({ "index": { "_index": self.index, "_id": document.order_id } });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn send_bulk(&self, body: String) -> Result<Value> {
        let url = format!("{}/_bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

/// Count acknowledged items in a bulk response, logging each rejection
fn count_acknowledged(batch_no: usize, batch_len: usize, response: &Value) -> usize {
    let had_errors = response
        .pointer("/errors")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if !had_errors {
        return batch_len;
    }

    let empty = Vec::new();
    let items = response
        .pointer("/items")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut acknowledged = 0;
    for item in items {
        match item.pointer("/index/error") {
            Some(reason) => {
                error!(batch = batch_no + 1, error = %reason, "Document failed to index");
            },
            None => acknowledged += 1,
        }
    }
    acknowledged
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Explicit field mapping for the orders index
fn order_index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "order_id": { "type": "integer" },
                "user_id": { "type": "keyword" },
                "user_name": { "type": "text" },
                "user_email": { "type": "keyword" },
                "order_date": { "type": "date" },
                "status": { "type": "keyword" },
                "total_amount": { "type": "float" },
                "shipping_address": { "type": "text" },
                "payment_method": { "type": "keyword" },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" },
                "items_count": { "type": "integer" },
                "total_quantity": { "type": "integer" },
                "categories": { "type": "keyword" },
                "brands": { "type": "keyword" },
                "etl_timestamp": { "type": "date" },
                "etl_source": { "type": "keyword" },
                "items": {
                    "type": "nested",
                    "properties": {
                        "product_id": { "type": "keyword" },
                        "product_name": { "type": "text" },
                        "category": { "type": "keyword" },
                        "brand": { "type": "keyword" },
                        "quantity": { "type": "integer" },
                        "unit_price": { "type": "float" },
                        "total_price": { "type": "float" }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_body_pairs_action_and_document() {
        let sink = SearchIndexSink::new("http://localhost:9200/", "orders").unwrap();
        let docs = crate::sink::files::tests_support::sample_documents(&[(42, "pending")]);

        let body = sink.bulk_body(&docs).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action.pointer("/index/_id").unwrap(), 42);
        assert_eq!(
            action.pointer("/index/_index").and_then(Value::as_str),
            Some("orders")
        );

        let document: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(document.pointer("/order_id").unwrap(), 42);
        assert_eq!(
            document.pointer("/status").and_then(Value::as_str),
            Some("pending")
        );
    }

    #[test]
    fn test_count_acknowledged_clean_batch() {
        let response = json!({ "errors": false, "items": [] });
        assert_eq!(count_acknowledged(0, 250, &response), 250);
    }

    #[test]
    fn test_count_acknowledged_partial_failure() {
        let response = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 200 } },
                { "index": { "_id": "2", "status": 400,
                    "error": { "type": "mapper_parsing_exception" } } },
                { "index": { "_id": "3", "status": 201 } }
            ]
        });
        assert_eq!(count_acknowledged(0, 3, &response), 2);
    }

    #[test]
    fn test_mapping_covers_every_document_field() {
        let mapping = order_index_mapping();
        let docs = crate::sink::files::tests_support::sample_documents(&[(1, "pending")]);
        let document = serde_json::to_value(&docs[0]).unwrap();

        let properties = mapping
            .pointer("/mappings/properties")
            .and_then(Value::as_object)
            .unwrap();
        for field in document.as_object().unwrap().keys() {
            assert!(properties.contains_key(field), "unmapped field {field}");
        }
    }
}
