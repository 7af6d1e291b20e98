//! Elasticsearch-compatible [`SearchIndex`] over its REST API.
//!
//! Every request goes through [`ElasticIndex::send`], which retries with
//! exponential backoff:
//! - transport error → retry
//! - HTTP 429 or 5xx → retry
//! - any other status → returned to the caller

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{BulkFailure, BulkReport, MatchLookup, RefreshInterval, SearchIndex, LOOKUP_EXCLUDES};
use crate::config::IndexConfig;
use crate::models::Record;

/// Upper bound on documents returned per lookup category.
const LOOKUP_SIZE: usize = 100;

pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    name: String,
    retry_on_conflict: u32,
    max_retries: u32,
}

impl ElasticIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Self::with_target(config, &config.url, &config.name)
    }

    /// Like [`new`](Self::new) but pointed at another service or index.
    pub fn with_target(config: &IndexConfig, url: &str, name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build index HTTP client")?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            name: name.to_string(),
            retry_on_conflict: config.retry_on_conflict,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path.trim_start_matches('/')))
    }

    async fn send<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 1s, 2s, 4s, ... capped at 32s
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(what, attempt, ?delay, "retrying index request");
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        warn!(what, %status, "index request rejected, will retry");
                        last_err = Some(anyhow::anyhow!("{} failed: {} {}", what, status, body));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_err = Some(anyhow::Error::new(e).context(format!("{} failed", what)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", what)))
    }

    async fn send_ok<F>(&self, what: &str, build: F) -> Result<Value>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.send(what, build).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} failed: {} {}", what, status, body);
        }
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("{}: invalid JSON response", what))
    }

    async fn search_term(&self, field: &str, key: &str, sort_by_id: bool) -> Result<Vec<Value>> {
        let mut body = json!({
            "size": LOOKUP_SIZE,
            "query": { "term": { field: key } },
            "_source": { "excludes": LOOKUP_EXCLUDES },
        });
        if sort_by_id {
            body["sort"] = json!([{ "id.keyword": "asc" }]);
        }
        let path = format!("{}/_search", self.name);
        let response = self
            .send_ok("search", || self.request(Method::POST, &path).json(&body))
            .await?;
        Ok(search_sources(&response))
    }
}

/// NDJSON `_bulk` payload of `update` actions with upsert semantics.
pub fn bulk_body(index: &str, records: &[Record], retry_on_conflict: u32) -> Result<String> {
    let mut body = String::new();
    for record in records {
        let action = json!({
            "update": {
                "_index": index,
                "_id": record.id,
                "retry_on_conflict": retry_on_conflict,
            }
        });
        let doc = json!({ "doc": record, "doc_as_upsert": true });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc)?);
        body.push('\n');
    }
    Ok(body)
}

/// Count successes and collect per-item failures from a `_bulk` response.
pub fn parse_bulk_response(response: &Value) -> BulkReport {
    let mut report = BulkReport::default();
    let items = response
        .get("items")
        .and_then(|i| i.as_array())
        .map(|a| a.as_slice())
        .unwrap_or_default();

    for item in items {
        // Each item is keyed by its action name.
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        match result.get("error") {
            None => report.succeeded += 1,
            Some(error) => {
                report.failed += 1;
                let reason = error
                    .get("reason")
                    .or_else(|| error.get("type"))
                    .and_then(|r| r.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                report.failures.push(BulkFailure {
                    id: result
                        .get("_id")
                        .and_then(|i| i.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    status: result
                        .get("status")
                        .and_then(|s| s.as_u64())
                        .unwrap_or_default() as u16,
                    reason,
                });
            }
        }
    }
    report
}

fn search_sources(response: &Value) -> Vec<Value> {
    response
        .pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_source").cloned())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<bool> {
        match self.request(Method::HEAD, "/").send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                debug!(error = %e, url = %self.base_url, "index ping failed");
                Ok(false)
            }
        }
    }

    async fn exists(&self) -> Result<bool> {
        let response = self
            .send("index exists", || self.request(Method::HEAD, &self.name))
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("index exists check for '{}' returned {}", self.name, status),
        }
    }

    async fn create(&self, body: &Value) -> Result<()> {
        self.send_ok("create index", || {
            self.request(Method::PUT, &self.name).json(body)
        })
        .await?;
        Ok(())
    }

    async fn set_refresh_interval(&self, interval: RefreshInterval) -> Result<()> {
        let body = json!({ "index": { "refresh_interval": interval.as_setting() } });
        let path = format!("{}/_settings", self.name);
        self.send_ok("update settings", || {
            self.request(Method::PUT, &path).json(&body)
        })
        .await?;
        Ok(())
    }

    async fn bulk_upsert(&self, records: &[Record]) -> Result<BulkReport> {
        if records.is_empty() {
            return Ok(BulkReport::default());
        }
        let body = bulk_body(&self.name, records, self.retry_on_conflict)?;
        let response = self
            .send_ok("bulk", || {
                self.request(Method::POST, "_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
            })
            .await?;
        Ok(parse_bulk_response(&response))
    }

    async fn find_matches(&self, key: &str) -> Result<MatchLookup> {
        let canonical = self.search_term("matches.keyword", key, false).await?;
        let also_matches = self.search_term("also_matches.keyword", key, true).await?;
        Ok(MatchLookup {
            canonical,
            also_matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Canonicalizer;
    use crate::models::CatalogueRow;
    use crate::reference::ReferenceData;
    use std::sync::Arc;

    fn record() -> Record {
        Canonicalizer::new(Arc::new(ReferenceData::default())).canonicalize(
            CatalogueRow {
                letter_code: "AB".to_string(),
                class_no: Some(7),
                ..CatalogueRow::default()
            },
            None,
        )
    }

    #[test]
    fn bulk_body_is_ndjson_update_pairs() {
        let body = bulk_body("resolver", &[record()], 5).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(body.ends_with('\n'));

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["update"]["_id"], "AB:7");
        assert_eq!(action["update"]["_index"], "resolver");
        assert_eq!(action["update"]["retry_on_conflict"], 5);

        let doc: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc["doc_as_upsert"], true);
        assert_eq!(doc["doc"]["catalogue_ref"], "AB 7");
    }

    #[test]
    fn bulk_response_collects_failures() {
        let response = json!({
            "errors": true,
            "items": [
                { "update": { "_id": "AB:7", "status": 200, "result": "updated" } },
                { "update": { "_id": "AB:8", "status": 409, "error": {
                    "type": "version_conflict_engine_exception",
                    "reason": "[AB:8]: version conflict"
                } } }
            ]
        });
        let report = parse_bulk_response(&response);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].id, "AB:8");
        assert_eq!(report.failures[0].status, 409);
        assert!(report.failures[0].reason.contains("version conflict"));
    }

    #[test]
    fn hits_to_sources() {
        let response = json!({
            "hits": { "hits": [ { "_id": "AB", "_source": { "id": "AB" } } ] }
        });
        assert_eq!(search_sources(&response), vec![json!({ "id": "AB" })]);
        assert!(search_sources(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn ping_unreachable_is_false() {
        let config = IndexConfig {
            url: "http://127.0.0.1:9".to_string(),
            name: "resolver".to_string(),
            chunk_size: 10,
            workers: 1,
            retry_on_conflict: 5,
            refresh_interval: "10s".to_string(),
            timeout_secs: 2,
            max_retries: 0,
        };
        let index = ElasticIndex::new(&config).unwrap();
        assert!(!index.ping().await.unwrap());
        assert!(index.exists().await.is_err());
    }
}
