//! In-memory [`SearchIndex`] for tests and local tooling.
//!
//! Documents are JSON objects in a `HashMap` behind `std::sync::RwLock`.
//! Upserts merge top-level fields the way `doc_as_upsert` does; lookups are
//! exact matches against the `matches` and `also_matches` arrays.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{BulkFailure, BulkReport, MatchLookup, RefreshInterval, SearchIndex, LOOKUP_EXCLUDES};
use crate::models::Record;

pub struct MemoryIndex {
    name: String,
    reachable: AtomicBool,
    created_with: RwLock<Option<Value>>,
    docs: RwLock<HashMap<String, Map<String, Value>>>,
    refresh_history: RwLock<Vec<RefreshInterval>>,
    rejected: HashSet<String>,
}

fn poisoned<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow!("memory index lock poisoned")
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reachable: AtomicBool::new(true),
            created_with: RwLock::new(None),
            docs: RwLock::new(HashMap::new()),
            refresh_history: RwLock::new(Vec::new()),
            rejected: HashSet::new(),
        }
    }

    /// Refuse upserts of these document ids, as a conflicting writer would.
    pub fn with_rejected<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Make [`ping`](SearchIndex::ping) report the service as down.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        let docs = self.docs.read().ok()?;
        docs.get(id).cloned().map(Value::Object)
    }

    /// Ids of every stored document, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .docs
            .read()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Body passed to [`create`](SearchIndex::create), if the index was created.
    pub fn created_with(&self) -> Option<Value> {
        self.created_with.read().ok()?.clone()
    }

    /// Every refresh setting applied, in order.
    pub fn refresh_history(&self) -> Vec<RefreshInterval> {
        self.refresh_history
            .read()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn lookup(&self, field: &str, key: &str) -> Result<Vec<Value>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut hits: Vec<&Map<String, Value>> = docs
            .values()
            .filter(|doc| {
                doc.get(field)
                    .and_then(|v| v.as_array())
                    .is_some_and(|keys| keys.iter().any(|k| k.as_str() == Some(key)))
            })
            .collect();
        hits.sort_by(|a, b| {
            let id = |d: &Map<String, Value>| d.get("id").and_then(|v| v.as_str()).map(str::to_string);
            id(a).cmp(&id(b))
        });
        Ok(hits
            .into_iter()
            .map(|doc| {
                let mut doc = doc.clone();
                for excluded in LOOKUP_EXCLUDES {
                    doc.remove(excluded);
                }
                Value::Object(doc)
            })
            .collect())
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<bool> {
        Ok(self.reachable.load(Ordering::SeqCst))
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.created_with.read().map_err(poisoned)?.is_some())
    }

    async fn create(&self, body: &Value) -> Result<()> {
        let mut created = self.created_with.write().map_err(poisoned)?;
        if created.is_some() {
            anyhow::bail!("index '{}' already exists", self.name);
        }
        *created = Some(body.clone());
        Ok(())
    }

    async fn set_refresh_interval(&self, interval: RefreshInterval) -> Result<()> {
        self.refresh_history
            .write()
            .map_err(poisoned)?
            .push(interval);
        Ok(())
    }

    async fn bulk_upsert(&self, records: &[Record]) -> Result<BulkReport> {
        let mut report = BulkReport::default();
        let mut docs = self.docs.write().map_err(poisoned)?;
        for record in records {
            if self.rejected.contains(&record.id) {
                report.failed += 1;
                report.failures.push(BulkFailure {
                    id: record.id.clone(),
                    status: 409,
                    reason: "version conflict".to_string(),
                });
                continue;
            }
            let Value::Object(fields) = serde_json::to_value(record)? else {
                anyhow::bail!("record {} did not serialize to an object", record.id);
            };
            docs.entry(record.id.clone()).or_default().extend(fields);
            report.succeeded += 1;
        }
        Ok(report)
    }

    async fn find_matches(&self, key: &str) -> Result<MatchLookup> {
        Ok(MatchLookup {
            canonical: self.lookup("matches", key)?,
            also_matches: self.lookup("also_matches", key)?,
        })
    }
}
