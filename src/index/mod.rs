//! Search index abstraction.
//!
//! The pipeline talks to the index through [`SearchIndex`]. Two
//! implementations ship with the crate:
//!
//! | Type | Backend |
//! |------|---------|
//! | [`ElasticIndex`] | Elasticsearch-compatible REST API over `reqwest` |
//! | [`MemoryIndex`] | In-process map, used by tests and dry tooling |

mod elastic;
mod memory;

pub use elastic::ElasticIndex;
pub use memory::MemoryIndex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::models::Record;

/// Index refresh setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshInterval {
    /// Refresh switched off (`"-1"`), used while bulk writes are running.
    Disabled,
    /// A normal interval such as `"10s"`.
    Interval(String),
}

impl RefreshInterval {
    pub fn as_setting(&self) -> &str {
        match self {
            RefreshInterval::Disabled => "-1",
            RefreshInterval::Interval(interval) => interval,
        }
    }
}

/// One document the index refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

/// Outcome of one bulk request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub succeeded: u64,
    pub failed: u64,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn merge(&mut self, other: BulkReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }
}

/// Documents found for a reference string.
///
/// `canonical` holds documents listing the key in `matches`; `also_matches`
/// holds documents reached only through a fragment key, sorted by `id`.
/// Key lists are stripped from both.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchLookup {
    pub canonical: Vec<Value>,
    pub also_matches: Vec<Value>,
}

impl MatchLookup {
    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty() && self.also_matches.is_empty()
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Target index name.
    fn name(&self) -> &str;

    /// Check that the index service answers.
    async fn ping(&self) -> Result<bool>;

    async fn exists(&self) -> Result<bool>;

    /// Create the index with `body` (settings and mappings).
    async fn create(&self, body: &Value) -> Result<()>;

    async fn set_refresh_interval(&self, interval: RefreshInterval) -> Result<()>;

    /// Upsert every record by `id`, merging into any stored document.
    ///
    /// Rejected documents are reported, not returned as errors.
    async fn bulk_upsert(&self, records: &[Record]) -> Result<BulkReport>;

    /// Exact-term lookup of `key` against `matches` and `also_matches`.
    async fn find_matches(&self, key: &str) -> Result<MatchLookup>;
}

/// Fields removed from documents returned by [`SearchIndex::find_matches`].
pub(crate) const LOOKUP_EXCLUDES: [&str; 2] = ["matches", "also_matches"];
