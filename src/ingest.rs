//! Bulk ingest pipeline.
//!
//! One controlling task walks the selected lettercodes in order and, for each,
//! the hierarchy levels in [`LEVEL_ORDER`]. Rows are fetched a page at a time,
//! canonicalized, and written to the index in chunks with bounded
//! parallelism. Everything else (settings changes, pacing, progress) happens
//! sequentially on the controlling task.
//!
//! Live runs keep index refresh switched off while a level is being written
//! and restore the normal interval after it. The two highest-volume levels are
//! followed by a pause sized from the lettercode's volume. The normal interval
//! is restored once more when the run ends, whether it completed, was
//! cancelled, or failed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::canonical::Canonicalizer;
use crate::config::Config;
use crate::db;
use crate::index::{BulkReport, ElasticIndex, RefreshInterval, SearchIndex};
use crate::mappings::create_index_body;
use crate::models::{CatalogueRow, Lettercode, Record};
use crate::path::Level;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};
use crate::reference::{load_reference_data, load_taxonomy_shard, ReferenceData, TaxonomyShard};
use crate::source::{CatalogueSource, SqliteSource};
use crate::stats::{HttpStatsLookup, Pacing, StatsLookup};

/// Levels in processing order. Department records are synthesised last.
pub const LEVEL_ORDER: [Level; 7] = [
    Level::Piece,
    Level::Division,
    Level::Subseries,
    Level::Subsubseries,
    Level::Item,
    Level::Series,
    Level::Department,
];

/// Levels followed by a pacing pause.
pub const PACED_LEVELS: [Level; 2] = [Level::Piece, Level::Item];

/// Which lettercodes a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LettercodeSelection {
    Single { lettercode: String },
    /// Inclusive range over the sorted lettercode list.
    Range { start: String, end: String },
    All,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl LettercodeSelection {
    /// Build a selection from optional request parameters. An explicit
    /// lettercode wins over a range; no parameters select everything.
    pub fn from_params(
        lettercode: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Self> {
        if let Some(code) = non_empty(lettercode) {
            return Ok(Self::Single {
                lettercode: code.to_string(),
            });
        }
        match (non_empty(start), non_empty(end)) {
            (Some(start), Some(end)) => Ok(Self::Range {
                start: start.to_string(),
                end: end.to_string(),
            }),
            (None, None) => Ok(Self::All),
            _ => bail!("a lettercode range needs both start and end"),
        }
    }

    /// Apply the selection to `known`, which must be sorted by code.
    pub fn select(&self, known: &[Lettercode]) -> Result<Vec<Lettercode>> {
        match self {
            Self::Single { lettercode } => Ok(known
                .iter()
                .filter(|l| &l.code == lettercode)
                .cloned()
                .collect()),
            Self::Range { start, end } => {
                let position = |code: &str| {
                    known
                        .iter()
                        .position(|l| l.code == code)
                        .with_context(|| format!("unknown lettercode '{}'", code))
                };
                let (from, to) = (position(start)?, position(end)?);
                if from > to {
                    return Ok(Vec::new());
                }
                Ok(known[from..=to].to_vec())
            }
            Self::All => Ok(known.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub selection: LettercodeSelection,
    /// `false` canonicalizes and counts without touching the index.
    pub live: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Lettercodes whose every level completed.
    pub lettercodes: Vec<String>,
    pub documents: u64,
    pub failed: u64,
    pub cancelled: bool,
    pub live: bool,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub page_size: u64,
    pub chunk_size: usize,
    pub workers: usize,
    /// Refresh interval restored after each level.
    pub refresh_interval: String,
    pub taxonomy_dir: Option<PathBuf>,
    pub pacing: Pacing,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.source.page_size,
            chunk_size: config.index.chunk_size,
            workers: config.index.workers,
            refresh_interval: config.index.refresh_interval.clone(),
            taxonomy_dir: config.reference.taxonomy_dir.clone(),
            pacing: Pacing::new(&config.pacing),
        }
    }
}

/// HTTP stats lookup when `pacing.stats_url` is configured.
pub fn stats_lookup(config: &Config) -> Result<Option<Arc<dyn StatsLookup>>> {
    let Some(url) = &config.pacing.stats_url else {
        return Ok(None);
    };
    let lookup = HttpStatsLookup::new(
        url.clone(),
        Duration::from_secs(config.reference.timeout_secs),
    )?;
    Ok(Some(Arc::new(lookup)))
}

pub struct IngestPipeline {
    source: Arc<dyn CatalogueSource>,
    index: Arc<dyn SearchIndex>,
    canonicalizer: Canonicalizer,
    stats: Option<Arc<dyn StatsLookup>>,
    settings: IngestSettings,
}

impl IngestPipeline {
    pub fn new(
        source: Arc<dyn CatalogueSource>,
        index: Arc<dyn SearchIndex>,
        canonicalizer: Canonicalizer,
        stats: Option<Arc<dyn StatsLookup>>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            index,
            canonicalizer,
            stats,
            settings,
        }
    }

    /// Wire a pipeline from configuration: SQLite source, HTTP stats lookup
    /// when `pacing.stats_url` is set.
    pub async fn from_config(
        config: &Config,
        reference: Arc<ReferenceData>,
        index: Arc<dyn SearchIndex>,
    ) -> Result<Self> {
        let pool = db::connect(&config.source).await?;
        Ok(Self::new(
            Arc::new(SqliteSource::new(pool)),
            index,
            Canonicalizer::new(reference),
            stats_lookup(config)?,
            IngestSettings::from_config(config),
        ))
    }

    pub fn source(&self) -> &Arc<dyn CatalogueSource> {
        &self.source
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    fn normal_refresh(&self) -> RefreshInterval {
        RefreshInterval::Interval(self.settings.refresh_interval.clone())
    }

    pub async fn run(
        &self,
        request: &IngestRequest,
        reporter: &dyn IngestProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<IngestSummary> {
        self.source
            .ping()
            .await
            .context("Catalogue source is unreachable")?;
        if request.live {
            self.prepare_index().await?;
        }

        let known = self
            .source
            .lettercodes()
            .await
            .context("Failed to list lettercodes")?;
        let selected = request.selection.select(&known)?;
        info!(
            selected = selected.len(),
            known = known.len(),
            live = request.live,
            "lettercodes selected"
        );
        reporter.report(IngestProgressEvent::Selected {
            lettercodes: selected.iter().map(|l| l.code.clone()).collect(),
            live: request.live,
        });

        let mut summary = IngestSummary {
            live: request.live,
            ..IngestSummary::default()
        };
        let outcome = self
            .ingest_selected(&selected, request.live, reporter, cancel, &mut summary)
            .await;

        if request.live {
            let restored = self.index.set_refresh_interval(self.normal_refresh()).await;
            match (&outcome, restored) {
                (Ok(()), Err(e)) => return Err(e.context("Failed to restore index refresh")),
                (Err(_), Err(e)) => {
                    warn!(error = %e, index = self.index.name(), "refresh not restored after failed run")
                }
                _ => {}
            }
        }
        outcome?;

        reporter.report(IngestProgressEvent::Finished {
            lettercodes: summary.lettercodes.len(),
            documents: summary.documents,
            failed: summary.failed,
            cancelled: summary.cancelled,
        });
        info!(
            lettercodes = summary.lettercodes.len(),
            documents = summary.documents,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "ingest finished"
        );
        Ok(summary)
    }

    async fn prepare_index(&self) -> Result<()> {
        if !self.index.ping().await? {
            bail!("Search index is unreachable");
        }
        if !self.index.exists().await? {
            info!(index = self.index.name(), "creating index");
            self.index
                .create(&create_index_body())
                .await
                .with_context(|| format!("Failed to create index '{}'", self.index.name()))?;
        }
        Ok(())
    }

    async fn ingest_selected(
        &self,
        selected: &[Lettercode],
        live: bool,
        reporter: &dyn IngestProgressReporter,
        cancel: &CancellationToken,
        summary: &mut IngestSummary,
    ) -> Result<()> {
        'lettercodes: for lettercode in selected {
            let code = lettercode.code.as_str();
            let taxonomy =
                load_taxonomy_shard(self.settings.taxonomy_dir.as_deref(), code).await?;
            let pause = if live {
                self.pacing_delay(code).await
            } else {
                Duration::ZERO
            };
            info!(lettercode = code, pause_secs = pause.as_secs(), "ingesting lettercode");

            for level in LEVEL_ORDER {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break 'lettercodes;
                }
                reporter.report(IngestProgressEvent::LevelStarted {
                    lettercode: code.to_string(),
                    level,
                });

                if live {
                    self.index
                        .set_refresh_interval(RefreshInterval::Disabled)
                        .await
                        .context("Failed to disable index refresh")?;
                }
                let (documents, failed) = self
                    .ingest_level(lettercode, level, taxonomy.as_ref(), live)
                    .await?;
                summary.documents += documents;
                summary.failed += failed;
                reporter.report(IngestProgressEvent::LevelFinished {
                    lettercode: code.to_string(),
                    level,
                    documents,
                    failed,
                });

                if !live {
                    continue;
                }
                self.index
                    .set_refresh_interval(self.normal_refresh())
                    .await
                    .context("Failed to restore index refresh")?;

                if PACED_LEVELS.contains(&level) && !pause.is_zero() {
                    reporter.report(IngestProgressEvent::Pausing {
                        lettercode: code.to_string(),
                        level,
                        seconds: pause.as_secs(),
                    });
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = cancel.cancelled() => {
                            summary.cancelled = true;
                            break 'lettercodes;
                        }
                    }
                }
            }
            summary.lettercodes.push(code.to_string());
        }
        Ok(())
    }

    async fn pacing_delay(&self, lettercode: &str) -> Duration {
        let volume = match &self.stats {
            Some(stats) => match stats.volume(lettercode).await {
                Ok(volume) => Some(volume),
                Err(e) => {
                    warn!(lettercode, error = %e, "stats lookup failed, using default pause");
                    None
                }
            },
            None => None,
        };
        self.settings.pacing.delay_for(volume)
    }

    /// Fetch, canonicalize and (when live) write one level of one lettercode.
    /// Returns documents canonicalized and documents the index refused.
    async fn ingest_level(
        &self,
        lettercode: &Lettercode,
        level: Level,
        taxonomy: Option<&TaxonomyShard>,
        live: bool,
    ) -> Result<(u64, u64)> {
        if level == Level::Department {
            let row = CatalogueRow::department(lettercode.code.clone(), lettercode.title.clone());
            let records = vec![self.canonicalizer.canonicalize(row, taxonomy)];
            let failed = if live { self.write(&records).await?.failed } else { 0 };
            return Ok((1, failed));
        }

        let page_size = self.settings.page_size.max(1);
        let mut offset = 0u64;
        let mut documents = 0u64;
        let mut failed = 0u64;

        loop {
            let rows = self
                .source
                .fetch_page(level, &lettercode.code, offset, page_size)
                .await
                .with_context(|| {
                    format!("Failed to fetch {} rows for {}", level, lettercode.code)
                })?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                break;
            }

            let records: Vec<Record> = rows
                .into_iter()
                .map(|row| self.canonicalizer.canonicalize(row, taxonomy))
                .collect();
            documents += fetched;
            if live {
                failed += self.write(&records).await?.failed;
            }
            debug!(lettercode = %lettercode.code, %level, offset, fetched, "page done");

            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        info!(lettercode = %lettercode.code, %level, documents, failed, "level done");
        Ok((documents, failed))
    }

    /// Upsert `records` in chunks, up to `workers` bulk requests at a time.
    async fn write(&self, records: &[Record]) -> Result<BulkReport> {
        // Owned chunks: the run future must stay `Send` to be spawned.
        let chunks: Vec<Vec<Record>> = records
            .chunks(self.settings.chunk_size.max(1))
            .map(<[Record]>::to_vec)
            .collect();
        let reports: Vec<BulkReport> = stream::iter(chunks)
            .map(|chunk| {
                let index = Arc::clone(&self.index);
                async move { index.bulk_upsert(&chunk).await }
            })
            .buffer_unordered(self.settings.workers.max(1))
            .try_collect()
            .await
            .context("Bulk write failed")?;

        let mut total = BulkReport::default();
        for report in reports {
            total.merge(report);
        }
        for failure in &total.failures {
            warn!(
                id = %failure.id,
                status = failure.status,
                reason = %failure.reason,
                "document rejected by index"
            );
        }
        Ok(total)
    }
}

/// Run the `ingest` command: load reference data, run the pipeline, print a summary.
pub async fn run_ingest(
    config: &Config,
    request: IngestRequest,
    progress: ProgressMode,
    cancel: CancellationToken,
) -> Result<()> {
    let reference = Arc::new(load_reference_data(&config.reference).await?);
    let index: Arc<dyn SearchIndex> = Arc::new(ElasticIndex::new(&config.index)?);
    let pipeline = IngestPipeline::from_config(config, reference, index).await?;

    let reporter = progress.reporter();
    let summary = pipeline.run(&request, reporter.as_ref(), &cancel).await?;

    if summary.live {
        println!("ingest {}", config.index.name);
    } else {
        println!("ingest {} (dry-run)", config.index.name);
    }
    println!("  lettercodes: {}", summary.lettercodes.len());
    println!("  documents: {}", summary.documents);
    if summary.live {
        println!("  failed: {}", summary.failed);
    }
    if summary.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
    Ok(())
}
