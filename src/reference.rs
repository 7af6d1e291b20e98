//! Static reference data: eras, research guides, and taxonomy shards.
//!
//! Eras and guides are loaded once per process and shared read-only. Each
//! dataset is fetched from the static-data service when one is configured and
//! falls back to the local file when the service is unset, unreachable, or
//! answers with a non-success status.
//!
//! Taxonomy shards are different: they are keyed by lettercode and loaded by
//! the ingest pipeline for the lettercode it is working on, then passed
//! explicitly to the canonicalizer.

use std::collections::{BTreeMap, HashMap};
use std::path::Path as FsPath;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReferenceConfig;
use crate::dates::Era;
use crate::guides::{FlattenedGuides, Guide, GuideCatalogue};
use crate::path::Path;

/// Process-wide, read-only reference datasets.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub eras: Vec<Era>,
    pub guides: GuideCatalogue,
}

impl ReferenceData {
    pub fn new(eras: Vec<Era>, guides: GuideCatalogue) -> Self {
        Self { eras, guides }
    }
}

/// Era bounds as published: ISO `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Deserialize)]
pub struct EraBounds {
    pub start_date: String,
    pub end_date: String,
}

/// Convert the published era map into [`Era`]s, sorted by start date.
pub fn parse_eras(raw: BTreeMap<String, EraBounds>) -> Result<Vec<Era>> {
    let mut eras = raw
        .into_iter()
        .map(|(name, bounds)| {
            let start = NaiveDate::parse_from_str(&bounds.start_date, "%Y-%m-%d")
                .with_context(|| format!("era '{}': bad start_date", name))?;
            let end = NaiveDate::parse_from_str(&bounds.end_date, "%Y-%m-%d")
                .with_context(|| format!("era '{}': bad end_date", name))?;
            Ok(Era { name, start, end })
        })
        .collect::<Result<Vec<_>>>()?;
    eras.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));
    Ok(eras)
}

/// Load eras and guides according to `config`.
pub async fn load_reference_data(config: &ReferenceConfig) -> Result<ReferenceData> {
    let client = match &config.base_url {
        Some(_) => Some(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        ),
        None => None,
    };
    let remote = config
        .base_url
        .as_deref()
        .zip(client.as_ref())
        .map(|(base, client)| (base.trim_end_matches('/'), client));

    let raw_eras: BTreeMap<String, EraBounds> =
        fetch_or_read(remote, "eras.json", &config.eras_file).await?;
    let flattened: FlattenedGuides =
        fetch_or_read(remote, "flattened_guides.json", &config.guides_file).await?;
    let integer_map: BTreeMap<u32, Guide> =
        fetch_or_read(remote, "researchguide_map.json", &config.integer_map_file).await?;

    let eras = parse_eras(raw_eras)?;
    let guides = GuideCatalogue::new(flattened, integer_map);
    info!(
        eras = eras.len(),
        guides = guides.len(),
        "reference data loaded"
    );
    Ok(ReferenceData::new(eras, guides))
}

async fn fetch_or_read<T: DeserializeOwned>(
    remote: Option<(&str, &reqwest::Client)>,
    name: &str,
    local: &FsPath,
) -> Result<T> {
    if let Some((base, client)) = remote {
        let url = format!("{}/{}", base, name);
        match fetch_json(client, &url).await {
            Ok(value) => return Ok(value),
            Err(e) => warn!(%url, error = %e, "static data fetch failed, using local file"),
        }
    }
    let content = tokio::fs::read_to_string(local)
        .await
        .with_context(|| format!("Failed to read reference file: {}", local.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse reference file: {}", local.display()))
}

async fn fetch_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("{} returned {}", url, status);
    }
    Ok(response.json().await?)
}

/// Taxonomy annotations for one catalogue reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub iaid: String,
    #[serde(default)]
    pub taxonomy_ids: Vec<serde_json::Value>,
}

/// Taxonomy annotations for every reference in one lettercode shard.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyShard {
    pub name: String,
    entries: HashMap<String, TaxonomyEntry>,
}

impl TaxonomyShard {
    pub fn new(name: impl Into<String>, entries: HashMap<String, TaxonomyEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn get(&self, catalogue_ref: &str) -> Option<&TaxonomyEntry> {
        self.entries.get(catalogue_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load `taxonomy_<shard>.json` for `lettercode` from `dir`.
///
/// No directory, or no file for the shard, means no annotations.
pub async fn load_taxonomy_shard(
    dir: Option<&FsPath>,
    lettercode: &str,
) -> Result<Option<TaxonomyShard>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    let shard = Path::shard(lettercode);
    if shard.is_empty() {
        return Ok(None);
    }
    let file = dir.join(format!("taxonomy_{}.json", shard));
    if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
        debug!(lettercode, file = %file.display(), "no taxonomy shard");
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read taxonomy shard: {}", file.display()))?;
    let entries: HashMap<String, TaxonomyEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse taxonomy shard: {}", file.display()))?;
    Ok(Some(TaxonomyShard::new(shard, entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_reference_files(dir: &FsPath) -> ReferenceConfig {
        fs::write(
            dir.join("eras.json"),
            r#"{
                "tudor": {"start_date": "1485-08-22", "end_date": "1603-03-24"},
                "medieval": {"start_date": "0974-01-01", "end_date": "1485-08-21"}
            }"#,
        )
        .unwrap();
        fs::write(
            dir.join("flattened_guides.json"),
            r#"{"ADM": [{"id": "navy", "title": "Royal Navy"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("researchguide_map.json"),
            r#"{"1": {"id": "navy", "title": "Royal Navy"}}"#,
        )
        .unwrap();
        ReferenceConfig {
            eras_file: dir.join("eras.json"),
            guides_file: dir.join("flattened_guides.json"),
            integer_map_file: dir.join("researchguide_map.json"),
            ..ReferenceConfig::default()
        }
    }

    #[tokio::test]
    async fn loads_local_files() {
        let tmp = TempDir::new().unwrap();
        let config = write_reference_files(tmp.path());

        let data = load_reference_data(&config).await.unwrap();
        let names: Vec<&str> = data.eras.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["medieval", "tudor"]);
        assert_eq!(data.guides.len(), 1);
        assert_eq!(data.guides.guides_for("ADM").len(), 1);
    }

    #[tokio::test]
    async fn unreachable_service_falls_back_to_local() {
        let tmp = TempDir::new().unwrap();
        let mut config = write_reference_files(tmp.path());
        config.base_url = Some("http://127.0.0.1:9".to_string());
        config.timeout_secs = 2;

        let data = load_reference_data(&config).await.unwrap();
        assert_eq!(data.eras.len(), 2);
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let config = ReferenceConfig {
            eras_file: tmp.path().join("absent.json"),
            ..ReferenceConfig::default()
        };
        let err = load_reference_data(&config).await.unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn rejects_bad_era_dates() {
        let raw = BTreeMap::from([(
            "broken".to_string(),
            EraBounds {
                start_date: "1485/08/22".to_string(),
                end_date: "1603-03-24".to_string(),
            },
        )]);
        assert!(parse_eras(raw).is_err());
    }

    #[tokio::test]
    async fn taxonomy_shard_lookup() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("taxonomy_ad.json"),
            r#"{"ADM 1/12": {"iaid": "C123", "taxonomy_ids": [{"code": "C10001"}]}}"#,
        )
        .unwrap();

        let shard = load_taxonomy_shard(Some(tmp.path()), "ADM")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shard.name, "ad");
        assert_eq!(shard.get("ADM 1/12").unwrap().iaid, "C123");

        assert!(load_taxonomy_shard(Some(tmp.path()), "WO")
            .await
            .unwrap()
            .is_none());
        assert!(load_taxonomy_shard(None, "ADM").await.unwrap().is_none());
    }
}
