//! Lettercode volume lookup and the pacing delay derived from it.
//!
//! The pipeline pauses after its two highest-volume levels so the index can
//! catch up on merges. The pause scales with how many records the lettercode
//! holds, as reported by the resolver's own stats endpoint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::PacingConfig;

#[async_trait]
pub trait StatsLookup: Send + Sync {
    /// Total number of records held for `lettercode`.
    async fn volume(&self, lettercode: &str) -> Result<u64>;
}

/// [`StatsLookup`] over an HTTP endpoint returning `{ "<level>": <count>, ... }`.
pub struct HttpStatsLookup {
    client: reqwest::Client,
    url_template: String,
}

impl HttpStatsLookup {
    /// `url_template` contains a `{lettercode}` placeholder.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    fn url_for(&self, lettercode: &str) -> String {
        self.url_template.replace("{lettercode}", lettercode)
    }
}

/// Sum every count in a stats response. Counts may be numbers or numeric strings.
pub fn total_volume(stats: &Value) -> Result<u64> {
    let Some(counts) = stats.as_object() else {
        bail!("stats response is not an object");
    };
    counts.iter().try_fold(0u64, |total, (level, count)| -> Result<u64> {
        let n = match count {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .with_context(|| format!("stats count for '{}' is not a number: {}", level, count))?;
        total
            .checked_add(n)
            .context("stats counts overflow a 64-bit total")
    })
}

#[async_trait]
impl StatsLookup for HttpStatsLookup {
    async fn volume(&self, lettercode: &str) -> Result<u64> {
        let url = self.url_for(lettercode);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("stats lookup {} returned {}", url, status);
        }
        let stats: Value = response.json().await?;
        total_volume(&stats)
    }
}

/// Converts a lettercode's volume into a pause between levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub records_per_second: u64,
    pub default_delay: Duration,
}

impl Pacing {
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            records_per_second: config.records_per_second.max(1),
            default_delay: config.default_delay(),
        }
    }

    /// Whole seconds of `volume / records_per_second`, or the default delay
    /// when the volume is unknown.
    pub fn delay_for(&self, volume: Option<u64>) -> Duration {
        match volume {
            Some(volume) => Duration::from_secs(volume / self.records_per_second.max(1)),
            None => self.default_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sums_numbers_and_numeric_strings() {
        let stats = json!({ "Piece": 250000, "Item": "1200000", "Series": 12 });
        assert_eq!(total_volume(&stats).unwrap(), 1_450_012);
    }

    #[test]
    fn rejects_non_numeric_counts() {
        assert!(total_volume(&json!({ "Piece": "lots" })).is_err());
        assert!(total_volume(&json!([1, 2])).is_err());
    }

    #[test]
    fn overflowing_total_is_an_error() {
        let stats = json!({ "Piece": u64::MAX, "Item": 1 });
        let err = total_volume(&stats).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn delay_scales_with_volume() {
        let pacing = Pacing::new(&PacingConfig::default());
        assert_eq!(pacing.delay_for(Some(1_450_012)), Duration::from_secs(14));
        assert_eq!(pacing.delay_for(Some(99_999)), Duration::ZERO);
        assert_eq!(pacing.delay_for(None), Duration::from_secs(15));
    }

    #[test]
    fn template_substitution() {
        let lookup =
            HttpStatsLookup::new("https://host/idresolver/stats/{lettercode}", Duration::from_secs(1))
                .unwrap();
        assert_eq!(lookup.url_for("ADM"), "https://host/idresolver/stats/ADM");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let lookup =
            HttpStatsLookup::new("http://127.0.0.1:9/stats/{lettercode}", Duration::from_secs(2))
                .unwrap();
        assert!(lookup.volume("ADM").await.is_err());
    }
}
