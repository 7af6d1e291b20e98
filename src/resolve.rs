//! Reference lookup against the index.

use anyhow::{bail, Result};
use tracing::debug;

use crate::config::Config;
use crate::index::{ElasticIndex, MatchLookup, SearchIndex};

/// Look up a reference string, returning `None` when nothing matches.
///
/// The reference is trimmed but otherwise used verbatim: keys are exact terms,
/// so `ADM 1/12`, `ADM/1/12` and `ADM:1:12` are each looked up as given.
pub async fn resolve(index: &dyn SearchIndex, reference: &str) -> Result<Option<MatchLookup>> {
    let key = reference.trim();
    if key.is_empty() {
        bail!("reference must not be empty");
    }
    let lookup = index.find_matches(key).await?;
    debug!(
        key,
        canonical = lookup.canonical.len(),
        also_matches = lookup.also_matches.len(),
        "resolved"
    );
    Ok((!lookup.is_empty()).then_some(lookup))
}

/// Run the `resolve` command against the configured index.
pub async fn run_resolve(config: &Config, reference: &str) -> Result<()> {
    let index = ElasticIndex::new(&config.index)?;
    match resolve(&index, reference).await? {
        Some(lookup) => println!("{}", serde_json::to_string_pretty(&lookup)?),
        None => println!("No match for '{}'.", reference.trim()),
    }
    Ok(())
}
