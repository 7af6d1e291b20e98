//! "URL hacking" fragment keys.
//!
//! People shorten references by chopping segments off the end of a slashed
//! component: `CP 25/155/2HENVIIIEASTER` becomes `CP 25/155` or `CP 25`.
//! Those truncated forms should still lead somewhere, so every record also
//! carries the keys of its truncated variants as `also_matches`. They are a
//! weaker signal than `matches` and never overlap with them.

use std::collections::BTreeSet;

use crate::keys::generate_keys;
use crate::path::{Level, Path};

/// Levels whose values may contain slashes.
pub const FRAGMENT_LEVELS: [Level; 3] = [Level::Series, Level::Piece, Level::Item];

/// Every non-empty prefix of a slash-delimited value, shortest first.
///
/// `"A/B/C"` yields `["A", "A/B", "A/B/C"]`. A value without a slash yields
/// nothing.
pub fn slash_prefixes(value: &str) -> Vec<String> {
    if !value.contains('/') {
        return Vec::new();
    }
    let parts: Vec<&str> = value.split('/').collect();
    (1..=parts.len()).map(|n| parts[..n].join("/")).collect()
}

/// Keys reachable by truncating the record's own slashed reference, minus
/// anything already in `matches`.
///
/// Only records sitting at Series, Piece or Item are fragmented, and only
/// their own value is cut: a Piece under series `25/2` inherits no `CP 25`
/// keys from its parent. Each truncated value is substituted into a copy of
/// the path and run back through [`generate_keys`] at the same level, so every
/// fragment is a canonical key for that shortened path.
pub fn fragment_keys(path: &Path, matches: &BTreeSet<String>) -> BTreeSet<String> {
    let level = path.level();
    let mut keys = BTreeSet::new();
    if !FRAGMENT_LEVELS.contains(&level) {
        return keys;
    }
    let Some(value) = path.value(level) else {
        return keys;
    };
    for prefix in slash_prefixes(&value) {
        if let Some(truncated) = path.with_reference(level, &prefix) {
            keys.extend(generate_keys(&truncated, level).matches);
        }
    }
    keys.retain(|k| !matches.contains(k));
    keys
}
