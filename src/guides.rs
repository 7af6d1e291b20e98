//! Research-guide association.
//!
//! Curated research guides point at catalogue references, whole departments,
//! or `"<department> <series>"` pairs. A record collects the guides attached
//! to each of those keys and publishes them as compact integer IDs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::path::Path;

/// A curated research guide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Guide {
    pub id: String,
    pub title: String,
}

/// Guides keyed by catalogue reference, department code, or department + series.
pub type FlattenedGuides = HashMap<String, Vec<Guide>>;

/// Guide lookup tables: the flattened associations plus the integer map.
#[derive(Debug, Clone, Default)]
pub struct GuideCatalogue {
    flattened: FlattenedGuides,
    integer_map: BTreeMap<u32, Guide>,
    by_guide_id: HashMap<String, u32>,
}

impl GuideCatalogue {
    pub fn new(flattened: FlattenedGuides, integer_map: BTreeMap<u32, Guide>) -> Self {
        let mut by_guide_id = HashMap::new();
        // Ascending key order, so the first integer key for a guide id wins.
        for (key, guide) in &integer_map {
            by_guide_id.entry(guide.id.clone()).or_insert(*key);
        }
        Self {
            flattened,
            integer_map,
            by_guide_id,
        }
    }

    pub fn guides_for(&self, key: &str) -> &[Guide] {
        self.flattened.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn integer_map(&self) -> &BTreeMap<u32, Guide> {
        &self.integer_map
    }

    /// Integer key for a guide, by guide id.
    pub fn key_of(&self, guide: &Guide) -> Option<u32> {
        self.by_guide_id.get(&guide.id).copied()
    }

    fn keys_of<'a>(&self, guides: impl IntoIterator<Item = &'a Guide>) -> Vec<u32> {
        let mut keys: Vec<u32> = guides.into_iter().filter_map(|g| self.key_of(g)).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.integer_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integer_map.is_empty()
    }
}

/// Guides associated with one record, as sorted integer keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchGuides {
    #[serde(rename = "Object")]
    pub object: Vec<u32>,
    #[serde(rename = "Department")]
    pub department: Vec<u32>,
    #[serde(rename = "Series")]
    pub series: Vec<u32>,
    #[serde(rename = "All")]
    pub all: Vec<u32>,
}

/// Collect the guides for a record.
///
/// `Object` looks up the exact catalogue reference, `Department` the bare
/// department code, and `Series` the `"<department> <series>"` string when
/// a series is set. `All` is the union of the three, deduplicated by full
/// guide identity before conversion to keys. The keys are then deduplicated
/// too, so two guides sharing an `id` under different titles give one key.
pub fn identify_guides(
    catalogue: &GuideCatalogue,
    catalogue_ref: Option<&str>,
    path: &Path,
) -> ResearchGuides {
    let object = catalogue_ref
        .map(|r| catalogue.guides_for(r))
        .unwrap_or(&[]);
    let department = catalogue.guides_for(&path.department);
    let series = path
        .series
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| catalogue.guides_for(&format!("{} {}", path.department, s)))
        .unwrap_or(&[]);

    let all: BTreeSet<&Guide> = object.iter().chain(department).chain(series).collect();

    let mut all_keys = catalogue.keys_of(all);
    all_keys.dedup();

    ResearchGuides {
        object: catalogue.keys_of(object),
        department: catalogue.keys_of(department),
        series: catalogue.keys_of(series),
        all: all_keys,
    }
}

/// Nested guide data as published by the research-guide service:
/// `{key: {guides: {id: title}, records: {...}}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NestedGuideNode {
    #[serde(default)]
    pub guides: BTreeMap<String, String>,
    #[serde(default)]
    pub records: BTreeMap<String, NestedGuideNode>,
}

/// Flatten nested guide data into a single key → guides lookup.
pub fn flatten_guides(nested: &BTreeMap<String, NestedGuideNode>) -> FlattenedGuides {
    let mut flat = FlattenedGuides::new();
    flatten_into(nested, &mut flat);
    flat
}

fn flatten_into(nested: &BTreeMap<String, NestedGuideNode>, flat: &mut FlattenedGuides) {
    for (key, node) in nested {
        if !node.guides.is_empty() {
            let entry = flat.entry(key.clone()).or_default();
            for (id, title) in &node.guides {
                entry.push(Guide {
                    id: id.clone(),
                    title: title.clone(),
                });
            }
        }
        flatten_into(&node.records, flat);
    }
}

/// Assign 1-based integer keys to every distinct guide, in sorted order.
pub fn build_integer_map(flattened: &FlattenedGuides) -> BTreeMap<u32, Guide> {
    let distinct: BTreeSet<&Guide> = flattened.values().flatten().collect();
    (1u32..).zip(distinct.into_iter().cloned()).collect()
}
