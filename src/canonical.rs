//! Turns one raw catalogue row into one resolved [`Record`].
//!
//! The steps run once, in order: series, path, level, catalogue reference,
//! keys, fragment keys, dates and eras, research guides, taxonomy. A step
//! whose inputs are absent leaves its outputs unset.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::dates::{identify_eras, resolve_date, source_date_string, ResolvedDate};
use crate::fragments::fragment_keys;
use crate::guides::identify_guides;
use crate::keys::generate_keys;
use crate::models::{CatalogueRow, Record};
use crate::path::Path;
use crate::reference::{load_reference_data, load_taxonomy_shard, ReferenceData, TaxonomyShard};

/// Series reference from class and subclass numbers: `"25/2"`, `"25"`, or none.
pub fn series_of(class_no: Option<i64>, subclass_no: Option<i64>) -> Option<String> {
    match (class_no, subclass_no) {
        (Some(class), Some(subclass)) => Some(format!("{}/{}", class, subclass)),
        (Some(class), None) => Some(class.to_string()),
        (None, _) => None,
    }
}

/// Build the hierarchy path for a row.
pub fn path_of(row: &CatalogueRow, series: Option<String>) -> Path {
    Path {
        department: row.letter_code.clone(),
        division: row.division_no,
        series,
        subseries: row.class_hdr_no,
        subsubseries: row.subheader_no,
        piece: row.piece_ref.clone(),
        item: row.item_ref.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    reference: Arc<ReferenceData>,
}

impl Canonicalizer {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    /// Resolve `row` into a document. `taxonomy` is the shard for the row's
    /// lettercode, if one was loaded.
    pub fn canonicalize(&self, row: CatalogueRow, taxonomy: Option<&TaxonomyShard>) -> Record {
        let series = series_of(row.class_no, row.subclass_no);
        let path = path_of(&row, series.clone());
        let level = path.level();
        let catalogue_ref = level.is_visible().then(|| path.catalogue_ref());

        let keys = generate_keys(&path, level);
        let also_matches = Some(fragment_keys(&path, &keys.matches)).filter(|s| !s.is_empty());

        let resolve = |value: Option<i64>| -> Option<ResolvedDate> {
            value.and_then(|v| {
                resolve_date(&source_date_string(v), &keys.id, catalogue_ref.as_deref())
            })
        };
        let first = resolve(row.first_date);
        let last = resolve(row.last_date);
        let eras = identify_eras(
            &self.reference.eras,
            first.as_ref().map(|d| &d.parts),
            last.as_ref().map(|d| &d.parts),
        );

        let research_guides =
            identify_guides(&self.reference.guides, catalogue_ref.as_deref(), &path);

        let taxonomy_entry = catalogue_ref
            .as_deref()
            .and_then(|r| taxonomy.and_then(|t| t.get(r)));

        Record {
            id: keys.id,
            level,
            catalogue_ref,
            path,
            series,
            matches: keys.matches,
            also_matches,
            letter_code: row.letter_code,
            division_no: row.division_no,
            class_no: row.class_no,
            subclass_no: row.subclass_no,
            class_hdr_no: row.class_hdr_no,
            subheader_no: row.subheader_no,
            piece_ref: row.piece_ref,
            item_ref: row.item_ref,
            title: row.title,
            first_date: first.as_ref().map(|d| d.iso.clone()),
            first_date_obj: first.map(|d| d.parts),
            last_date: last.as_ref().map(|d| d.iso.clone()),
            last_date_obj: last.map(|d| d.parts),
            eras,
            research_guides,
            iaid: taxonomy_entry.map(|t| t.iaid.clone()),
            subjects: taxonomy_entry.map(|t| t.taxonomy_ids.clone()),
        }
    }
}

/// Run the `canonicalize` command: resolve one JSON row and print the document.
pub async fn run_canonicalize(config: &Config, row_json: &str) -> Result<()> {
    let row: CatalogueRow =
        serde_json::from_str(row_json).context("Row must be a JSON object of source columns")?;
    let reference = load_reference_data(&config.reference).await?;
    let taxonomy =
        load_taxonomy_shard(config.reference.taxonomy_dir.as_deref(), &row.letter_code).await?;

    let record = Canonicalizer::new(Arc::new(reference)).canonicalize(row, taxonomy.as_ref());
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::{DateParts, Era};
    use crate::guides::{FlattenedGuides, Guide, GuideCatalogue};
    use crate::path::Level;
    use crate::reference::TaxonomyEntry;
    use chrono::NaiveDate;
    use std::collections::{BTreeMap, HashMap};

    fn canonicalizer() -> Canonicalizer {
        let eras = vec![Era {
            name: "postwar".to_string(),
            start: NaiveDate::from_ymd_opt(1945, 9, 3).unwrap(),
            end: NaiveDate::from_ymd_opt(2000, 12, 31).unwrap(),
        }];
        let atomic = Guide {
            id: "atomic".to_string(),
            title: "Atomic energy".to_string(),
        };
        let mut flattened = FlattenedGuides::new();
        flattened.insert("AB".to_string(), vec![atomic.clone()]);
        let guides = GuideCatalogue::new(flattened, BTreeMap::from([(7, atomic)]));
        Canonicalizer::new(Arc::new(ReferenceData::new(eras, guides)))
    }

    #[test]
    fn series_from_class_numbers() {
        assert_eq!(series_of(Some(25), Some(2)).as_deref(), Some("25/2"));
        assert_eq!(series_of(Some(7), None).as_deref(), Some("7"));
        assert_eq!(series_of(None, Some(2)), None);
    }

    #[test]
    fn resolves_a_series_row() {
        let row = CatalogueRow {
            letter_code: "AB".to_string(),
            division_no: Some(2),
            class_no: Some(7),
            first_date: Some(19440101),
            last_date: Some(19901231),
            title: Some("Northern Groups: Reports and Memoranda".to_string()),
            ..CatalogueRow::default()
        };

        let record = canonicalizer().canonicalize(row, None);
        assert_eq!(record.id, "AB:~2:7");
        assert_eq!(record.level, Level::Series);
        assert_eq!(record.catalogue_ref.as_deref(), Some("AB 7"));
        assert!(record.matches.contains("AB/7"));
        assert!(record.also_matches.is_none());
        assert_eq!(record.first_date.as_deref(), Some("1944-01-01"));
        assert_eq!(
            record.last_date_obj,
            Some(DateParts {
                year: 1990,
                month: 12,
                day: 31,
                century: 19
            })
        );
        assert!(record.eras.contains("postwar"));
        assert_eq!(record.research_guides.department, vec![7]);
        assert_eq!(record.research_guides.all, vec![7]);
    }

    #[test]
    fn slashed_piece_gets_fragments() {
        let row = CatalogueRow {
            letter_code: "CP".to_string(),
            division_no: Some(1),
            class_no: Some(25),
            subclass_no: Some(2),
            class_hdr_no: Some(18),
            piece_ref: Some("25/155/2HENVIIIEASTER".to_string()),
            ..CatalogueRow::default()
        };

        let record = canonicalizer().canonicalize(row, None);
        assert_eq!(record.level, Level::Piece);
        assert_eq!(
            record.catalogue_ref.as_deref(),
            Some("CP 25/2/25/155/2HENVIIIEASTER")
        );
        let also = record.also_matches.expect("fragments");
        assert!(also.contains("CP 25/2/25/155"));
        assert!(also.is_disjoint(&record.matches));
        assert!(record.eras.is_empty());
    }

    #[test]
    fn records_below_a_slashed_series_get_no_fragments() {
        let subseries = CatalogueRow {
            letter_code: "CP".to_string(),
            division_no: Some(1),
            class_no: Some(25),
            subclass_no: Some(2),
            class_hdr_no: Some(18),
            ..CatalogueRow::default()
        };
        let record = canonicalizer().canonicalize(subseries.clone(), None);
        assert_eq!(record.level, Level::Subseries);
        assert!(record.also_matches.is_none());

        let piece = CatalogueRow {
            class_hdr_no: None,
            piece_ref: Some("7".to_string()),
            ..subseries
        };
        let record = canonicalizer().canonicalize(piece, None);
        assert_eq!(record.id, "CP:~1:25/2:7");
        assert!(record.also_matches.is_none());
    }

    #[test]
    fn invisible_level_has_no_reference() {
        let row = CatalogueRow {
            letter_code: "AB".to_string(),
            division_no: Some(3),
            title: Some("Division three".to_string()),
            ..CatalogueRow::default()
        };
        let record = canonicalizer().canonicalize(row, None);
        assert_eq!(record.level, Level::Division);
        assert!(record.catalogue_ref.is_none());
        assert!(record.research_guides.object.is_empty());
        assert_eq!(record.matches.len(), 2);
        assert!(record.also_matches.is_none());
    }

    #[test]
    fn repaired_date_still_classifies() {
        let row = CatalogueRow {
            letter_code: "AB".to_string(),
            class_no: Some(1),
            piece_ref: Some("4".to_string()),
            first_date: Some(19490229),
            last_date: Some(19491231),
            ..CatalogueRow::default()
        };
        let record = canonicalizer().canonicalize(row, None);
        assert_eq!(record.first_date.as_deref(), Some("1949-02-28"));
        assert!(record.eras.contains("postwar"));
    }

    #[test]
    fn attaches_taxonomy_from_shard() {
        let shard = TaxonomyShard::new(
            "ab",
            HashMap::from([(
                "AB 7".to_string(),
                TaxonomyEntry {
                    iaid: "C4242".to_string(),
                    taxonomy_ids: vec![serde_json::json!({"code": "C10002"})],
                },
            )]),
        );
        let row = CatalogueRow {
            letter_code: "AB".to_string(),
            class_no: Some(7),
            ..CatalogueRow::default()
        };
        let record = canonicalizer().canonicalize(row, Some(&shard));
        assert_eq!(record.iaid.as_deref(), Some("C4242"));
        assert_eq!(record.subjects.map(|s| s.len()), Some(1));
    }

    #[test]
    fn department_record_serializes_expected_fields() {
        let record = canonicalizer().canonicalize(
            CatalogueRow::department("AB", Some("Atomic Energy Authority".to_string())),
            None,
        );
        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["id"], "AB");
        assert_eq!(doc["level"], "Department");
        assert_eq!(doc["catalogue_ref"], "AB");
        assert_eq!(doc["path"]["Department"], "AB");
        assert!(doc["path"]["Series"].is_null());
        assert_eq!(doc["matches"], serde_json::json!(["AB"]));
        assert!(doc.get("also_matches").is_none());
        assert!(doc.get("first_date").is_none());
        assert_eq!(doc["research_guides"]["All"], serde_json::json!([7]));
    }
}
