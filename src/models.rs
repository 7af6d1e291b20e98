//! Core data models used throughout the resolver.
//!
//! A [`CatalogueRow`] is what the relational source hands over for one
//! hierarchy entry; a [`Record`] is the fully resolved document written to
//! the search index.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dates::DateParts;
use crate::guides::ResearchGuides;
use crate::path::{Level, Path};

/// Raw row produced by a level query.
///
/// Columns a level does not have are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueRow {
    pub letter_code: String,
    #[serde(default)]
    pub division_no: Option<i64>,
    #[serde(default)]
    pub class_no: Option<i64>,
    #[serde(default)]
    pub subclass_no: Option<i64>,
    #[serde(default)]
    pub class_hdr_no: Option<i64>,
    #[serde(default)]
    pub subheader_no: Option<i64>,
    #[serde(default)]
    pub piece_ref: Option<String>,
    #[serde(default)]
    pub item_ref: Option<String>,
    /// `YYYYMMDD`.
    #[serde(default)]
    pub first_date: Option<i64>,
    #[serde(default)]
    pub last_date: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

impl CatalogueRow {
    /// The synthetic department-level row for a lettercode.
    pub fn department(letter_code: impl Into<String>, title: Option<String>) -> Self {
        Self {
            letter_code: letter_code.into(),
            title,
            ..Self::default()
        }
    }
}

/// A lettercode (department) known to the source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Lettercode {
    pub code: String,
    pub title: Option<String>,
}

/// A resolved catalogue record, as indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    pub level: Level,
    pub catalogue_ref: Option<String>,
    pub path: Path,
    pub series: Option<String>,
    pub matches: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub also_matches: Option<BTreeSet<String>>,

    pub letter_code: String,
    pub division_no: Option<i64>,
    pub class_no: Option<i64>,
    pub subclass_no: Option<i64>,
    pub class_hdr_no: Option<i64>,
    pub subheader_no: Option<i64>,
    pub piece_ref: Option<String>,
    pub item_ref: Option<String>,
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_date_obj: Option<DateParts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date_obj: Option<DateParts>,
    pub eras: BTreeSet<String>,
    pub research_guides: ResearchGuides,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iaid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<serde_json::Value>>,
}
