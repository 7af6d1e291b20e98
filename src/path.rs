//! The archival hierarchy and the per-record path through it.
//!
//! Catalogue records sit somewhere in a seven-level hierarchy:
//!
//! ```text
//! Department > Division > Series > Subseries > Subsubseries > Piece > Item
//!      1           2         3         4             5           6      7
//! ```
//!
//! Country (-1) and Archon (0) sit above Department in the wider archival
//! model but no current source populates them, so they are not represented.
//!
//! Division, Subseries and Subsubseries are *invisible*: they carry a `~`
//! prefix in generated keys and never appear in a human-facing catalogue
//! reference such as `CP 25/2/25/155/2HENVIIIEASTER`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking a level that is excluded from catalogue references.
pub const INVISIBLE_PREFIX: char = '~';

/// One level of the archival hierarchy, in hierarchy order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Department,
    Division,
    Series,
    Subseries,
    Subsubseries,
    Piece,
    Item,
}

impl Level {
    /// All levels, coarsest first.
    pub const ALL: [Level; 7] = [
        Level::Department,
        Level::Division,
        Level::Series,
        Level::Subseries,
        Level::Subsubseries,
        Level::Piece,
        Level::Item,
    ];

    /// Position of the level in the hierarchy (Department = 1, Item = 7).
    pub fn index(self) -> u8 {
        match self {
            Level::Department => 1,
            Level::Division => 2,
            Level::Series => 3,
            Level::Subseries => 4,
            Level::Subsubseries => 5,
            Level::Piece => 6,
            Level::Item => 7,
        }
    }

    pub fn from_index(index: u8) -> Option<Level> {
        Level::ALL.iter().copied().find(|l| l.index() == index)
    }

    /// Whether the level takes part in catalogue references.
    pub fn is_visible(self) -> bool {
        !matches!(
            self,
            Level::Division | Level::Subseries | Level::Subsubseries
        )
    }

    /// Key prefix for the level: `~` for invisible levels, empty otherwise.
    pub fn prefix(self) -> &'static str {
        if self.is_visible() {
            ""
        } else {
            "~"
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Department => "Department",
            Level::Division => "Division",
            Level::Series => "Series",
            Level::Subseries => "Subseries",
            Level::Subsubseries => "Subsubseries",
            Level::Piece => "Piece",
            Level::Item => "Item",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The position of a record in the hierarchy.
///
/// Department is always present. Division, Subseries and Subsubseries are
/// numeric in the source; Series, Piece and Item are free-form references
/// that may themselves contain slashes (`25/2`, `25/155/2HENVIIIEASTER`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Division")]
    pub division: Option<i64>,
    #[serde(rename = "Series")]
    pub series: Option<String>,
    #[serde(rename = "Subseries")]
    pub subseries: Option<i64>,
    #[serde(rename = "Subsubseries")]
    pub subsubseries: Option<i64>,
    #[serde(rename = "Piece")]
    pub piece: Option<String>,
    #[serde(rename = "Item")]
    pub item: Option<String>,
}

impl Path {
    /// A department-level path with every other level unset.
    pub fn department(code: impl Into<String>) -> Self {
        Self {
            department: code.into(),
            division: None,
            series: None,
            subseries: None,
            subsubseries: None,
            piece: None,
            item: None,
        }
    }

    /// The value stored at `level`, rendered as a key segment (no prefix).
    ///
    /// Empty strings count as unset, matching how the source leaves blank
    /// references.
    pub fn value(&self, level: Level) -> Option<String> {
        let value = match level {
            Level::Department => Some(self.department.clone()),
            Level::Division => self.division.map(|v| v.to_string()),
            Level::Series => self.series.clone(),
            Level::Subseries => self.subseries.map(|v| v.to_string()),
            Level::Subsubseries => self.subsubseries.map(|v| v.to_string()),
            Level::Piece => self.piece.clone(),
            Level::Item => self.item.clone(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Replace the value of one of the reference levels (Series, Piece, Item).
    ///
    /// Numeric levels cannot be replaced with free text; returns `None` for
    /// those.
    pub fn with_reference(&self, level: Level, value: &str) -> Option<Path> {
        let mut path = self.clone();
        match level {
            Level::Series => path.series = Some(value.to_string()),
            Level::Piece => path.piece = Some(value.to_string()),
            Level::Item => path.item = Some(value.to_string()),
            _ => return None,
        }
        Some(path)
    }

    /// Populated levels with their prefixed key segment, coarsest first.
    pub fn segments(&self) -> Vec<(Level, String)> {
        Level::ALL
            .iter()
            .filter_map(|&level| {
                self.value(level)
                    .map(|v| (level, format!("{}{}", level.prefix(), v)))
            })
            .collect()
    }

    /// The deepest populated level; this is the level the record sits at.
    pub fn level(&self) -> Level {
        Level::ALL
            .iter()
            .rev()
            .copied()
            .find(|&l| self.value(l).is_some())
            .unwrap_or(Level::Department)
    }

    /// Human-readable catalogue reference: `"<Department> <Series>/<Piece>/<Item>"`.
    ///
    /// Only populated visible levels are used, so a department on its own
    /// renders as just the code.
    pub fn catalogue_ref(&self) -> String {
        let components: Vec<String> = [Level::Series, Level::Piece, Level::Item]
            .iter()
            .filter_map(|&l| self.value(l))
            .collect();
        format!("{} {}", self.department, components.join("/"))
            .trim()
            .to_string()
    }

    /// Shard key for the department: the alphabetic characters among its
    /// first two characters, lower-cased (`"AB"` → `"ab"`, `"C1"` → `"c"`).
    pub fn shard(lettercode: &str) -> String {
        lettercode
            .chars()
            .take(2)
            .filter(|c| c.is_alphabetic())
            .flat_map(char::to_lowercase)
            .collect()
    }
}
