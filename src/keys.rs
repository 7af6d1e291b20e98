//! Canonical identifier and match-key generation.
//!
//! Every record gets exactly one document ID, the colon-joined list of all
//! populated path segments (`AB:~2:7`). On top of that it gets a set of
//! *matches*: the strings that address the same record in the forms users
//! and legacy systems actually write (`AB 7`, `AB/7`, `AB:7`, `AB/~2/7`).

use std::collections::BTreeSet;

use crate::path::{Level, Path};

/// Separator used to build the document ID.
pub const ID_SEPARATOR: &str = ":";

/// Separators used to build match keys.
pub const MATCH_SEPARATORS: [&str; 2] = ["/", ":"];

/// Output of [`generate_keys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    pub id: String,
    pub matches: BTreeSet<String>,
}

/// Build the document ID and match keys for `path`, treating the record as
/// sitting at `level`.
///
/// `level` decides whether the record is referenceable. For the visible
/// levels (Department, Series, Piece, Item) the catalogue reference, the
/// visible-segments join and the all-segments join are emitted under each
/// separator. For invisible levels only the all-segments join is emitted, so
/// a Division never claims a reference that belongs to its Department.
pub fn generate_keys(path: &Path, level: Level) -> Keys {
    let segments = path.segments();
    let all: Vec<&str> = segments.iter().map(|(_, s)| s.as_str()).collect();
    let visible: Vec<&str> = segments
        .iter()
        .filter(|(l, _)| l.is_visible())
        .map(|(_, s)| s.as_str())
        .collect();

    let id = all.join(ID_SEPARATOR);

    let mut matches = BTreeSet::new();
    if level.is_visible() {
        let catalogue_ref = path.catalogue_ref();
        for sep in MATCH_SEPARATORS {
            matches.insert(catalogue_ref.clone());
            matches.insert(visible.join(sep));
            matches.insert(all.join(sep));
        }
    } else {
        for sep in MATCH_SEPARATORS {
            matches.insert(all.join(sep));
        }
    }

    Keys { id, matches }
}
