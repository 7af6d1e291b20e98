//! Index creation payload: settings, analyzers and field mappings.
//!
//! `id` is additionally indexed through `path_hierarchy` tokenizers splitting
//! on `:`, forward and reversed, so a query for `AB:~2` finds every document
//! below it and `7` finds every document ending there.

use serde_json::{json, Map, Value};

use crate::path::Level;

fn text_keyword() -> Value {
    json!({
        "type": "text",
        "fields": {
            "keyword": { "type": "keyword", "ignore_above": 256 },
            "raw": { "type": "keyword", "index": true }
        }
    })
}

fn long_raw() -> Value {
    json!({
        "type": "long",
        "fields": { "raw": { "type": "keyword", "index": true } }
    })
}

fn date_parts() -> Value {
    json!({
        "properties": {
            "century": { "type": "short" },
            "day": { "type": "short" },
            "month": { "type": "short" },
            "year": { "type": "short" }
        }
    })
}

fn path_properties() -> Value {
    let mut properties = Map::new();
    for level in Level::ALL {
        let mapping = match level {
            Level::Division | Level::Subseries | Level::Subsubseries => long_raw(),
            _ => text_keyword(),
        };
        properties.insert(level.name().to_string(), mapping);
    }
    json!({ "properties": properties })
}

/// Body for `PUT /{index}`. Refresh starts disabled since creation is
/// always followed by bulk writes.
pub fn create_index_body() -> Value {
    json!({
        "settings": {
            "index": { "refresh_interval": "-1" },
            "analysis": {
                "analyzer": {
                    "custom_path_tree": { "tokenizer": "custom_hierarchy" },
                    "custom_path_tree_reversed": { "tokenizer": "custom_hierarchy_reversed" }
                },
                "tokenizer": {
                    "custom_hierarchy": { "type": "path_hierarchy", "delimiter": ":" },
                    "custom_hierarchy_reversed": {
                        "type": "path_hierarchy",
                        "delimiter": ":",
                        "reverse": true
                    }
                }
            }
        },
        "mappings": {
            "_source": { "enabled": true },
            "properties": {
                "id": {
                    "type": "text",
                    "fields": {
                        "keyword": { "type": "keyword", "ignore_above": 256 },
                        "raw": { "type": "keyword", "index": true },
                        "tree": { "type": "text", "analyzer": "custom_path_tree" },
                        "tree_reversed": { "type": "text", "analyzer": "custom_path_tree_reversed" }
                    }
                },
                "level": text_keyword(),
                "catalogue_ref": text_keyword(),
                "matches": text_keyword(),
                "also_matches": text_keyword(),
                "series": text_keyword(),
                "title": text_keyword(),
                "letter_code": text_keyword(),
                "piece_ref": text_keyword(),
                "item_ref": text_keyword(),
                "division_no": long_raw(),
                "class_no": long_raw(),
                "subclass_no": long_raw(),
                "class_hdr_no": long_raw(),
                "subheader_no": long_raw(),
                "first_date": { "type": "date" },
                "last_date": { "type": "date" },
                "first_date_obj": date_parts(),
                "last_date_obj": date_parts(),
                "eras": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                },
                "research_guides": {
                    "properties": {
                        "All": { "type": "short" },
                        "Department": { "type": "short" },
                        "Object": { "type": "short" },
                        "Series": { "type": "short" }
                    }
                },
                "path": path_properties(),
                "iaid": text_keyword(),
                "subjects": { "type": "object", "enabled": false }
            }
        }
    })
}
