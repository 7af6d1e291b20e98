//! Shared fixtures: a small catalogue database and reference files.
//!
//! | Lettercode | Rows | Documents |
//! |------------|------|-----------|
//! | AB | division 2, series 7, subseries 3, subsubseries 1, pieces 1 and 2, item 1/1 | 8 |
//! | AC | series 1, piece 1 | 3 |
//! | AD | series 1 | 2 |
//! | CP | division 1, series 25/2, piece 25/155/2HENVIIIEASTER | 4 |

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub const TOTAL_DOCUMENTS: u64 = 17;
pub const AB_DOCUMENTS: u64 = 8;
pub const AC_DOCUMENTS: u64 = 3;

const SCHEMA: &[&str] = &[
    "CREATE TABLE tbl_lettercode (lettercode_id INTEGER PRIMARY KEY, letter_code TEXT NOT NULL, lettercode_title TEXT)",
    "CREATE TABLE tbl_Division (division_id INTEGER PRIMARY KEY, lettercode_id INTEGER, division_no INTEGER, division_title TEXT)",
    "CREATE TABLE tbl_class (class_id INTEGER PRIMARY KEY, lettercode_id INTEGER, division_id INTEGER, class_no INTEGER, subclass_no INTEGER, first_date INTEGER, last_date INTEGER, class_title TEXT)",
    "CREATE TABLE tbl_header (header_id INTEGER PRIMARY KEY, class_id INTEGER, class_hdr_no INTEGER, header_title TEXT)",
    "CREATE TABLE tbl_subheader (subheader_id INTEGER PRIMARY KEY, header_id INTEGER, subheader_no INTEGER, subheader_title TEXT)",
    "CREATE TABLE tbl_piece (piece_id INTEGER PRIMARY KEY, class_id INTEGER, header_id INTEGER, subheader_id INTEGER, piece_ref TEXT, first_date INTEGER, last_date INTEGER, piece_scope TEXT)",
    "CREATE TABLE tbl_item (item_id INTEGER PRIMARY KEY, piece_id INTEGER, item_ref TEXT, first_date INTEGER, last_date INTEGER, item_scope TEXT)",
];

const ROWS: &[&str] = &[
    "INSERT INTO tbl_lettercode VALUES (1, 'AB', 'Atomic Energy Authority'), (2, 'AC', 'Ancient Correspondence'), (3, 'AD', 'Admiralty Drafts'), (4, 'CP', 'Court of Pleas')",
    "INSERT INTO tbl_Division VALUES (1, 1, 2, 'Northern Groups'), (2, 4, 1, 'Pleas')",
    "INSERT INTO tbl_class VALUES \
        (1, 1, 1, 7, NULL, 19440101, 19901231, 'Reports and Memoranda'), \
        (2, 2, NULL, 1, NULL, 12000101, 13991231, 'Letters'), \
        (3, 3, NULL, 1, NULL, NULL, NULL, 'Drafts'), \
        (4, 4, 2, 25, 2, NULL, NULL, 'Plea Rolls')",
    "INSERT INTO tbl_header VALUES (1, 1, 3, 'Reactor Group')",
    "INSERT INTO tbl_subheader VALUES (1, 1, 1, 'Windscale')",
    "INSERT INTO tbl_piece VALUES \
        (1, 1, NULL, NULL, '1', 19440101, 19450101, 'Early reports'), \
        (2, 1, 1, 1, '2', 19490229, 19491231, 'Pile reports'), \
        (3, 2, NULL, NULL, '1', 12000101, 12101231, 'Letters, bundle 1'), \
        (4, 4, NULL, NULL, '25/155/2HENVIIIEASTER', NULL, NULL, 'Easter term')",
    "INSERT INTO tbl_item VALUES (1, 1, '1', 19440101, 19440601, 'First report')",
];

/// Create the fixture catalogue database at `path`.
pub async fn create_catalogue(path: &Path) {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    for statement in SCHEMA.iter().chain(ROWS) {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

/// Write eras, guides and integer map files into `dir`.
pub fn write_reference_files(dir: &Path) {
    fs::write(
        dir.join("eras.json"),
        r#"{
            "medieval": {"start_date": "0974-01-01", "end_date": "1485-08-21"},
            "postwar": {"start_date": "1945-09-03", "end_date": "2000-12-31"}
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("flattened_guides.json"),
        r#"{
            "AB": [{"id": "atomic", "title": "Atomic energy"}],
            "AB 7": [{"id": "reactors", "title": "Reactor programmes"}]
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("researchguide_map.json"),
        r#"{
            "1": {"id": "atomic", "title": "Atomic energy"},
            "2": {"id": "reactors", "title": "Reactor programmes"}
        }"#,
    )
    .unwrap();
}

/// Catalogue, reference files and a config pointing at them.
pub async fn setup_env(root: &Path) -> PathBuf {
    let db_path = root.join("catalogue.sqlite");
    create_catalogue(&db_path).await;
    write_reference_files(root);

    let config = format!(
        r#"[source]
path = "{root}/catalogue.sqlite"
page_size = 2

[index]
url = "http://127.0.0.1:9"
name = "resolver-test"
chunk_size = 2
workers = 2
timeout_secs = 2
max_retries = 0

[pacing]
default_delay_secs = 0

[reference]
eras_file = "{root}/eras.json"
guides_file = "{root}/flattened_guides.json"
integer_map_file = "{root}/researchguide_map.json"

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );
    let config_path = root.join("resolver.toml");
    fs::write(&config_path, config).unwrap();
    config_path
}
