//! Relational catalogue source.
//!
//! The catalogue lives in a set of relational tables, one per hierarchy
//! level (`tbl_lettercode`, `tbl_Division`, `tbl_class`, `tbl_header`,
//! `tbl_subheader`, `tbl_piece`, `tbl_item`). The pipeline only needs three
//! things from it: a liveness check, the list of lettercodes, and a page of
//! rows for one level of one lettercode.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{CatalogueRow, Lettercode};
use crate::path::Level;

#[async_trait]
pub trait CatalogueSource: Send + Sync {
    /// Check that the source answers queries.
    async fn ping(&self) -> Result<()>;

    /// Every lettercode with its title, sorted by code.
    async fn lettercodes(&self) -> Result<Vec<Lettercode>>;

    /// One page of rows for `level` within `lettercode`.
    ///
    /// Department rows are synthesised from [`lettercodes`](Self::lettercodes)
    /// and cannot be fetched.
    async fn fetch_page(
        &self,
        level: Level,
        lettercode: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<CatalogueRow>>;
}

/// [`CatalogueSource`] over a SQLite mirror of the catalogue tables.
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const LETTERCODES_QUERY: &str = r#"
    SELECT DISTINCT letter_code, lettercode_title AS title
    FROM tbl_lettercode
    ORDER BY letter_code
"#;

const DIVISION_QUERY: &str = r#"
    SELECT l.letter_code, d.division_no,
        NULL AS class_no, NULL AS subclass_no, NULL AS class_hdr_no, NULL AS subheader_no,
        NULL AS piece_ref, NULL AS item_ref, NULL AS first_date, NULL AS last_date,
        d.division_title AS title
    FROM tbl_lettercode l
    INNER JOIN tbl_Division d ON d.lettercode_id = l.lettercode_id
    WHERE l.letter_code = ?
    ORDER BY d.division_no
    LIMIT ? OFFSET ?
"#;

const SERIES_QUERY: &str = r#"
    SELECT DISTINCT l.letter_code, d.division_no, c.class_no, c.subclass_no,
        NULL AS class_hdr_no, NULL AS subheader_no, NULL AS piece_ref, NULL AS item_ref,
        c.first_date, c.last_date, c.class_title AS title
    FROM tbl_lettercode l
    INNER JOIN tbl_class c ON c.lettercode_id = l.lettercode_id
    LEFT JOIN tbl_Division d ON d.division_id = c.division_id
    WHERE l.letter_code = ?
    ORDER BY c.class_no, c.subclass_no
    LIMIT ? OFFSET ?
"#;

const SUBSERIES_QUERY: &str = r#"
    SELECT l.letter_code, d.division_no, c.class_no, c.subclass_no, h.class_hdr_no,
        NULL AS subheader_no, NULL AS piece_ref, NULL AS item_ref,
        NULL AS first_date, NULL AS last_date, h.header_title AS title
    FROM tbl_lettercode l
    INNER JOIN tbl_class c ON c.lettercode_id = l.lettercode_id
    LEFT JOIN tbl_Division d ON d.division_id = c.division_id
    INNER JOIN tbl_header h ON h.class_id = c.class_id
    WHERE l.letter_code = ?
    ORDER BY c.class_no, c.subclass_no, h.class_hdr_no
    LIMIT ? OFFSET ?
"#;

const SUBSUBSERIES_QUERY: &str = r#"
    SELECT l.letter_code, d.division_no, c.class_no, c.subclass_no, h.class_hdr_no,
        s.subheader_no, NULL AS piece_ref, NULL AS item_ref,
        NULL AS first_date, NULL AS last_date, s.subheader_title AS title
    FROM tbl_lettercode l
    INNER JOIN tbl_class c ON c.lettercode_id = l.lettercode_id
    LEFT JOIN tbl_Division d ON d.division_id = c.division_id
    INNER JOIN tbl_header h ON h.class_id = c.class_id
    INNER JOIN tbl_subheader s ON s.header_id = h.header_id
    WHERE l.letter_code = ?
    ORDER BY c.class_no, c.subclass_no, h.class_hdr_no, s.subheader_no
    LIMIT ? OFFSET ?
"#;

const PIECE_QUERY: &str = r#"
    SELECT DISTINCT l.letter_code, d.division_no, c.class_no, c.subclass_no,
        h.class_hdr_no, s.subheader_no, p.piece_ref, NULL AS item_ref,
        p.first_date, p.last_date, p.piece_scope AS title
    FROM tbl_lettercode l
    INNER JOIN tbl_class c ON c.lettercode_id = l.lettercode_id
    INNER JOIN tbl_piece p ON p.class_id = c.class_id
    LEFT JOIN tbl_header h ON h.header_id = p.header_id
    LEFT JOIN tbl_subheader s ON s.subheader_id = p.subheader_id
    LEFT JOIN tbl_Division d ON d.division_id = c.division_id
    WHERE l.letter_code = ?
    ORDER BY c.class_no, c.subclass_no, p.piece_ref
    LIMIT ? OFFSET ?
"#;

const ITEM_QUERY: &str = r#"
    SELECT DISTINCT l.letter_code, d.division_no, c.class_no, c.subclass_no,
        h.class_hdr_no, s.subheader_no, p.piece_ref, i.item_ref,
        i.first_date, i.last_date, i.item_scope AS title
    FROM tbl_lettercode l
    INNER JOIN tbl_class c ON c.lettercode_id = l.lettercode_id
    INNER JOIN tbl_piece p ON p.class_id = c.class_id
    INNER JOIN tbl_item i ON i.piece_id = p.piece_id
    LEFT JOIN tbl_header h ON h.header_id = p.header_id
    LEFT JOIN tbl_subheader s ON s.subheader_id = p.subheader_id
    LEFT JOIN tbl_Division d ON d.division_id = c.division_id
    WHERE l.letter_code = ?
    ORDER BY c.class_no, c.subclass_no, p.piece_ref, i.item_ref
    LIMIT ? OFFSET ?
"#;

fn level_query(level: Level) -> Option<&'static str> {
    match level {
        Level::Department => None,
        Level::Division => Some(DIVISION_QUERY),
        Level::Series => Some(SERIES_QUERY),
        Level::Subseries => Some(SUBSERIES_QUERY),
        Level::Subsubseries => Some(SUBSUBSERIES_QUERY),
        Level::Piece => Some(PIECE_QUERY),
        Level::Item => Some(ITEM_QUERY),
    }
}

fn row_to_catalogue(row: &SqliteRow) -> Result<CatalogueRow> {
    Ok(CatalogueRow {
        letter_code: row.try_get("letter_code")?,
        division_no: row.try_get("division_no")?,
        class_no: row.try_get("class_no")?,
        subclass_no: row.try_get("subclass_no")?,
        class_hdr_no: row.try_get("class_hdr_no")?,
        subheader_no: row.try_get("subheader_no")?,
        piece_ref: row.try_get("piece_ref")?,
        item_ref: row.try_get("item_ref")?,
        first_date: row.try_get("first_date")?,
        last_date: row.try_get("last_date")?,
        title: row.try_get("title")?,
    })
}

#[async_trait]
impl CatalogueSource for SqliteSource {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn lettercodes(&self) -> Result<Vec<Lettercode>> {
        let rows = sqlx::query(LETTERCODES_QUERY).fetch_all(&self.pool).await?;
        let mut codes = rows
            .iter()
            .map(|row| {
                Ok(Lettercode {
                    code: row.try_get("letter_code")?,
                    title: row.try_get("title")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        codes.sort();
        codes.dedup_by(|a, b| a.code == b.code);
        Ok(codes)
    }

    async fn fetch_page(
        &self,
        level: Level,
        lettercode: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<CatalogueRow>> {
        let Some(query) = level_query(level) else {
            bail!("{} rows are not fetched from the source", level);
        };
        let rows = sqlx::query(query)
            .bind(lettercode)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_catalogue).collect()
    }
}

/// Run the `lettercodes` command: print every lettercode and its title.
pub async fn run_lettercodes(config: &Config) -> Result<()> {
    let source = SqliteSource::new(db::connect(&config.source).await?);
    let codes = source.lettercodes().await?;
    for code in &codes {
        println!("{}\t{}", code.code, code.title.as_deref().unwrap_or(""));
    }
    println!("{} lettercodes", codes.len());
    source.close().await;
    Ok(())
}
