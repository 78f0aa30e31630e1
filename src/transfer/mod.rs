//! Whole-catalog export and import as a flat text file.
//!
//! The file is a sequence of blocks, one per table:
//!
//! ```text
//! [artists]
//! id,name,uri,url,image_url
//! 4Z8W4fKeB5YxbusRsdQVPb,Radiohead,spotify:artist:4Z8W4fKeB5YxbusRsdQVPb,https://...,
//!
//! [albums]
//! ...
//! ```
//!
//! Columns are exactly the stored columns, in table order. A NULL is written
//! as an empty field.
//!
//! Import upserts rows without clearing tables first. The whole file is
//! validated before anything is written; after that each row is applied on
//! its own and a rejected row is reported without stopping the import.

mod csv;

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog_store::{
    CatalogError, CatalogStore, ALBUMS_TABLE, ARTISTS_TABLE, ARTIST_GENRES_TABLE, GENRES_TABLE,
    TRACKS_TABLE,
};
use crate::sqlite_persistence::Table;

/// Block labels in file order, with the table each one maps to.
pub const BLOCKS: [(&str, &Table); 5] = [
    ("artists", &ARTISTS_TABLE),
    ("albums", &ALBUMS_TABLE),
    ("tracks", &TRACKS_TABLE),
    ("genres", &GENRES_TABLE),
    ("artistgenres", &ARTIST_GENRES_TABLE),
];

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed file at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Unknown table [{0}]")]
    UnknownTable(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Rows written per block label.
    pub rows: Vec<(String, usize)>,
}

impl ExportReport {
    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub table: String,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub blocks: usize,
    pub applied: usize,
    pub failed: Vec<RowFailure>,
}

struct Block {
    label: String,
    table: &'static Table,
    header_seen: bool,
    rows: Vec<(usize, Vec<Option<String>>)>,
    line: usize,
}

fn table_for_label(label: &str) -> Option<&'static Table> {
    BLOCKS
        .iter()
        .find(|(name, table)| name.eq_ignore_ascii_case(label) || table.name == label)
        .map(|(_, table)| *table)
}

// =============================================================================
// Export
// =============================================================================

pub fn export<W: Write>(store: &dyn CatalogStore, out: W) -> Result<ExportReport, TransferError> {
    let mut out = BufWriter::new(out);
    let mut report = ExportReport::default();

    for (label, table) in BLOCKS {
        let rows = store.export_table(table.name)?;
        writeln!(out, "[{}]", label)?;
        writeln!(out, "{}", csv::write_line(table.column_names()))?;
        for row in &rows {
            let line = csv::write_line(row.iter().map(|v| v.as_deref().unwrap_or("")));
            writeln!(out, "{}", line)?;
        }
        writeln!(out)?;
        report.rows.push((label.to_string(), rows.len()));
    }
    out.flush()?;

    info!("Exported {} rows", report.total_rows());
    Ok(report)
}

pub fn export_to_path(store: &dyn CatalogStore, path: &Path) -> Result<ExportReport, TransferError> {
    let file = File::create(path)?;
    export(store, file)
}

// =============================================================================
// Import
// =============================================================================

fn parse_blocks(text: &str) -> Result<Vec<Block>, TransferError> {
    let mut blocks: Vec<Block> = Vec::new();

    for record in csv::parse(text)? {
        if record.is_blank() {
            continue;
        }
        if let Some(label) = record.marker() {
            let table = table_for_label(label)
                .ok_or_else(|| TransferError::UnknownTable(label.to_string()))?;
            blocks.push(Block {
                label: label.to_string(),
                table,
                header_seen: false,
                rows: Vec::new(),
                line: record.line,
            });
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            return Err(TransferError::Malformed {
                line: record.line,
                reason: "data before the first [table] marker".to_string(),
            });
        };

        let columns = block.table.column_names();
        if !block.header_seen {
            let header: Vec<&str> = record.fields.iter().map(|f| f.trim()).collect();
            if header != columns {
                return Err(TransferError::Malformed {
                    line: record.line,
                    reason: format!(
                        "[{}] header is '{}', expected '{}'",
                        block.label,
                        header.join(","),
                        columns.join(",")
                    ),
                });
            }
            block.header_seen = true;
            continue;
        }

        if record.fields.len() != columns.len() {
            return Err(TransferError::Malformed {
                line: record.line,
                reason: format!(
                    "[{}] row has {} fields, expected {}",
                    block.label,
                    record.fields.len(),
                    columns.len()
                ),
            });
        }
        let values = record
            .fields
            .into_iter()
            .zip(&columns)
            .map(|(value, column)| {
                if value.is_empty() && block.table.is_nullable(column) {
                    None
                } else {
                    Some(value)
                }
            })
            .collect();
        block.rows.push((record.line, values));
    }

    if let Some(block) = blocks.iter().find(|b| !b.header_seen) {
        return Err(TransferError::Malformed {
            line: block.line,
            reason: format!("[{}] has no header", block.label),
        });
    }
    Ok(blocks)
}

pub fn import(store: &dyn CatalogStore, text: &str) -> Result<ImportReport, TransferError> {
    let blocks = parse_blocks(text)?;
    let mut report = ImportReport {
        blocks: blocks.len(),
        ..ImportReport::default()
    };

    store.begin_batch()?;
    for block in &blocks {
        for (line, values) in &block.rows {
            match store.import_row(block.table.name, values) {
                Ok(()) => report.applied += 1,
                Err(e) if e.is_fatal() => {
                    if let Err(rollback) = store.rollback_batch() {
                        warn!("Rollback of import failed: {}", rollback);
                    }
                    return Err(e.into());
                }
                Err(e) => {
                    warn!("Skipping [{}] row at line {}: {}", block.label, line, e);
                    report.failed.push(RowFailure {
                        table: block.label.clone(),
                        line: *line,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
    store.commit_batch()?;

    info!(
        "Imported {} rows from {} blocks, {} rejected",
        report.applied,
        report.blocks,
        report.failed.len()
    );
    Ok(report)
}

pub fn import_from_path(store: &dyn CatalogStore, path: &Path) -> Result<ImportReport, TransferError> {
    let text = fs::read_to_string(path)?;
    import(store, &text)
}
