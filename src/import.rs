//! Roster import from delimited text or spreadsheet files.

use calamine::{open_workbook_auto, Data, Reader};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

pub const REQUIRED_COLUMNS: [&str; 3] = ["name", "roll_no", "class_section"];
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("file has no header row")]
    NoHeader,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Delimited(u8),
    Spreadsheet,
}

fn detect_format(path: &Path) -> Result<Format, ImportError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" | "txt" => Ok(Format::Delimited(b',')),
        "tsv" => Ok(Format::Delimited(b'\t')),
        "xlsx" | "xlsm" | "xls" | "ods" => Ok(Format::Spreadsheet),
        other => Err(ImportError::UnsupportedFormat(if other.is_empty() {
            path.to_string_lossy().to_string()
        } else {
            format!(".{other}")
        })),
    }
}

/// Header plus data rows, every cell as text.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn column_index(&self) -> HashMap<String, usize> {
        let mut idx = HashMap::new();
        for (i, c) in self.columns.iter().enumerate() {
            idx.entry(c.trim().to_lowercase()).or_insert(i);
        }
        idx
    }

    pub fn missing_columns(&self) -> Vec<String> {
        let idx = self.column_index();
        REQUIRED_COLUMNS
            .iter()
            .filter(|c| !idx.contains_key(**c))
            .map(|c| c.to_string())
            .collect()
    }
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> ImportError {
    ImportError::Read {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    }
}

pub fn read_table(path: &Path) -> Result<Table, ImportError> {
    match detect_format(path)? {
        Format::Delimited(delim) => read_delimited(path, delim),
        Format::Spreadsheet => read_spreadsheet(path),
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| read_error(path, e))?;
    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| read_error(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(ImportError::NoHeader);
    }

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| read_error(path, format!("row {}: {e}", i + 2)))?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }
    Ok(Table { columns, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn read_spreadsheet(path: &Path) -> Result<Table, ImportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| read_error(path, "workbook has no worksheets"))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| read_error(path, e))?;

    let mut iter = range.rows();
    let header = iter.next().ok_or(ImportError::NoHeader)?;
    let columns: Vec<String> = header.iter().map(cell_text).collect();
    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(ImportError::NoHeader);
    }
    let rows = iter
        .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|v| !v.trim().is_empty()))
        .collect();
    Ok(Table { columns, rows })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedStudent {
    pub name: String,
    pub roll_no: String,
    pub class_section: String,
    pub father_name: String,
    pub contact: String,
    pub photo: String,
}

/// Maps table rows onto students. Fails before producing anything when a
/// required column is absent; absent optional columns read as "".
pub fn students_from_table(table: &Table) -> Result<Vec<ImportedStudent>, ImportError> {
    let missing = table.missing_columns();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }
    let idx = table.column_index();
    let col = |row: &[String], name: &str| -> String {
        idx.get(name)
            .and_then(|i| row.get(*i))
            .cloned()
            .unwrap_or_default()
    };
    Ok(table
        .rows
        .iter()
        .map(|row| ImportedStudent {
            name: col(row, "name"),
            roll_no: col(row, "roll_no"),
            class_section: col(row, "class_section"),
            father_name: col(row, "father_name"),
            contact: col(row, "contact"),
            photo: col(row, "photo"),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub row_count: usize,
    pub preview: Vec<HashMap<String, String>>,
}

pub fn preview(path: &Path) -> Result<ImportPreview, ImportError> {
    let table = read_table(path)?;
    let preview = table
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| {
            table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();
    Ok(ImportPreview {
        missing_columns: table.missing_columns(),
        row_count: table.rows.len(),
        columns: table.columns,
        preview,
    })
}

/// Reads `path` and inserts every row as a new student in one transaction.
pub fn import_students(conn: &Connection, path: &Path) -> Result<usize, ImportError> {
    let table = read_table(path)?;
    let students = students_from_table(&table)?;

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO students(name, roll_no, class_section, father_name, contact, photo)
             VALUES(?, ?, ?, ?, ?, ?)",
        )?;
        for s in &students {
            stmt.execute((
                &s.name,
                &s.roll_no,
                &s.class_section,
                &s.father_name,
                &s.contact,
                &s.photo,
            ))?;
        }
    }
    tx.commit()?;
    tracing::info!(path = %path.display(), inserted = students.len(), "imported roster file");
    Ok(students.len())
}
