//! CSV ingest.
//!
//! Turns a clinical export CSV into typed `Record`s.
//!
//! Design goals:
//! - **Strict identity**: every row needs a non-empty, unique record id
//! - **Lenient cells**: short rows and blank cells are fine (absent fields
//!   are the validator's business, not the loader's)
//! - **All-or-nothing**: any structural problem fails the whole load

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Record, RecordId};
use crate::error::AppError;

/// A loaded dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Normalized header names, in file order.
    pub columns: Vec<String>,
    pub id_column: String,
    pub records: Vec<Record>,
}

/// Load a dataset, picking the reader from the file extension: `.json` is
/// Dataset-JSON, anything else is CSV.
pub fn load_dataset(path: &Path, id_column: &str, item_group: Option<&str>) -> Result<Dataset, AppError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        crate::io::dataset_json::load_dataset_json(path, id_column, item_group)
    } else {
        load_records(path, id_column)
    }
}

/// Load a CSV file. `id_column` is matched case-insensitively.
pub fn load_records(path: &Path, id_column: &str) -> Result<Dataset, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open CSV '{}': {e}", path.display())))?;
    load_records_from_reader(file, id_column).map_err(|e| match e {
        AppError::Dataset(msg) => AppError::dataset(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn load_records_from_reader<R: Read>(reader: R, id_column: &str) -> Result<Dataset, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::dataset(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let mut table = RecordTable::new(headers.iter(), id_column, "line")?;

    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based, and the header is line 1.
        let line = idx + 2;
        let row: StringRecord =
            result.map_err(|e| AppError::dataset(format!("CSV parse error on line {line}: {e}")))?;
        table.push_row(line, row.iter())?;
    }

    Ok(table.finish())
}

/// Turns header names plus raw rows into a `Dataset`, enforcing the identity
/// rules shared by every input format.
pub(crate) struct RecordTable {
    columns: Vec<String>,
    id_column: String,
    id_idx: usize,
    /// How rows are located in error messages ("line", "row").
    unit: &'static str,
    records: Vec<Record>,
    seen: HashSet<RecordId>,
}

impl RecordTable {
    pub(crate) fn new<I, S>(headers: I, id_column: &str, unit: &'static str) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = headers.into_iter().map(|h| normalize_header_name(h.as_ref())).collect();
        let header_map = build_header_map(&columns)?;

        let id_column = normalize_header_name(id_column);
        let id_idx = *header_map
            .get(&id_column)
            .ok_or_else(|| AppError::dataset(format!("Missing record id column: `{id_column}`")))?;

        Ok(Self {
            columns,
            id_column,
            id_idx,
            unit,
            records: Vec::new(),
            seen: HashSet::new(),
        })
    }

    pub(crate) fn width(&self) -> usize {
        self.columns.len()
    }

    /// Add one row. Cells past the header are ignored, missing cells are absent.
    pub(crate) fn push_row<'a, I>(&mut self, line: usize, cells: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cells: Vec<&str> = cells.into_iter().collect();
        let unit = self.unit;

        let id = cells
            .get(self.id_idx)
            .copied()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::dataset(format!("Missing record id on {unit} {line}.")))?;

        let mut record = Record::new(id);
        record.line = line;
        for (col, raw) in self.columns.iter().zip(cells) {
            if col.is_empty() {
                continue;
            }
            record.set(col, raw);
        }

        if !self.seen.insert(record.id.clone()) {
            return Err(AppError::dataset(format!(
                "Duplicate record id `{}` on {unit} {line}.",
                record.id
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub(crate) fn finish(self) -> Dataset {
        tracing::debug!(rows = self.records.len(), columns = self.columns.len(), "dataset loaded");
        Dataset {
            columns: self.columns,
            id_column: self.id_column,
            records: self.records,
        }
    }
}

fn build_header_map(columns: &[String]) -> Result<HashMap<String, usize>, AppError> {
    let mut map = HashMap::new();
    for (idx, name) in columns.iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        if map.insert(name.clone(), idx).is_some() {
            return Err(AppError::dataset(format!("Duplicate column `{name}`.")));
        }
    }
    Ok(map)
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}
