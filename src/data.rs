use crate::config::DataSettings;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

/// One sampled observation
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub idx: NaiveDateTime,
    /// Aligned with the owning table's columns; `None` is a missing sample
    pub values: Vec<Option<f64>>,
}

/// Named columns plus rows in ascending timestamp order
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<DataRow>,
}

impl Table {
    /// Build a table, sorting rows by timestamp if needed
    pub fn new(columns: Vec<String>, mut rows: Vec<DataRow>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|r| r.values.len() != columns.len()) {
            return Err(anyhow!(
                "Row at {} has {} values, expected {}",
                row.idx,
                row.values.len(),
                columns.len()
            ));
        }
        if !rows.windows(2).all(|w| w[0].idx <= w[1].idx) {
            warn!("Rows are not in timestamp order; sorting");
            rows.sort_by_key(|r| r.idx);
        }
        Ok(Table { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn window(&self) -> DataWindow<'_> {
        DataWindow {
            columns: &self.columns,
            rows: &self.rows,
        }
    }
}

/// Read-only, time-ordered view over a contiguous run of a table's rows
#[derive(Debug, Clone, Copy)]
pub struct DataWindow<'a> {
    columns: &'a [String],
    rows: &'a [DataRow],
}

impl<'a> DataWindow<'a> {
    pub fn rows(&self) -> &'a [DataRow] {
        self.rows
    }

    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&'a DataRow> {
        self.rows.last()
    }

    /// Rows with `start <= idx < end`, found by binary search
    pub fn slice(&self, start: NaiveDateTime, end: NaiveDateTime) -> DataWindow<'a> {
        let lo = self.rows.partition_point(|r| r.idx < start);
        let hi = self.rows.partition_point(|r| r.idx < end).max(lo);
        DataWindow {
            columns: self.columns,
            rows: &self.rows[lo..hi],
        }
    }

    /// Rows with `start <= idx <= end`
    pub fn slice_inclusive(&self, start: NaiveDateTime, end: NaiveDateTime) -> DataWindow<'a> {
        let lo = self.rows.partition_point(|r| r.idx < start);
        let hi = self.rows.partition_point(|r| r.idx <= end).max(lo);
        DataWindow {
            columns: self.columns,
            rows: &self.rows[lo..hi],
        }
    }

    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// `None` if the field does not exist, `Some(None)` if the sample is missing
    pub fn value(&self, row: &DataRow, name: &str) -> Option<Option<f64>> {
        self.column_index(name).map(|i| row.values.get(i).copied().flatten())
    }
}

/// Where the evaluator finds named tables
pub trait DataSource: Sync {
    fn window(&self, name: &str) -> Option<DataWindow<'_>>;
}

/// In-memory tables keyed by source name
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }
}

impl DataSource for MemoryStore {
    fn window(&self, name: &str) -> Option<DataWindow<'_>> {
        self.tables.get(name).map(|t| t.window())
    }
}

/// Read a CSV table from stdin
pub fn read_table_from_stdin(settings: &DataSettings) -> Result<Table> {
    read_table(io::stdin(), settings)
}

/// Read a CSV table from a file
pub fn read_table_from_path(path: &Path, settings: &DataSettings) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_table(file, settings).with_context(|| format!("Failed to read {}", path.display()))
}

/// Read a CSV table with a timestamp column and numeric measurement columns
pub fn read_table<R: Read>(reader: R, settings: &DataSettings) -> Result<Table> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();

    let idx_column = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(&settings.timestamp_column))
        .ok_or_else(|| {
            anyhow!(
                "Timestamp column '{}' not found. Available columns: {}",
                settings.timestamp_column,
                headers.join(", ")
            )
        })?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != idx_column)
        .map(|(_, h)| h.clone())
        .collect();

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context("Failed to read CSV record")?;
        let stamp = record.get(idx_column).unwrap_or("").trim();
        let idx = NaiveDateTime::parse_from_str(stamp, &settings.timestamp_format).with_context(|| {
            format!(
                "Failed to parse timestamp '{}' at row {} (expected format '{}')",
                stamp,
                row_idx + 1,
                settings.timestamp_format
            )
        })?;

        let mut values = Vec::with_capacity(columns.len());
        for (col, cell) in record.iter().enumerate() {
            if col == idx_column {
                continue;
            }
            values.push(parse_cell(cell).with_context(|| {
                format!(
                    "Failed to parse value '{}' as number in column '{}' at row {}",
                    cell,
                    headers[col],
                    row_idx + 1
                )
            })?);
        }
        rows.push(DataRow { idx, values });
    }

    debug!(rows = rows.len(), columns = columns.len(), "Read CSV table");
    Table::new(columns, rows)
}

fn parse_cell(cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("none") || cell.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    let value = cell.parse::<f64>()?;
    // NaN and infinities are station dropouts
    Ok(Some(value).filter(|v| v.is_finite()))
}
