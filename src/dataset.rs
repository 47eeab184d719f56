use crate::error::{CleaningError, Result};
use csv::StringRecord;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// A CSV table held in memory: one header record plus data records.
///
/// Cells stay as text; columns are interpreted only by the operations that
/// need them, so untouched columns are written back exactly as read.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Dataset {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file).map_err(|e| match e {
            CleaningError::EmptyTable(_) => CleaningError::EmptyTable(path.display().to_string()),
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(CleaningError::EmptyTable("<reader>".to_string()));
        }
        let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CleaningError::MissingColumn(name.to_string()))
    }

    /// Values of one column, top to bottom.
    pub fn column<'a>(&'a self, name: &str) -> Result<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |r| r.get(idx).unwrap_or("")))
    }

    /// Keep rows for which `keep` returns true; returns how many were removed.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&StringRecord) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|r| keep(r));
        before - self.rows.len()
    }

    /// Rewrite every cell of column `idx` with `f(old_value)`.
    pub fn map_column<F>(&mut self, idx: usize, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        for row in &mut self.rows {
            let rewritten: StringRecord = row
                .iter()
                .enumerate()
                .map(|(i, cell)| if i == idx { f(cell) } else { cell.to_string() })
                .collect();
            *row = rewritten;
        }
    }

    /// Write header and rows as CSV, no index column.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write to `path`, replacing any existing file.
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(&file)?;
        file.sync_all()?;
        Ok(())
    }
}
