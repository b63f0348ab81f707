//! Rectangular views over records for spreadsheet-style output.

use std::io::Write;

use serde::Serialize;

use crate::extract::DEFAULT_VALUE;
use crate::models::record::Record;

/// A table with a fixed column set.
///
/// Columns are the union of all record keys in first-seen order. A record
/// that lacks a column gets the `"0"` sentinel in that cell, so renderers
/// never see a hole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from records.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
        I::IntoIter: Clone,
    {
        let records = records.into_iter();

        let mut columns: Vec<String> = Vec::new();
        for record in records.clone() {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }

        let rows = records
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).unwrap_or(DEFAULT_VALUE).to_string())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Field/value pairs of a single record, one row per field.
    ///
    /// Used to display the header, which has many fields and a single row.
    pub fn transposed(record: &Record) -> Self {
        Self {
            columns: vec!["Campo".to_string(), "Valor".to_string()],
            rows: record
                .iter()
                .map(|(k, v)| vec![k.to_string(), v.to_string()])
                .collect(),
        }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV with a header line.
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> crate::Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);

        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Render the table as a CSV string.
    pub fn to_csv_string(&self, delimiter: u8) -> crate::Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, delimiter)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
