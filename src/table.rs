//! Delimited numeric tables.
//!
//! A `Table` is a dense `nrow × ncol` matrix of `f64` with optional row and
//! column names. Both halves of the lookup table (simulated observations and
//! retrieval parameters) are loaded through this module before they are
//! validated and packed into a [`LookupTable`](crate::LookupTable).
//!
//! File layout:
//! - one record per line, fields separated by a single-byte delimiter
//! - optional header line holding column names
//! - optional leading column holding row names
//! - lines starting with `#` and blank or whitespace-only lines are ignored
//!
//! Every remaining cell must parse as a floating-point number, and every
//! record must have the same number of fields.

use std::io::Read;
use std::path::Path;

use nalgebra::DMatrix;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Rows and columns shown by [`Table::log_summary`].
const PREVIEW_ROWS: usize = 6;
const PREVIEW_COLS: usize = 8;

/// How to interpret a delimited text table.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Field separator. Default: `b','`.
    pub delimiter: u8,
    /// First field of every record is a row name. Default: false.
    pub has_row_names: bool,
    /// First record holds column names. Default: false.
    pub has_col_names: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_row_names: false,
            has_col_names: false,
        }
    }
}

/// Summary statistics of one table column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub mean: f64,
    /// Sample standard deviation (n − 1 denominator). Zero for a single row.
    pub sd: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

/// Dense numeric table with optional row and column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    data: DMatrix<f64>,
    row_names: Option<Vec<String>>,
    col_names: Option<Vec<String>>,
}

impl Table {
    /// Build a table from an existing matrix without names.
    pub fn from_matrix(data: DMatrix<f64>) -> Self {
        Self {
            data,
            row_names: None,
            col_names: None,
        }
    }

    /// Build a table from row-major values.
    ///
    /// Panics if `values.len() != nrow * ncol`.
    pub fn from_row_slice(nrow: usize, ncol: usize, values: &[f64]) -> Self {
        Self::from_matrix(DMatrix::from_row_slice(nrow, ncol, values))
    }

    /// Attach column names. Returns a `ShapeMismatch` error if the count differs from `ncol`.
    pub fn with_col_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.ncol() {
            return Err(Error::ShapeMismatch(format!(
                "{} column names for {} columns",
                names.len(),
                self.ncol()
            )));
        }
        self.col_names = Some(names);
        Ok(self)
    }

    /// Attach row names. Returns a `ShapeMismatch` error if the count differs from `nrow`.
    pub fn with_row_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.nrow() {
            return Err(Error::ShapeMismatch(format!(
                "{} row names for {} rows",
                names.len(),
                self.nrow()
            )));
        }
        self.row_names = Some(names);
        Ok(self)
    }

    /// Load a table from a file.
    pub fn load<P: AsRef<Path>>(path: P, options: &TableOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file, options)?;
        info!(
            "Loaded table {}: {} rows x {} columns",
            path.display(),
            table.nrow(),
            table.ncol()
        );
        Ok(table)
    }

    /// Parse a table from any reader.
    pub fn from_reader<R: Read>(reader: R, options: &TableOptions) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut header: Option<(u64, Vec<String>)> = None;
        let mut row_names: Vec<String> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        let mut ncol: Option<usize> = None;
        let mut nrow = 0usize;

        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            // whitespace-only line
            if record.iter().all(str::is_empty) {
                continue;
            }

            if options.has_col_names && header.is_none() {
                header = Some((line, record.iter().map(str::to_string).collect()));
                continue;
            }

            let mut fields = record.iter();
            if options.has_row_names {
                let name = fields.next().ok_or_else(|| Error::Parse {
                    line,
                    reason: "missing row name".to_string(),
                })?;
                row_names.push(name.to_string());
            }

            let start = values.len();
            for (col, cell) in fields.enumerate() {
                let value: f64 = cell.parse().map_err(|_| Error::Parse {
                    line,
                    reason: format!("column {}: '{}' is not a number", col + 1, cell),
                })?;
                values.push(value);
            }
            let found = values.len() - start;

            match ncol {
                None if found == 0 => {
                    return Err(Error::Parse {
                        line,
                        reason: "record has no numeric fields".to_string(),
                    })
                }
                None => ncol = Some(found),
                Some(expected) if expected != found => {
                    return Err(Error::Parse {
                        line,
                        reason: format!("expected {} columns, found {}", expected, found),
                    })
                }
                Some(_) => {}
            }
            nrow += 1;
        }

        let ncol = ncol.ok_or_else(|| Error::Parse {
            line: header.as_ref().map(|(l, _)| *l).unwrap_or(0),
            reason: "table has no data rows".to_string(),
        })?;

        let col_names = match header {
            Some((line, mut names)) => {
                // A leading corner cell above the row-name column is optional.
                if options.has_row_names && names.len() == ncol + 1 {
                    names.remove(0);
                }
                if names.len() != ncol {
                    return Err(Error::Parse {
                        line,
                        reason: format!("header has {} names for {} columns", names.len(), ncol),
                    });
                }
                Some(names)
            }
            None => None,
        };

        Ok(Self {
            data: DMatrix::from_row_slice(nrow, ncol, &values),
            row_names: options.has_row_names.then_some(row_names),
            col_names,
        })
    }

    /// Number of records.
    pub fn nrow(&self) -> usize {
        self.data.nrows()
    }

    /// Number of numeric columns (row names excluded).
    pub fn ncol(&self) -> usize {
        self.data.ncols()
    }

    /// Underlying matrix.
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Value at `(row, col)`, or `None` if out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.data.get((row, col)).copied()
    }

    pub fn row_names(&self) -> Option<&[String]> {
        self.row_names.as_deref()
    }

    pub fn col_names(&self) -> Option<&[String]> {
        self.col_names.as_deref()
    }

    /// Index of the column with the given name.
    pub fn find_col(&self, name: &str) -> Option<usize> {
        self.col_names.as_ref()?.iter().position(|n| n == name)
    }

    /// Index of the row with the given name.
    pub fn find_row(&self, name: &str) -> Option<usize> {
        self.row_names.as_ref()?.iter().position(|n| n == name)
    }

    /// Multiply every cell by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.data *= factor;
    }

    /// Row-major copy of the values, converted to `f32`.
    pub fn to_row_major_f32(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.nrow() * self.ncol());
        for row in self.data.row_iter() {
            out.extend(row.iter().map(|&v| v as f32));
        }
        out
    }

    /// Per-column mean, sample standard deviation, min, max and sum.
    ///
    /// Returns an empty vector for a table without rows.
    pub fn summary(&self) -> Vec<ColumnSummary> {
        let n = self.nrow();
        if n == 0 {
            return Vec::new();
        }
        self.data
            .column_iter()
            .map(|col| {
                // nalgebra's variance divides by n
                let sd = if n > 1 {
                    (col.variance() * n as f64 / (n - 1) as f64).sqrt()
                } else {
                    0.0
                };
                ColumnSummary {
                    mean: col.mean(),
                    sd,
                    min: col.min(),
                    max: col.max(),
                    sum: col.sum(),
                }
            })
            .collect()
    }

    /// Log the table shape, column statistics, and a truncated preview.
    pub fn log_summary(&self, label: &str) {
        info!("{}: {} rows x {} columns", label, self.nrow(), self.ncol());
        for (j, s) in self.summary().iter().enumerate().take(PREVIEW_COLS) {
            let name = self
                .col_names
                .as_ref()
                .map(|names| names[j].clone())
                .unwrap_or_else(|| format!("col{}", j + 1));
            debug!(
                "  {:>12}: mean {:.4} sd {:.4} min {:.4} max {:.4}",
                name, s.mean, s.sd, s.min, s.max
            );
        }
        for (i, row) in self.data.row_iter().enumerate().take(PREVIEW_ROWS) {
            let cells: Vec<String> = row
                .iter()
                .take(PREVIEW_COLS)
                .map(|v| format!("{:.4}", v))
                .collect();
            let more = if self.ncol() > PREVIEW_COLS { " ..." } else { "" };
            debug!("  [{}] {}{}", i, cells.join(" "), more);
        }
        if self.nrow() > PREVIEW_ROWS {
            debug!("  ... {} more rows", self.nrow() - PREVIEW_ROWS);
        }
    }

    /// Write the table as delimited text, including names when present.
    pub fn write<P: AsRef<Path>>(&self, path: P, delimiter: u8) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path.as_ref())?;

        if let Some(names) = &self.col_names {
            let mut header: Vec<&str> = Vec::with_capacity(names.len() + 1);
            if self.row_names.is_some() {
                header.push("");
            }
            header.extend(names.iter().map(String::as_str));
            wtr.write_record(&header)?;
        }

        for (i, row) in self.data.row_iter().enumerate() {
            let mut record: Vec<String> = Vec::with_capacity(self.ncol() + 1);
            if let Some(names) = &self.row_names {
                record.push(names[i].clone());
            }
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
