//! Untyped tabular matrices and their delimited text codec.
//!
//! Cells are kept as text so identifier and label columns survive a
//! write/read cycle byte for byte. Numeric interpretation happens on demand
//! through [`Column::parse_numeric`].
use std::collections::HashMap;
use std::io::{Read, Write};

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::{LearnerError, Result};

/// Sentinel written for a missing cell.
pub const MISSING: &str = "NA";

/// Text tokens read back as a missing cell.
const MISSING_TOKENS: [&str; 6] = ["", "NA", "NaN", "nan", "None", "NULL"];

pub type Cell = Option<String>;

pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw)
}

/// Shortest representation that parses back to the same `f64`.
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Column {
            name: name.into(),
            cells,
        }
    }

    pub fn from_numbers(name: impl Into<String>, values: &[f64]) -> Self {
        Column::new(
            name,
            values.iter().map(|&v| Some(format_number(v))).collect(),
        )
    }

    pub fn constant(name: impl Into<String>, value: f64, len: usize) -> Self {
        Column::new(name, vec![Some(format_number(value)); len])
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    /// Parse every present cell as `f64`. The error carries the first cell
    /// that is not a number.
    pub fn parse_numeric(&self) -> std::result::Result<Vec<Option<f64>>, String> {
        self.cells
            .iter()
            .map(|cell| match cell {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| raw.clone()),
            })
            .collect()
    }

    pub fn select(&self, rows: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            cells: rows.iter().map(|&i| self.cells[i].clone()).collect(),
        }
    }
}

/// Column-major table with unique column names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    nrows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let nrows = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashMap::with_capacity(columns.len());
        for column in &columns {
            if column.len() != nrows {
                return Err(LearnerError::invariant(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    nrows
                )));
            }
            if seen.insert(column.name.as_str(), ()).is_some() {
                return Err(LearnerError::invariant(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Table { columns, nrows })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Rows at `rows`, in that order.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            nrows: rows.len(),
        }
    }

    /// Copy of this table with `column` appended.
    pub fn with_column(&self, column: Column) -> Result<Table> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Table::new(columns)
    }

    pub fn read<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); headers.len()];

        for record in rdr.records() {
            let record = record?;
            for (idx, raw) in record.iter().enumerate() {
                let cell = if is_missing_token(raw) {
                    None
                } else {
                    Some(raw.to_string())
                };
                cells[idx].push(cell);
            }
        }

        let columns = headers
            .iter()
            .zip(cells)
            .map(|(name, cells)| Column::new(name, cells))
            .collect();
        Table::new(columns)
    }

    pub fn write<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.nrows {
            wtr.write_record(
                self.columns
                    .iter()
                    .map(|c| c.cells[row].as_deref().unwrap_or(MISSING)),
            )?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8], delimiter: u8) -> Result<Table> {
        Table::read(bytes, delimiter)
    }

    pub fn to_bytes(&self, delimiter: u8) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf, delimiter)?;
        Ok(buf)
    }
}
