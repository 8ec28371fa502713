//! Range-addressed access to a tabular store.
//!
//! Rows and columns are 1-based, as in A1 notation. A range may leave its
//! last row open (`Geral!A1:AH`) to mean "down to the last used row".

use std::fmt;
use std::sync::Arc;

use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetRange {
    pub sheet: String,
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: u32,
    pub end_row: Option<u32>,
}

impl SheetRange {
    /// Columns `first..=last`, all rows from the top.
    pub fn columns(sheet: &str, first: u32, last: u32) -> Self {
        SheetRange {
            sheet: sheet.to_string(),
            start_col: first,
            start_row: 1,
            end_col: last,
            end_row: None,
        }
    }

    /// Columns `first..=last` of a single row.
    pub fn row(sheet: &str, row: u32, first: u32, last: u32) -> Self {
        SheetRange {
            sheet: sheet.to_string(),
            start_col: first,
            start_row: row,
            end_col: last,
            end_row: Some(row),
        }
    }

    pub fn cell(sheet: &str, col: u32, row: u32) -> Self {
        Self::row(sheet, row, col, col)
    }

    pub fn width(&self) -> usize {
        (self.end_col + 1).saturating_sub(self.start_col) as usize
    }

    fn quoted_sheet(&self) -> String {
        if self.sheet.chars().all(|c| c.is_alphanumeric() || c == '_') {
            self.sheet.clone()
        } else {
            format!("'{}'", self.sheet.replace('\'', "''"))
        }
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = format!("{}{}", col_to_letter(self.start_col), self.start_row);
        let end = match self.end_row {
            Some(row) => format!("{}{}", col_to_letter(self.end_col), row),
            None => col_to_letter(self.end_col),
        };
        if self.end_row == Some(self.start_row) && self.start_col == self.end_col {
            write!(f, "{}!{}", self.quoted_sheet(), start)
        } else {
            write!(f, "{}!{}:{}", self.quoted_sheet(), start, end)
        }
    }
}

/// 1 -> A, 26 -> Z, 27 -> AA, 34 -> AH.
pub fn col_to_letter(col: u32) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

/// A spreadsheet reachable through range reads, row appends and range
/// overwrites. Each call is one blocking round trip.
pub trait TabularStore {
    /// Rows of `range`, header included when the range starts at row 1.
    /// Trailing empty cells may be omitted, so rows can be ragged.
    fn read(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, StoreError>;

    /// Append one row after the table found in `range`. Returns the store's
    /// confirmation of where it landed, e.g. `Geral!A123:AG123`.
    fn append(&self, range: &SheetRange, row: Vec<String>) -> Result<String, StoreError>;

    /// Overwrite the cells of `range` (one row) with `row`.
    fn update(&self, range: &SheetRange, row: Vec<String>) -> Result<(), StoreError>;
}

impl<T: TabularStore + ?Sized> TabularStore for Box<T> {
    fn read(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, StoreError> {
        (**self).read(range)
    }

    fn append(&self, range: &SheetRange, row: Vec<String>) -> Result<String, StoreError> {
        (**self).append(range, row)
    }

    fn update(&self, range: &SheetRange, row: Vec<String>) -> Result<(), StoreError> {
        (**self).update(range, row)
    }
}

impl<T: TabularStore + ?Sized> TabularStore for Arc<T> {
    fn read(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, StoreError> {
        (**self).read(range)
    }

    fn append(&self, range: &SheetRange, row: Vec<String>) -> Result<String, StoreError> {
        (**self).append(range, row)
    }

    fn update(&self, range: &SheetRange, row: Vec<String>) -> Result<(), StoreError> {
        (**self).update(range, row)
    }
}

/// Store handle shared across threads by the web server and CLI.
pub type SharedStore = Box<dyn TabularStore + Send + Sync>;
