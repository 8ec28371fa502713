//! Sample lookup and upsert against the sheet.
//!
//! [`SampleReconciler::lookup`] finds the row for a sample number and turns it
//! back into form values; [`SampleReconciler::persist`] writes a submission
//! either as a new row or over the row found earlier, carrying the sheet-owned
//! status columns through unchanged.

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

use crate::error::ReconcileError;
use crate::schema::{
    self, APPEND_WIDTH, COLUMNS, ColumnSource, FieldValue, IDENTIFIER_HEADER, ResponseRecord,
};
use crate::store::{SheetRange, TabularStore};

lazy_static! {
    static ref RANGE_ROW: Regex = Regex::new(r"!.*?(\d+):").unwrap();
    static ref RANGE_LAST_ROW: Regex = Regex::new(r"!.*?(\d+)$").unwrap();
}

/// Raw values of the sheet-owned columns, keyed by header.
pub type Extras = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub struct ReconciliationResult {
    /// 1-based sheet row of the winning match.
    pub row_index: u32,
    pub values: ResponseRecord,
    pub match_count: usize,
    pub extras: Extras,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    NotFound,
    Found(ReconciliationResult),
}

pub struct SampleReconciler<S> {
    store: S,
    sheet: String,
}

impl<S: TabularStore> SampleReconciler<S> {
    pub fn new(store: S, sheet: &str) -> Self {
        SampleReconciler {
            store,
            sheet: sheet.to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    fn full_width() -> u32 {
        COLUMNS.len() as u32
    }

    /// Find the row holding `identifier`. The last matching row wins.
    ///
    /// A blank identifier is never looked up.
    pub fn lookup(&self, identifier: &str) -> Result<Lookup, ReconcileError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(Lookup::NotFound);
        }

        let rows = self
            .store
            .read(&SheetRange::columns(&self.sheet, 1, Self::full_width()))?;
        let Some(header) = rows.first() else {
            return Err(ReconcileError::MissingIdentifierColumn(
                IDENTIFIER_HEADER.to_string(),
            ));
        };
        let positions: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim(), idx))
            .collect();
        let id_col = *positions.get(IDENTIFIER_HEADER).ok_or_else(|| {
            ReconcileError::MissingIdentifierColumn(IDENTIFIER_HEADER.to_string())
        })?;

        let matches: Vec<usize> = rows
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, row)| cell(row, id_col).trim() == identifier)
            .map(|(idx, _)| idx)
            .collect();
        let Some(&last) = matches.last() else {
            info!("sample {} not in sheet, starting a new record", identifier);
            return Ok(Lookup::NotFound);
        };
        if matches.len() > 1 {
            warn!(
                "sample {} appears in {} rows, using the last one",
                identifier,
                matches.len()
            );
        }

        let row = &rows[last];
        let mut values = ResponseRecord::new();
        let mut extras = Extras::new();
        for (fixed_pos, column) in COLUMNS.iter().enumerate() {
            // Columns whose header is missing fall back to their fixed position.
            let pos = positions.get(column.header).copied().unwrap_or(fixed_pos);
            let raw = cell(row, pos);
            match column.source {
                ColumnSource::Field(label) => {
                    if let Some(def) = schema::field(label) {
                        values.insert(label.to_string(), def.value_from_cell(raw));
                    }
                }
                ColumnSource::StoreOnly => {
                    extras.insert(column.header.to_string(), raw.to_string());
                }
            }
        }

        let row_index = last as u32 + 1;
        info!("sample {} loaded from row {}", identifier, row_index);
        Ok(Lookup::Found(ReconciliationResult {
            row_index,
            values,
            match_count: matches.len(),
            extras,
        }))
    }

    /// Write `response` to the sheet and return its row.
    ///
    /// Without `existing_row` the record is appended (status columns blank)
    /// and the service order cell is filled in right after. With it, the whole
    /// row is overwritten, status columns taken from `extras`.
    pub fn persist(
        &self,
        response: &ResponseRecord,
        existing_row: Option<u32>,
        extras: &Extras,
    ) -> Result<u32, ReconcileError> {
        let row = build_row(response, extras);

        let Some(row_index) = existing_row else {
            let mut appended: Vec<String> = row[..APPEND_WIDTH].to_vec();
            for (cell, column) in appended.iter_mut().zip(COLUMNS) {
                if column.source == ColumnSource::StoreOnly {
                    cell.clear();
                }
            }
            let confirmation = self.store.append(
                &SheetRange::columns(&self.sheet, 1, APPEND_WIDTH as u32),
                appended,
            )?;
            let row_index = parse_row_index(&confirmation)?;

            let trailing = SheetRange::row(
                &self.sheet,
                row_index,
                APPEND_WIDTH as u32 + 1,
                Self::full_width(),
            );
            self.store.update(&trailing, row[APPEND_WIDTH..].to_vec())?;
            info!("appended sample at row {}", row_index);
            return Ok(row_index);
        };

        self.store.update(
            &SheetRange::row(&self.sheet, row_index, 1, Self::full_width()),
            row,
        )?;
        info!("updated sample at row {}", row_index);
        Ok(row_index)
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Cells for every column in sheet order.
pub fn build_row(response: &ResponseRecord, extras: &Extras) -> Vec<String> {
    COLUMNS
        .iter()
        .map(|column| match column.source {
            ColumnSource::Field(label) => response
                .get(label)
                .map(FieldValue::to_cell)
                .unwrap_or_default(),
            ColumnSource::StoreOnly => extras.get(column.header).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Row number from an append confirmation such as `Geral!A123:AG123`.
pub fn parse_row_index(updated_range: &str) -> Result<u32, ReconcileError> {
    RANGE_ROW
        .captures(updated_range)
        .or_else(|| RANGE_LAST_ROW.captures(updated_range))
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| ReconcileError::RowIndexParse(updated_range.to_string()))
}
