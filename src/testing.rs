//! Store double for unit tests: a [`LocalStore`] that records every call and
//! can be told to fail or to answer appends with a canned confirmation.

use std::sync::Mutex;

use crate::error::StoreError;
use crate::local_store::LocalStore;
use crate::schema::{COLUMNS, DEFAULT_SHEET_NAME};
use crate::store::{SheetRange, TabularStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Read(String),
    Append(String, Vec<String>),
    Update(String, Vec<String>),
}

pub struct RecordingStore {
    pub inner: LocalStore,
    pub calls: Mutex<Vec<Call>>,
    pub fail_reads: Mutex<bool>,
    pub append_reply: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        RecordingStore {
            inner: LocalStore::in_memory(DEFAULT_SHEET_NAME),
            calls: Mutex::new(Vec::new()),
            fail_reads: Mutex::new(false),
            append_reply: Mutex::new(None),
        }
    }

    /// Put a full data row under the header, padding to every column.
    pub fn seed_row(&self, row: u32, values: &[(&str, &str)]) {
        let mut cells = vec![String::new(); COLUMNS.len()];
        for (header, value) in values {
            let idx = COLUMNS
                .iter()
                .position(|c| c.header == *header)
                .unwrap_or_else(|| panic!("no column {header}"));
            cells[idx] = value.to_string();
        }
        let range = SheetRange::row(DEFAULT_SHEET_NAME, row, 1, COLUMNS.len() as u32);
        self.inner.update(&range, cells).unwrap();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn row(&self, row: u32) -> Vec<String> {
        let mut cells = self.inner.rows()[row as usize - 1].clone();
        cells.resize(COLUMNS.len(), String::new());
        cells
    }

    pub fn cell(&self, row: u32, header: &str) -> String {
        let idx = COLUMNS.iter().position(|c| c.header == header).unwrap();
        self.row(row)[idx].clone()
    }
}

impl TabularStore for RecordingStore {
    fn read(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, StoreError> {
        self.calls.lock().unwrap().push(Call::Read(range.to_string()));
        if *self.fail_reads.lock().unwrap() {
            return Err(StoreError::Api {
                status: 503,
                message: "The service is currently unavailable.".to_string(),
            });
        }
        self.inner.read(range)
    }

    fn append(&self, range: &SheetRange, row: Vec<String>) -> Result<String, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Append(range.to_string(), row.clone()));
        let confirmation = self.inner.append(range, row)?;
        Ok(self
            .append_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(confirmation))
    }

    fn update(&self, range: &SheetRange, row: Vec<String>) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Update(range.to_string(), row.clone()));
        self.inner.update(range, row)
    }
}
