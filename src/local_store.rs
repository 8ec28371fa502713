//! A sheet kept on local disk.
//!
//! Stands in for the remote spreadsheet during development and in tests. The
//! file is the sheet's rows serialized with bincode and gzip-compressed, and
//! is rewritten after every write.

use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::schema::COLUMNS;
use crate::store::{SheetRange, TabularStore};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    /// A sheet holding just the header row for [`COLUMNS`].
    pub fn with_header(name: &str) -> Self {
        SheetData {
            name: name.to_string(),
            rows: vec![COLUMNS.iter().map(|c| c.header.to_string()).collect()],
        }
    }

    /// Number of rows up to and including the last one with any content.
    fn used_rows(&self) -> usize {
        self.rows
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
            .map_or(0, |idx| idx + 1)
    }
}

pub fn save_sheet(sheet: &SheetData, filename: &Path) -> std::io::Result<()> {
    if let Some(parent) = filename.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let file = File::create(filename)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = std::io::BufWriter::new(encoder);

    serialize_into(&mut writer, sheet)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    writer.flush()?;

    Ok(())
}

pub fn load_sheet(filename: &Path) -> std::io::Result<SheetData> {
    let file = File::open(filename)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let sheet: SheetData = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(sheet)
}

pub struct LocalStore {
    path: Option<PathBuf>,
    data: Mutex<SheetData>,
}

impl LocalStore {
    /// Unsaved sheet with the standard header row.
    pub fn in_memory(sheet: &str) -> Self {
        Self::from_data(SheetData::with_header(sheet))
    }

    pub fn from_data(data: SheetData) -> Self {
        LocalStore {
            path: None,
            data: Mutex::new(data),
        }
    }

    /// Open `path`, creating it with a header row when it does not exist.
    pub fn open(path: impl Into<PathBuf>, sheet: &str) -> std::io::Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            load_sheet(&path)?
        } else {
            let data = SheetData::with_header(sheet);
            save_sheet(&data, &path)?;
            data
        };
        Ok(LocalStore {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// Copy of the current rows.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SheetData> {
        // A panic mid-write leaves the rows consistent enough to keep serving.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_sheet(data: &SheetData, range: &SheetRange) -> Result<(), StoreError> {
        if data.name == range.sheet {
            Ok(())
        } else {
            Err(StoreError::Api {
                status: 400,
                message: format!("Unable to parse range: {}", range),
            })
        }
    }

    fn flush(&self, data: &SheetData) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            save_sheet(data, path)?;
            debug!("local sheet written to {}", path.display());
        }
        Ok(())
    }
}

impl TabularStore for LocalStore {
    fn read(&self, range: &SheetRange) -> Result<Vec<Vec<String>>, StoreError> {
        let data = self.lock();
        Self::check_sheet(&data, range)?;

        let first = range.start_row as usize - 1;
        let last = range
            .end_row
            .map_or(data.used_rows(), |row| (row as usize).min(data.used_rows()));
        let start_col = range.start_col as usize - 1;
        let end_col = range.end_col as usize;

        let rows = data
            .rows
            .get(first..last.max(first))
            .unwrap_or_default()
            .iter()
            .map(|row| {
                let mut cells: Vec<String> = row
                    .iter()
                    .take(end_col)
                    .skip(start_col)
                    .cloned()
                    .collect();
                // Like the remote API, trailing blanks are not returned.
                while cells.last().is_some_and(|cell| cell.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();
        Ok(rows)
    }

    fn append(&self, range: &SheetRange, row: Vec<String>) -> Result<String, StoreError> {
        let mut data = self.lock();
        Self::check_sheet(&data, range)?;

        let index = data.used_rows();
        data.rows.truncate(index);
        let mut cells = vec![String::new(); range.start_col as usize - 1];
        let width = row.len() as u32;
        cells.extend(row);
        data.rows.push(cells);
        self.flush(&data)?;

        let row_number = index as u32 + 1;
        let written = SheetRange::row(
            &range.sheet,
            row_number,
            range.start_col,
            range.start_col + width.max(1) - 1,
        );
        Ok(written.to_string())
    }

    fn update(&self, range: &SheetRange, row: Vec<String>) -> Result<(), StoreError> {
        let mut data = self.lock();
        Self::check_sheet(&data, range)?;

        let row_idx = range.start_row as usize - 1;
        if data.rows.len() <= row_idx {
            data.rows.resize(row_idx + 1, Vec::new());
        }
        let target = &mut data.rows[row_idx];
        let start_col = range.start_col as usize - 1;
        let needed = start_col + range.width().min(row.len());
        if target.len() < needed {
            target.resize(needed, String::new());
        }
        for (offset, value) in row.into_iter().take(range.width()).enumerate() {
            target[start_col + offset] = value;
        }
        self.flush(&data)
    }
}
