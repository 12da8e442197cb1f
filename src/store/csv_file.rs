// 📄 CSV File Store - the sheet layout in a local file
// Same header and column order as the spreadsheet, so files can be imported into it as-is

use super::RowStore;
use crate::error::StoreError;
use crate::registration::{Registration, HEADER};
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub struct CsvFileStore {
    path: PathBuf,
    /// Serializes appends from concurrent requests in this process
    write_lock: Mutex<()>,
}

impl CsvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvFileStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_empty_file(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    fn create_with_header(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path)?;
        write_csv(file, &[]).map_err(io::Error::from)
    }

    fn read_rows(&self) -> Result<Vec<Registration>, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        // Row 1 is the header whatever it contains
        for record in reader.byte_records().skip(1) {
            let cells: Vec<String> = record?
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect();
            if let Some(reg) = Registration::from_cells(&cells) {
                rows.push(reg);
            }
        }
        Ok(rows)
    }

    fn append(&self, record: &Registration) -> Result<(), csv::Error> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.is_empty_file() {
            self.create_with_header()?;
        }

        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        // A hand-edited last line may lack its newline; never glue onto it
        if !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(record.to_cells())?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl RowStore for CsvFileStore {
    fn backend_tag(&self) -> &'static str {
        "csv"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_empty_file() {
            self.create_with_header().map_err(|e| {
                StoreError::Misconfigured(format!("cannot create {}: {e}", self.path.display()))
            })?;
            info!(path = %self.path.display(), "Created registrations file with header");
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Registration>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Registrations file missing, treating as empty");
            return Ok(Vec::new());
        }
        self.read_rows()
            .map_err(|e| StoreError::read(format!("{}: {e}", self.path.display()), false))
    }

    async fn append_row(&self, record: &Registration) -> Result<(), StoreError> {
        self.append(record)
            .map_err(|e| StoreError::write(format!("{}: {e}", self.path.display()), false))
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Write a header row followed by `rows`
pub fn write_csv<W: Write>(writer: W, rows: &[Registration]) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(HEADER)?;
    for row in rows {
        writer.write_record(row.to_cells())?;
    }
    writer.flush()?;
    Ok(())
}
