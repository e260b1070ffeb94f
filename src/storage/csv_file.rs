//! CSV file backing the record store
//!
//! The file is append-only during a crawl: new rows are added at the end and existing rows are
//! never rewritten. A full rewrite happens only on explicit export, and goes through a temporary
//! file that is atomically renamed into place.

use crate::station::Station;
use crate::storage::schema::{StationRow, STATION_COLUMNS};
use crate::storage::traits::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Handle to a stations CSV file
#[derive(Debug, Clone)]
pub struct StationCsv {
    path: PathBuf,
}

impl StationCsv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every row in file order
    ///
    /// A missing file reads as empty. Rows with a blank name are skipped with a warning, and so
    /// is a short unterminated last row, which is what an interrupted append leaves behind.
    pub fn read_all(&self) -> StorageResult<Vec<Station>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        let terminated = ends_with_newline(&self.path)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| StorageError::csv(&self.path, e))?
            .clone();

        let mut stations = Vec::new();
        let mut records = reader.records().enumerate().peekable();
        while let Some((index, result)) = records.next() {
            // Header is line 1
            let row_number = index as u64 + 2;
            let record = result.map_err(|e| StorageError::csv(&self.path, e))?;

            if records.peek().is_none() && !terminated && record.len() < headers.len() {
                tracing::warn!(
                    "Skipping row {} in {}: truncated ({} of {} fields)",
                    row_number,
                    self.path.display(),
                    record.len(),
                    headers.len()
                );
                break;
            }

            let row: StationRow = record
                .deserialize(Some(&headers))
                .map_err(|e| StorageError::csv(&self.path, e))?;

            if row.name.trim().is_empty() {
                tracing::warn!(
                    "Skipping row {} in {}: empty station name",
                    row_number,
                    self.path.display()
                );
                continue;
            }

            let station = row.into_station().map_err(|message| StorageError::InvalidRow {
                path: self.path.clone(),
                row: row_number,
                message,
            })?;
            stations.push(station);
        }

        Ok(stations)
    }

    /// Appends rows to the end of the file, writing the header first if the file is new
    ///
    /// An unterminated last row left by an interrupted append is completed with a newline when
    /// it has every column, and cut off otherwise. The data is fsynced before returning.
    pub fn append(&self, stations: &[Station]) -> StorageResult<()> {
        if stations.is_empty() {
            return Ok(());
        }
        ensure_parent(&self.path)?;

        let existing_len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        let (existing_len, needs_newline) = if existing_len > 0 {
            self.repair_tail(existing_len)?
        } else {
            (0, false)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        if needs_newline {
            file.write_all(b"\n")
                .map_err(|e| StorageError::io(&self.path, e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if existing_len == 0 {
            writer
                .write_record(STATION_COLUMNS)
                .map_err(|e| StorageError::csv(&self.path, e))?;
        }
        write_rows(&mut writer, stations, &self.path)?;

        let file = writer
            .into_inner()
            .map_err(|e| StorageError::io(&self.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| StorageError::io(&self.path, e))?;

        Ok(())
    }

    /// Makes the file end on a row boundary before appending
    ///
    /// Returns the length the file now has and whether a terminating newline is still owed.
    fn repair_tail(&self, len: u64) -> StorageResult<(u64, bool)> {
        if ends_with_newline(&self.path)? {
            return Ok((len, false));
        }

        let keep = complete_len(&self.path, len)?;
        if keep > 0 {
            let fragment = read_range(&self.path, keep, len)?;
            let header_len = header_len(&self.path)?;
            if field_count(&fragment, &self.path)? >= header_len {
                return Ok((len, true));
            }
        }

        tracing::warn!(
            "Dropping {} bytes of unterminated row at the end of {}",
            len - keep,
            self.path.display()
        );
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.set_len(keep)
            .map_err(|e| StorageError::io(&self.path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok((keep, false))
    }
}

/// Rewrites `path` with exactly `stations`, atomically
///
/// The rows go to `<path>.tmp` first; the temporary file is renamed over `path` only after it
/// has been fully written and synced.
pub fn write_atomic(path: &Path, stations: &[Station]) -> StorageResult<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer
        .write_record(STATION_COLUMNS)
        .map_err(|e| StorageError::csv(&tmp, e))?;
    write_rows(&mut writer, stations, &tmp)?;

    let file = writer
        .into_inner()
        .map_err(|e| StorageError::io(&tmp, e.into_error()))?;
    file.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

fn write_rows<W: Write>(
    writer: &mut csv::Writer<W>,
    stations: &[Station],
    path: &Path,
) -> StorageResult<()> {
    for station in stations {
        let row = StationRow::from_station(station).map_err(StorageError::Serialization)?;
        writer
            .serialize(row)
            .map_err(|e| StorageError::csv(path, e))?;
    }
    writer.flush().map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

fn ends_with_newline(path: &Path) -> StorageResult<bool> {
    let mut file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    if file.metadata().map_err(|e| StorageError::io(path, e))?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))
        .map_err(|e| StorageError::io(path, e))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)
        .map_err(|e| StorageError::io(path, e))?;
    Ok(last[0] == b'\n')
}

/// Offset just past the last newline in the first `len` bytes, or 0 if there is none
fn complete_len(path: &Path, len: u64) -> StorageResult<u64> {
    const CHUNK: u64 = 4096;

    let mut file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    let mut end = len;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))
            .map_err(|e| StorageError::io(path, e))?;
        file.read_exact(chunk)
            .map_err(|e| StorageError::io(path, e))?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

fn read_range(path: &Path, start: u64, end: u64) -> StorageResult<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    file.seek(SeekFrom::Start(start))
        .map_err(|e| StorageError::io(path, e))?;
    let mut bytes = vec![0u8; (end - start) as usize];
    file.read_exact(&mut bytes)
        .map_err(|e| StorageError::io(path, e))?;
    Ok(bytes)
}

fn header_len(path: &Path) -> StorageResult<usize> {
    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);
    let headers = reader.headers().map_err(|e| StorageError::csv(path, e))?;
    Ok(headers.len())
}

fn field_count(fragment: &[u8], path: &Path) -> StorageResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(fragment);
    match reader.records().next() {
        Some(record) => Ok(record.map_err(|e| StorageError::csv(path, e))?.len()),
        None => Ok(0),
    }
}

pub(crate) fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
    }
    Ok(())
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
