//! # Row Store Module
//!
//! Append-only storage for persisted readings.
//!
//! This module handles:
//! - The [`RowStore`] seam shared by the receiver (append) and dashboard (read last)
//! - A JSON Lines file adapter: one JSON array of 10 strings per line,
//!   the first line being the column header
//! - Header bootstrap for new or header-less files

pub mod store_trait;

pub use store_trait::RowStore;

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AwsMonitorError, Result};
use crate::station::format::PersistedRow;
use crate::station::protocol::{ROW_WIDTH, STORE_HEADER};

/// Bytes read from the end of the file when looking for the last row
const TAIL_WINDOW: u64 = 4096;

fn read_error(path: &Path, e: impl std::fmt::Display) -> AwsMonitorError {
    AwsMonitorError::StoreRead(format!("{}: {}", path.display(), e))
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> AwsMonitorError {
    AwsMonitorError::StoreWrite(format!("{}: {}", path.display(), e))
}

fn header_cells() -> Vec<String> {
    STORE_HEADER.iter().map(|c| c.to_string()).collect()
}

/// JSON Lines file store
///
/// ```text
/// ["Tanggal","Waktu","Suhu","Kelembaban","W.Speed","W.Dir","Tekanan","Hujan","Rad","Signal"]
/// ["01-01-2024","12:00:00","25.3","60","3.2","180","1012.4","0.5","120.0","-70"]
/// ```
pub struct JsonlRowStore {
    path: PathBuf,
    /// Serializes writers within this process
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for JsonlRowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlRowStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonlRowStore {
    /// Create a store backed by the file at `path`.
    ///
    /// Nothing is touched on disk until the first read or write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn create_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(&self.path, e))?;
        }
        Ok(())
    }

    /// Sibling file the header rewrite is staged in
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn first_line(&self) -> Result<Option<String>> {
        let Some(file) = self.open_existing().await? else {
            return Ok(None);
        };

        let mut lines = BufReader::new(file).lines();
        lines.next_line().await.map_err(|e| read_error(&self.path, e))
    }

    async fn open_existing(&self) -> Result<Option<File>> {
        match File::open(&self.path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(read_error(&self.path, e)),
        }
    }

    /// Bytes `start..len` of the file, lossily decoded
    async fn read_tail(&self, file: &mut File, start: u64, len: u64) -> Result<String> {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| read_error(&self.path, e))?;

        let mut buf = Vec::with_capacity((len - start) as usize);
        (&mut *file)
            .take(len - start)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| read_error(&self.path, e))?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Whether the file is non-empty and its last byte is not a newline,
    /// as left behind by an interrupted append
    async fn ends_mid_line(&self) -> Result<bool> {
        let Some(mut file) = self.open_existing().await? else {
            return Ok(false);
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| read_error(&self.path, e))?
            .len();
        if len == 0 {
            return Ok(false);
        }

        Ok(!self.read_tail(&mut file, len - 1, len).await?.ends_with('\n'))
    }
}

/// What one stored line holds
enum StoredLine {
    Header,
    Row(PersistedRow),
    Unreadable(String),
}

fn classify_line(line: &str) -> StoredLine {
    let cells: Vec<String> = match serde_json::from_str(line) {
        Ok(cells) => cells,
        Err(e) => return StoredLine::Unreadable(e.to_string()),
    };

    if cells == header_cells() {
        return StoredLine::Header;
    }

    let width = cells.len();
    match PersistedRow::from_cells(cells) {
        Some(row) => StoredLine::Row(row),
        None => StoredLine::Unreadable(format!("{} cells, expected {}", width, ROW_WIDTH)),
    }
}

#[async_trait]
impl RowStore for JsonlRowStore {
    async fn ensure_header(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let has_header = match self.first_line().await? {
            Some(line) => serde_json::from_str::<Vec<String>>(&line)
                .map(|cells| cells.len() >= ROW_WIDTH)
                .unwrap_or(false),
            None => false,
        };
        if has_header {
            return Ok(false);
        }

        self.create_parent_dir().await?;

        let existing = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(read_error(&self.path, e)),
        };

        let header = serde_json::to_string(&header_cells()).map_err(|e| write_error(&self.path, e))?;
        let contents = if existing.trim().is_empty() {
            format!("{}\n", header)
        } else if existing.ends_with('\n') {
            format!("{}\n{}", header, existing)
        } else {
            format!("{}\n{}\n", header, existing)
        };

        // Replace the file atomically so an interrupted rewrite keeps the old contents
        let staging = self.staging_path();
        fs::write(&staging, contents)
            .await
            .map_err(|e| write_error(&staging, e))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|e| write_error(&self.path, e))?;

        info!("Wrote store header to {}", self.path.display());
        Ok(true)
    }

    /// Last complete data row.
    ///
    /// Reads a window from the end of the file, doubling it until a row is
    /// found or the whole file has been read. Unreadable lines, such as a row
    /// cut short by a crash mid-append, are skipped in favor of the line
    /// before them.
    async fn last_row(&self) -> Result<Option<PersistedRow>> {
        let Some(mut file) = self.open_existing().await? else {
            return Ok(None);
        };

        let len = file
            .metadata()
            .await
            .map_err(|e| read_error(&self.path, e))?
            .len();
        let mut window = TAIL_WINDOW.min(len);

        loop {
            let start = len - window;
            let text = self.read_tail(&mut file, start, len).await?;

            let mut lines: Vec<&str> = text.lines().collect();
            if start > 0 && !lines.is_empty() {
                // First line of the window may be a fragment
                lines.remove(0);
            }

            let mut skipped = 0;
            for line in lines.iter().rev().map(|l| l.trim()).filter(|l| !l.is_empty()) {
                match classify_line(line) {
                    StoredLine::Row(row) => {
                        if skipped > 0 {
                            warn!("Skipped {} unreadable line(s) at the end of {}", skipped, self.path.display());
                        }
                        return Ok(Some(row));
                    }
                    StoredLine::Header => return Ok(None),
                    StoredLine::Unreadable(reason) => {
                        debug!("Unreadable stored line in {}: {}", self.path.display(), reason);
                        skipped += 1;
                    }
                }
            }

            if start == 0 {
                if skipped > 0 {
                    warn!("No readable row in {} ({} unreadable line(s))", self.path.display(), skipped);
                }
                return Ok(None);
            }
            window = (window * 2).min(len);
        }
    }

    async fn append_row(&self, row: &PersistedRow) -> Result<()> {
        let mut line = serde_json::to_string(row).map_err(|e| write_error(&self.path, e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.create_parent_dir().await?;

        // Close off a fragment left by an interrupted append
        if self.ends_mid_line().await.map_err(|e| write_error(&self.path, e))? {
            warn!("Terminating partial last line in {}", self.path.display());
            line.insert(0, '\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| write_error(&self.path, e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| write_error(&self.path, e))?;
        file.flush().await.map_err(|e| write_error(&self.path, e))?;

        debug!("Appended row to {}", self.path.display());
        Ok(())
    }
}
