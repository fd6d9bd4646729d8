use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::ListingRecord;

/// CSV file holding every scraped record, one row per listing URL.
///
/// Reading it back is how a restarted crawl learns which listings are
/// already done. Writes replace the whole file through a temporary file, so
/// an interrupted write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records; empty when the file does not exist yet.
    pub fn load(&self) -> Result<Vec<ListingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut records = Vec::new();
        for (i, row) in reader.deserialize::<ListingRecord>().enumerate() {
            // Row 1 is the header.
            let record = row.with_context(|| {
                format!("Malformed row {} in {}", i + 2, self.path.display())
            })?;
            records.push(record);
        }

        debug!(path = %self.path.display(), rows = records.len(), "Loaded record store");
        Ok(records)
    }

    /// Overwrite the store with `records`. Returns the number written.
    pub fn save<'a>(&self, records: impl IntoIterator<Item = &'a ListingRecord>) -> Result<usize> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = temp_path(&self.path);
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;

        let mut written = 0;
        for record in records {
            writer
                .serialize(record)
                .with_context(|| format!("Failed to write record for {}", record.url))?;
            written += 1;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &self.path).with_context(|| {
            format!("Failed to move {} to {}", tmp.display(), self.path.display())
        })?;
        Ok(written)
    }
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
