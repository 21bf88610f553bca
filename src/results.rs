// Result writer: the CSV of rows that were published successfully.

use crate::error::Result;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const HEADER: [&str; 5] = ["Name", "URL", "Price", "ID", "Image File"];

/// A row that the API accepted, with the identifier it assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "URL")]
    pub source_url: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "ID")]
    pub remote_id: String,
    #[serde(rename = "Image File")]
    pub image_path: String,
}

/// Appends results as they arrive and flushes after every row, so an
/// interrupted run keeps what it already published.
pub struct ResultWriter<W: Write> {
    inner: csv::Writer<W>,
    written: usize,
}

impl ResultWriter<File> {
    /// Create (or truncate) the output file and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_writer(File::create(path)?)
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn from_writer(writer: W) -> Result<Self> {
        let mut inner = WriterBuilder::new().has_headers(false).from_writer(writer);
        inner.write_record(HEADER)?;
        inner.flush()?;
        Ok(ResultWriter { inner, written: 0 })
    }

    pub fn record(&mut self, result: &PublishResult) -> Result<()> {
        self.inner.serialize(result)?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

/// Write all `results` to `path`, replacing any existing file.
pub fn save(results: &[PublishResult], path: &Path) -> Result<()> {
    let mut writer = ResultWriter::create(path)?;
    for result in results {
        writer.record(result)?;
    }
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<PublishResult>> {
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let mut results = Vec::new();
    for row in reader.deserialize() {
        results.push(row?);
    }
    Ok(results)
}
