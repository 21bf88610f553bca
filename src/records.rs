// Record reader: loads the scraped CSV into ordered `CardRecord`s.

use crate::error::Result;
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// One input row keyed by header name. Only the downloaded image path
/// changes after loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardRecord {
    fields: BTreeMap<String, String>,
    /// Cells past the end of the header row.
    extra: Vec<String>,
    downloaded_image: Option<PathBuf>,
}

impl CardRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CardRecord {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ..Default::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The trimmed value of `key`, or `None` when absent or blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn get_or_empty(&self, key: &str) -> &str {
        self.non_empty(key).unwrap_or("")
    }

    pub fn extra(&self) -> &[String] {
        &self.extra
    }

    pub fn downloaded_image(&self) -> Option<&Path> {
        self.downloaded_image.as_deref()
    }

    pub fn set_downloaded_image(&mut self, path: Option<PathBuf>) {
        self.downloaded_image = path;
    }
}

/// Load every row of the CSV at `path`, first row as header.
pub fn load(path: &Path) -> Result<Vec<CardRecord>> {
    let file = File::open(path)?;
    parse(file)
}

/// Rows with too few cells simply lack the trailing keys; surplus cells
/// are kept in `CardRecord::extra`.
pub fn parse<R: Read>(reader: R) -> Result<Vec<CardRecord>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = CardRecord::default();
        for (i, cell) in row.iter().enumerate() {
            match headers.get(i) {
                Some(key) => {
                    record.fields.insert(key.to_string(), cell.to_string());
                }
                None => record.extra.push(cell.to_string()),
            }
        }
        records.push(record);
    }
    Ok(records)
}
