// Image fetcher: downloads a card image to the local image directory
// under a filename derived from the card name.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

const DEFAULT_EXTENSION: &str = ".jpg";

/// Where the publisher gets local copies of card images from.
pub trait ImageSource {
    /// Fetch `url` for the card `name`. `None` means there is nothing to upload.
    fn fetch(&mut self, url: &str, name: &str) -> Option<PathBuf>;
}

/// Map every character outside `[A-Za-z0-9]` to `_` and trim underscores
/// at both ends. Names with nothing usable become `image`.
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = mapped.trim_matches('_');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extension (with the dot) of the last path segment of `url`, or `.jpg`.
pub fn extension_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return DEFAULT_EXTENSION.to_string();
    };
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    match segment.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < segment.len() => {
            let ext = &segment[dot + 1..];
            if ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                format!(".{ext}")
            } else {
                DEFAULT_EXTENSION.to_string()
            }
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// File name used for the card `name` whose image lives at `url`.
pub fn image_file_name(name: &str, url: &str) -> String {
    format!("{}{}", sanitize_filename(name), extension_from_url(url))
}

/// Streams images over HTTP into `dir`.
pub struct HttpImageFetcher {
    client: Client,
    dir: PathBuf,
}

impl HttpImageFetcher {
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        HttpImageFetcher {
            client,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `url` and return the written path. An existing file with
    /// the same derived name is overwritten.
    pub fn download(&self, url: &str, name: &str) -> Result<PathBuf> {
        let action = "download image";
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(image_file_name(name, url));

        let mut res = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::from_reqwest(action, e))?;

        let mut out = BufWriter::new(File::create(&path)?);
        let copied = res.copy_to(&mut out).map_err(|e| Error::from_reqwest(action, e));
        let flushed = out.flush().map_err(Error::from);
        if let Err(e) = copied.and(flushed) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        Ok(path)
    }
}

impl ImageSource for HttpImageFetcher {
    fn fetch(&mut self, url: &str, name: &str) -> Option<PathBuf> {
        if url.trim().is_empty() {
            warn!("No image URL for {}", name);
            return None;
        }
        match self.download(url.trim(), name) {
            Ok(path) => {
                info!("Downloaded image for {} -> {}", name, path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to download image for {}: {}", name, e);
                None
            }
        }
    }
}
