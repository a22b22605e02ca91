use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::error::{GraphError, Result};

/// Reads raw source text from a local path or an `http(s)://` URL.
///
/// Reads are blocking and happen once per load; there are no retries.
#[derive(Debug, Clone)]
pub struct SourceReader {
    timeout: Duration,
}

impl SourceReader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Load the full contents of `source`.
    pub fn read(&self, source: &str) -> Result<String> {
        match remote_url(source) {
            Some(url) => self.fetch(url),
            None => read_file(Path::new(source)),
        }
    }

    fn fetch(&self, url: Url) -> Result<String> {
        let fetch_err = |message: String| GraphError::Fetch {
            url: url.to_string(),
            message,
        };

        log::debug!("Fetching {}", url);
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| fetch_err(e.to_string()))?;

        let response = client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_err(e.to_string()))?;

        response.text().map_err(|e| fetch_err(e.to_string()))
    }
}

impl Default for SourceReader {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// `Some(url)` when `source` is an http or https URL.
pub fn remote_url(source: &str) -> Option<Url> {
    let url = Url::parse(source).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Lower-cased extension (with leading dot) of a path or URL path, e.g. `.json`.
pub fn source_extension(source: &str) -> Option<String> {
    let path = match remote_url(source) {
        Some(url) => url.path().to_string(),
        None => source.to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(GraphError::NotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}
