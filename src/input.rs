//! Reading the list of feed URLs to check.
//!
//! One URL per line. Lines are trimmed and blank lines dropped; there is no
//! comment syntax.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedListError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Splits file content into URLs, in file order.
pub fn parse_feed_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

pub fn load_feed_list(path: &Path) -> Result<Vec<String>, FeedListError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let urls = parse_feed_list(&content);
            tracing::debug!(path = %path.display(), count = urls.len(), "Loaded feed list");
            Ok(urls)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FeedListError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(FeedListError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// URLs listed more than once, each reported once in order of first repeat.
pub fn find_duplicates(urls: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    urls.iter()
        .map(String::as_str)
        .filter(|url| !seen.insert(*url) && reported.insert(*url))
        .collect()
}
