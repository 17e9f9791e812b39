//! Per-feed validation: fetch with header fallback, parse, classify.
//!
//! [`FeedChecker::validate_feed`] never fails. Every transport, HTTP and
//! parse problem is folded into a [`Verdict`] so one bad feed cannot stop a
//! run over the rest of the list.

use crate::config::{Config, ForbiddenPolicy, HeaderStrategy};
use crate::feed::{
    looks_like_html, EntryText, FeedRsParser, Fetch, FetchError, FetchResult, HttpFetcher,
    ParseFeed, ParsedFeed,
};
use crate::util::validate_url;
use chrono::Utc;
use std::fmt;

/// Outcome of checking one feed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(String),
    /// Usable or unverifiable, but worth a look. Does not fail the run.
    Warning(String),
    Invalid(String),
}

impl Verdict {
    pub fn message(&self) -> &str {
        match self {
            Self::Valid(msg) | Self::Warning(msg) | Self::Invalid(msg) => msg,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "Valid",
            Self::Warning(_) => "Warning",
            Self::Invalid(_) => "Invalid",
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.message())
    }
}

/// A verdict plus the advisory notes produced while reaching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    pub url: String,
    pub verdict: Verdict,
    /// Recoverable parse issues, already phrased for display
    pub notes: Vec<String>,
}

const BLOCKED_MESSAGE: &str = "Blocked by bot protection (HTTP 403)";
const HTML_PAGE_MESSAGE: &str =
    "Received an HTML page instead of a feed (error or bot-detection page)";
const THIN_CONTENT_MESSAGE: &str = "Entries appear to be headline/link-only (very thin content)";
const UNDATED_NOTE: &str = "Unable to determine entry dates (may be stale)";

/// Entries inspected by the thin-content check.
const THIN_SAMPLE_SIZE: usize = 5;

/// Validates feed URLs against a [`Config`].
///
/// Network access and parsing are injected so classification can be tested
/// without a server. [`FeedChecker::from_config`] wires up the real ones.
pub struct FeedChecker<F = HttpFetcher, P = FeedRsParser> {
    config: Config,
    fetcher: F,
    parser: P,
}

impl FeedChecker {
    /// Builds a checker backed by `reqwest` and `feed-rs`.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be constructed.
    pub fn from_config(config: Config) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::from_config(&config)?;
        Ok(Self::new(config, fetcher, FeedRsParser))
    }
}

impl<F: Fetch, P: ParseFeed> FeedChecker<F, P> {
    /// An empty strategy list is replaced by the default browser strategy.
    pub fn new(mut config: Config, fetcher: F, parser: P) -> Self {
        if config.header_strategies.is_empty() {
            config.header_strategies.push(HeaderStrategy::default());
        }
        Self {
            config,
            fetcher,
            parser,
        }
    }

    pub async fn validate_feed(&self, url: &str) -> Verdict {
        self.check(url).await.verdict
    }

    /// Like [`validate_feed`](Self::validate_feed), keeping the notes.
    pub async fn check(&self, url: &str) -> FeedReport {
        let mut notes = Vec::new();
        let verdict = self.classify(url, &mut notes).await;

        tracing::debug!(url = %url, verdict = %verdict, notes = notes.len(), "Checked feed");

        FeedReport {
            url: url.to_string(),
            verdict,
            notes,
        }
    }

    async fn classify(&self, url: &str, notes: &mut Vec<String>) -> Verdict {
        let parsed_url = match validate_url(url) {
            Ok(u) => u,
            Err(e) => return Verdict::Invalid(e.to_string()),
        };

        let response = match self.fetch_with_fallback(url).await {
            Ok(response) => response,
            Err(e) => return Verdict::Invalid(format!("HTTP error: {e}")),
        };

        if response.is_forbidden() {
            return match self.config.forbidden {
                ForbiddenPolicy::Warn => Verdict::Warning(BLOCKED_MESSAGE.to_string()),
                ForbiddenPolicy::Fail => Verdict::Invalid("HTTP error: status 403".to_string()),
            };
        }
        if !response.is_success() {
            return Verdict::Invalid(format!("HTTP error: status {}", response.status));
        }

        if let Some(content_type) = &response.content_type {
            let content_type = content_type.to_ascii_lowercase();
            let accepted = &self.config.accepted_content_types;
            if !accepted.is_empty()
                && !accepted
                    .iter()
                    .any(|a| content_type.contains(&a.to_ascii_lowercase()))
            {
                return Verdict::Invalid(format!("Unexpected content-type: {content_type}"));
            }
        }

        let feed = match self
            .parser
            .parse(&response.body, response.content_type.as_deref())
        {
            Ok(feed) => feed,
            Err(e) => return parse_error(&response, &e.to_string()),
        };

        for issue in &feed.issues {
            if !self.config.is_recoverable(issue.kind) {
                return parse_error(&response, &issue.to_string());
            }
            tracing::info!(url = %url, issue = %issue, "Recoverable parse issue");
            notes.push(format!("{issue} (feed still usable)"));
        }

        if let Some(verdict) = self.check_structure(&feed) {
            return verdict;
        }

        if self.config.stale_after_days.is_some() && feed.latest_entry.is_none() {
            notes.push(UNDATED_NOTE.to_string());
        }

        if let Some(host) = parsed_url.host_str() {
            if self.config.is_banned_host(host) {
                return Verdict::Warning(format!(
                    "Unsupported host: {host} (feed has {} entries)",
                    feed.entry_count
                ));
            }
        }

        if self.config.warn_on_thin_content && is_thin_content(&feed.entries) {
            return Verdict::Warning(THIN_CONTENT_MESSAGE.to_string());
        }

        if let (Some(max_days), Some(latest)) = (self.config.stale_after_days, feed.latest_entry) {
            let age_days = (Utc::now() - latest).num_days();
            if age_days > 0 && age_days as u64 > max_days {
                return Verdict::Warning(format!(
                    "Latest entry is {age_days} days old (stale feed)"
                ));
            }
        }

        Verdict::Valid(format!("Valid feed with {} entries", feed.entry_count))
    }

    fn check_structure(&self, feed: &ParsedFeed) -> Option<Verdict> {
        if !feed.has_metadata {
            return Some(Verdict::Invalid("No feed metadata found".to_string()));
        }
        if feed.entry_count == 0 {
            return Some(Verdict::Invalid("No feed entries found".to_string()));
        }
        if self.config.require_title_or_description
            && feed.title.is_none()
            && feed.description.is_none()
        {
            return Some(Verdict::Invalid(
                "Missing required feed title or description".to_string(),
            ));
        }
        None
    }

    /// Tries each header strategy in order. Moves on only after a 403 or a
    /// transport error; the last attempt's outcome is returned as-is.
    async fn fetch_with_fallback(&self, url: &str) -> Result<FetchResult, FetchError> {
        let strategies = &self.config.header_strategies;
        let mut result = self.fetcher.fetch(url, &strategies[0]).await;

        for strategy in &strategies[1..] {
            match &result {
                Ok(response) if response.is_forbidden() => {
                    tracing::debug!(url = %url, next = %strategy.name, "Blocked (403), trying next header strategy");
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, next = %strategy.name, "Request failed, trying next header strategy");
                }
                Ok(_) => break,
            }
            result = self.fetcher.fetch(url, strategy).await;
        }

        result
    }
}

/// True when at least 80% of the first entries are thin: under 40 characters
/// of text once links are removed, or about as long as their own title.
fn is_thin_content(entries: &[EntryText]) -> bool {
    let sample = &entries[..entries.len().min(THIN_SAMPLE_SIZE)];
    if sample.is_empty() {
        return true;
    }
    let thin = sample.iter().filter(|entry| is_thin_entry(entry)).count();
    thin * 5 >= sample.len() * 4
}

fn is_thin_entry(entry: &EntryText) -> bool {
    let text_len = entry
        .text
        .split_whitespace()
        .filter(|word| !word.starts_with("http://") && !word.starts_with("https://"))
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .count();
    let title_len = entry.title.trim().chars().count();

    text_len < 40 || (title_len > 0 && text_len.abs_diff(title_len) < 10)
}

fn parse_error(response: &FetchResult, detail: &str) -> Verdict {
    if looks_like_html(&response.body) {
        Verdict::Invalid(HTML_PAGE_MESSAGE.to_string())
    } else {
        Verdict::Invalid(format!("XML parsing error: {detail}"))
    }
}
