//! Runs the checker over a list of URLs and prints the report.
//!
//! Output is plain text, one line per event, written as each feed finishes
//! so a CI log shows progress even on slow lists.

use crate::checker::{FeedChecker, FeedReport, Verdict};
use crate::feed::{Fetch, ParseFeed};
use crate::input::{find_duplicates, load_feed_list, FeedListError};
use std::io::{self, Write};
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// What a missing feed list file means for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingListPolicy {
    /// The file was asked for explicitly; not finding it fails the run.
    Fail,
    /// The file is the conventional default; not finding it means nothing to do.
    Skip,
}

/// Aggregated results of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub valid: usize,
    /// `(url, message)` for every Warning verdict, in check order
    pub warned: Vec<(String, String)>,
    /// `(url, message)` for every Invalid verdict, in check order
    pub failed: Vec<(String, String)>,
}

impl Summary {
    fn record(&mut self, report: &FeedReport) {
        self.total += 1;
        let entry = (report.url.clone(), report.verdict.message().to_string());
        if report.verdict.is_invalid() {
            self.failed.push(entry);
        } else if report.verdict.is_warning() {
            self.warned.push(entry);
        } else {
            self.valid += 1;
        }
    }

    /// 1 if any feed was invalid; warnings never fail the run.
    pub fn exit_code(&self) -> u8 {
        if self.failed.is_empty() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}

/// Checks every URL in order, printing as it goes, then prints the summary.
pub async fn run_checks<F, P, W>(
    checker: &FeedChecker<F, P>,
    urls: &[String],
    out: &mut W,
) -> io::Result<Summary>
where
    F: Fetch,
    P: ParseFeed,
    W: Write,
{
    writeln!(out, "🔍 Validating {} feeds...", urls.len())?;
    for duplicate in find_duplicates(urls) {
        tracing::warn!(url = %duplicate, "Feed listed more than once");
        writeln!(out, "⚠️  Listed more than once: {duplicate}")?;
    }

    let mut summary = Summary::default();
    for url in urls {
        writeln!(out, "Testing: {url}")?;
        let report = checker.check(url).await;
        for note in &report.notes {
            writeln!(out, "⚠️  Warning: {note}")?;
        }
        writeln!(
            out,
            "{} {}: {url} - {}",
            icon(&report.verdict),
            report.verdict.label(),
            report.verdict.message()
        )?;
        summary.record(&report);
    }

    write_summary(&summary, out)?;
    Ok(summary)
}

/// Validates an explicit list of URLs and returns the exit code.
pub async fn validate_feeds_from_list<F, P, W>(
    checker: &FeedChecker<F, P>,
    urls: &[String],
    out: &mut W,
) -> io::Result<u8>
where
    F: Fetch,
    P: ParseFeed,
    W: Write,
{
    if urls.is_empty() {
        writeln!(out, "✅ No feeds to validate")?;
        return Ok(EXIT_SUCCESS);
    }
    let summary = run_checks(checker, urls, out).await?;
    Ok(summary.exit_code())
}

/// Validates every URL listed in `path` and returns the exit code.
pub async fn validate_feeds_from_file<F, P, W>(
    checker: &FeedChecker<F, P>,
    path: &Path,
    missing: MissingListPolicy,
    out: &mut W,
) -> io::Result<u8>
where
    F: Fetch,
    P: ParseFeed,
    W: Write,
{
    let urls = match load_feed_list(path) {
        Ok(urls) => urls,
        Err(FeedListError::NotFound(_)) if missing == MissingListPolicy::Skip => {
            tracing::debug!(path = %path.display(), "Default feed list missing");
            writeln!(
                out,
                "✅ No feed list found at {}; nothing to validate",
                path.display()
            )?;
            return Ok(EXIT_SUCCESS);
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not read feed list");
            writeln!(out, "❌ {e}")?;
            return Ok(EXIT_FAILURE);
        }
    };

    validate_feeds_from_list(checker, &urls, out).await
}

fn icon(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Valid(_) => "✅",
        Verdict::Warning(_) => "⚠️ ",
        Verdict::Invalid(_) => "❌",
    }
}

fn write_summary<W: Write>(summary: &Summary, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "Summary: {} checked, {} valid, {} warning(s), {} invalid",
        summary.total,
        summary.valid,
        summary.warned.len(),
        summary.failed.len()
    )?;

    if !summary.warned.is_empty() {
        writeln!(out, "\n⚠️  {} feed(s) returned warnings:", summary.warned.len())?;
        for (url, message) in &summary.warned {
            writeln!(out, "  {url} - {message}")?;
        }
    }

    if !summary.failed.is_empty() {
        writeln!(out, "\n❌ {} feed(s) failed validation:", summary.failed.len())?;
        for (url, message) in &summary.failed {
            writeln!(out, "  {url} - {message}")?;
        }
    } else if summary.warned.is_empty() {
        writeln!(out, "\n✅ All {} feeds are valid", summary.total)?;
    } else {
        writeln!(
            out,
            "\n✅ No invalid feeds ({} with warnings)",
            summary.warned.len()
        )?;
    }

    Ok(())
}
