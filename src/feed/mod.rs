//! Feed fetching and parsing.
//!
//! Both concerns sit behind small traits ([`Fetch`], [`ParseFeed`]) so the
//! classification in [`crate::checker`] can run against synthetic responses.

pub mod fetcher;
pub mod parser;

pub use fetcher::{Fetch, FetchError, FetchResult, HttpFetcher};
pub use parser::{
    looks_like_html, EntryText, FeedRsParser, ParseFailure, ParseFeed, ParseIssue, ParseIssueKind,
    ParsedFeed,
};
