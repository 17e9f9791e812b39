//! Feed list checker for CI pipelines.
//!
//! Fetches each RSS/Atom URL in a list, parses it, classifies it as valid,
//! warning or invalid, and turns the run into a process exit code.

pub mod checker;
pub mod config;
pub mod feed;
pub mod input;
pub mod runner;
pub mod util;

pub use checker::{FeedChecker, FeedReport, Verdict};
pub use config::Config;
pub use runner::{validate_feeds_from_file, validate_feeds_from_list, MissingListPolicy, Summary};
