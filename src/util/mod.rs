//! Utility functions shared by the checker.
//!
//! - **URL validation**: syntax and scheme checks before a feed is fetched
//!
//! # Examples
//!
//! ```
//! use feedcheck::util::validate_url;
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//! ```

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
