//! Configuration file parser for `feedcheck.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use crate::feed::ParseIssueKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default input file checked when neither `--file` nor `--url` is given.
pub const DEFAULT_FEED_LIST: &str = "new_feeds.txt";

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "feedcheck.toml";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, \
     text/xml;q=0.8, */*;q=0.7";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// How a feed that stays blocked with HTTP 403 is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForbiddenPolicy {
    /// Report as a warning; does not affect the exit code.
    Warn,
    /// Report as an HTTP error like any other non-2xx status.
    Fail,
}

/// One set of request headers to try when fetching a feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeaderStrategy {
    /// Short label used in log output.
    pub name: String,
    pub user_agent: String,
    /// Extra headers sent alongside the User-Agent.
    pub headers: BTreeMap<String, String>,
}

impl Default for HeaderStrategy {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), DEFAULT_ACCEPT.to_string());
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());
        Self {
            name: "browser".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers,
        }
    }
}

/// Top-level checker configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Largest response body accepted, in bytes.
    pub max_feed_bytes: usize,

    /// Content-type substrings considered acceptable. Empty disables the check.
    pub accepted_content_types: Vec<String>,

    /// Parse issue kinds that are reported but do not fail validation.
    pub recoverable_parse_issues: Vec<ParseIssueKind>,

    /// Classification of a feed that answers every strategy with 403.
    pub forbidden: ForbiddenPolicy,

    /// Fail feeds that carry neither a title nor a description.
    pub require_title_or_description: bool,

    /// Warn when the newest entry is older than this many days. `None` disables.
    pub stale_after_days: Option<u64>,

    /// Warn when most of the first entries are bare headlines or links.
    pub warn_on_thin_content: bool,

    /// Hosts that are accepted but reported as unsupported (scraping proxies etc.).
    pub banned_hosts: Vec<String>,

    /// Header sets tried in order; the next one is used only after a 403 or a
    /// transport error.
    pub header_strategies: Vec<HeaderStrategy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_feed_bytes: 10 * 1024 * 1024,
            accepted_content_types: ["xml", "rss", "atom", "text/plain"]
                .into_iter()
                .map(String::from)
                .collect(),
            recoverable_parse_issues: vec![
                ParseIssueKind::CharacterEncodingOverride,
                ParseIssueKind::NonXmlContentType,
                ParseIssueKind::UndeclaredNamespace,
            ],
            forbidden: ForbiddenPolicy::Warn,
            require_title_or_description: true,
            stale_after_days: None,
            warn_on_thin_content: false,
            banned_hosts: Vec::new(),
            header_strategies: vec![HeaderStrategy::default()],
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "timeout_secs",
        "max_feed_bytes",
        "accepted_content_types",
        "recoverable_parse_issues",
        "forbidden",
        "require_title_or_description",
        "stale_after_days",
        "warn_on_thin_content",
        "banned_hosts",
        "header_strategies",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        if config.header_strategies.is_empty() {
            tracing::warn!(
                path = %path.display(),
                "No header strategies configured, using the default browser strategy"
            );
            config.header_strategies.push(HeaderStrategy::default());
        }

        tracing::info!(
            path = %path.display(),
            strategies = config.header_strategies.len(),
            timeout_secs = config.timeout_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_recoverable(&self, kind: ParseIssueKind) -> bool {
        self.recoverable_parse_issues.contains(&kind)
    }

    /// Case-insensitive match against `banned_hosts`, including subdomains.
    pub fn is_banned_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.banned_hosts.iter().any(|banned| {
            let banned = banned.to_ascii_lowercase();
            host == banned || host.ends_with(&format!(".{banned}"))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("feedcheck_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feedcheck.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.forbidden, ForbiddenPolicy::Warn);
        assert!(config.require_title_or_description);
        assert!(config.stale_after_days.is_none());
        assert!(!config.warn_on_thin_content);
        assert!(config.banned_hosts.is_empty());
        assert_eq!(config.header_strategies.len(), 1);
        assert_eq!(config.header_strategies[0].name, "browser");
        assert_eq!(
            config.accepted_content_types,
            vec!["xml", "rss", "atom", "text/plain"]
        );
        assert!(config.is_recoverable(ParseIssueKind::UndeclaredNamespace));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedcheck_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout_secs, 10);
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "timeout_secs = 3\nforbidden = \"fail\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.forbidden, ForbiddenPolicy::Fail);
        assert_eq!(config.max_feed_bytes, 10 * 1024 * 1024); // default
        assert_eq!(config.header_strategies.len(), 1); // default
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
timeout_secs = 20
max_feed_bytes = 2048
accepted_content_types = ["xml"]
recoverable_parse_issues = ["character-encoding-override"]
forbidden = "warn"
require_title_or_description = false
stale_after_days = 90
warn_on_thin_content = true
banned_hosts = ["rsshub.app", "nitter.net"]

[[header_strategies]]
name = "bot"
user_agent = "feedcheck/1.0"

[[header_strategies]]
name = "browser"
user_agent = "Mozilla/5.0"
headers = { Accept = "application/rss+xml", "Accept-Language" = "en" }
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();

        assert_eq!(config.timeout_secs, 20);
        assert_eq!(config.max_feed_bytes, 2048);
        assert_eq!(config.accepted_content_types, vec!["xml"]);
        assert!(config.is_recoverable(ParseIssueKind::CharacterEncodingOverride));
        assert!(!config.is_recoverable(ParseIssueKind::UndeclaredNamespace));
        assert!(!config.require_title_or_description);
        assert_eq!(config.stale_after_days, Some(90));
        assert!(config.warn_on_thin_content);
        assert_eq!(config.header_strategies.len(), 2);
        assert_eq!(config.header_strategies[0].user_agent, "feedcheck/1.0");
        // Unspecified headers fall back to the default set
        assert!(config.header_strategies[0].headers.contains_key("Accept"));
        assert_eq!(
            config.header_strategies[1].headers.get("Accept").map(String::as_str),
            Some("application/rss+xml")
        );
        cleanup(&path);
    }

    #[test]
    fn test_empty_strategy_list_falls_back_to_default() {
        let path = write_config("no_strategies", "header_strategies = []\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.header_strategies, vec![HeaderStrategy::default()]);
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_policy_value_rejected() {
        let path = write_config("bad_policy", "forbidden = \"ignore\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_unknown_issue_kind_rejected() {
        let path = write_config("bad_issue", "recoverable_parse_issues = [\"whatever\"]\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "timeout_secs = 5\ntotally_fake_key = 1\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout_secs, 5);
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_banned_host_matching() {
        let config = Config {
            banned_hosts: vec!["rsshub.app".to_string()],
            ..Config::default()
        };
        assert!(config.is_banned_host("rsshub.app"));
        assert!(config.is_banned_host("RSSHub.App"));
        assert!(config.is_banned_host("eu.rsshub.app"));
        assert!(!config.is_banned_host("notrsshub.app"));
        assert!(!config.is_banned_host("example.com"));
    }
}
