use chrono::{DateTime, Utc};
use feed_rs::model::FeedType;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Kinds of non-fatal problems noticed while parsing a feed document.
///
/// These mirror the "bozo" flags of lenient feed parsers: the document was
/// not strictly well-formed but may still be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParseIssueKind {
    /// HTTP charset disagrees with the encoding in the XML declaration
    CharacterEncodingOverride,
    /// Document parsed although it was served with a non-XML content type
    NonXmlContentType,
    /// An element uses a namespace prefix that was never declared
    UndeclaredNamespace,
}

impl fmt::Display for ParseIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CharacterEncodingOverride => "CharacterEncodingOverride",
            Self::NonXmlContentType => "NonXMLContentType",
            Self::UndeclaredNamespace => "UndeclaredNamespace",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub kind: ParseIssueKind,
    pub detail: String,
}

impl ParseIssue {
    fn new(kind: ParseIssueKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// The document could not be read as RSS, Atom or JSON Feed at all.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseFailure {
    pub message: String,
}

impl ParseFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Title and body text of one entry, with markup stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryText {
    pub title: String,
    /// Content if present, else summary
    pub text: String,
}

/// Feed-level view of a parsed document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    /// True when the document carried any channel/feed-level element
    pub has_metadata: bool,
    pub entry_count: usize,
    /// Newest published (or updated) date across all entries
    pub latest_entry: Option<DateTime<Utc>>,
    /// Entries in document order
    pub entries: Vec<EntryText>,
    pub issues: Vec<ParseIssue>,
}

/// Capability to turn a response body into a [`ParsedFeed`].
pub trait ParseFeed {
    fn parse(&self, body: &[u8], content_type: Option<&str>) -> Result<ParsedFeed, ParseFailure>;
}

/// [`ParseFeed`] implementation using `feed-rs`, with a `quick-xml` pass to
/// detect the issues `feed-rs` silently tolerates.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRsParser;

impl ParseFeed for FeedRsParser {
    fn parse(&self, body: &[u8], content_type: Option<&str>) -> Result<ParsedFeed, ParseFailure> {
        let feed = feed_rs::parser::parse(body).map_err(|e| ParseFailure::new(e.to_string()))?;
        let issues = if feed.feed_type == FeedType::JSON {
            Vec::new()
        } else {
            scan_document(body, content_type)?
        };

        let title = feed.title.map(|t| t.content).and_then(non_blank);
        let description = feed.description.map(|d| d.content).and_then(non_blank);

        let has_metadata = title.is_some()
            || description.is_some()
            || !feed.links.is_empty()
            || !feed.authors.is_empty()
            || feed.updated.is_some()
            || feed.language.is_some()
            || feed.generator.is_some();

        let latest_entry = feed
            .entries
            .iter()
            .filter_map(|entry| entry.published.or(entry.updated))
            .max();

        let entries = feed
            .entries
            .iter()
            .map(|entry| EntryText {
                title: entry
                    .title
                    .as_ref()
                    .map(|t| strip_tags(&t.content))
                    .unwrap_or_default(),
                text: entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.as_deref())
                    .or(entry.summary.as_ref().map(|s| s.content.as_str()))
                    .map(strip_tags)
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ParsedFeed {
            title,
            description,
            has_metadata,
            entry_count: feed.entries.len(),
            latest_entry,
            entries,
            issues,
        })
    }
}

/// Drops markup and collapses whitespace.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Walks the document once and collects [`ParseIssue`]s.
///
/// Anything that makes the document not well-formed is a [`ParseFailure`]:
/// syntax errors, mismatched or unclosed elements, content after the root
/// element, and entity references XML does not define.
fn scan_document(
    body: &[u8],
    content_type: Option<&str>,
) -> Result<Vec<ParseIssue>, ParseFailure> {
    let mut issues = Vec::new();

    if let Some(mime) = content_type.map(media_type).filter(|m| !m.is_empty()) {
        if !mime.contains("xml") {
            issues.push(ParseIssue::new(
                ParseIssueKind::NonXmlContentType,
                format!("{mime} is not an XML media type"),
            ));
        }
    }
    let http_charset = content_type.and_then(charset);

    let mut reader = NsReader::from_reader(body);
    let mut buf = Vec::new();
    let mut unknown_prefixes: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut root_closed = false;
    // Internal DTD subsets can define entities we cannot resolve
    let mut custom_entities = false;

    loop {
        let (unknown_prefix, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok((ResolveResult::Unknown(prefix), event)) => (Some(prefix), event),
            Ok((_, event)) => (None, event),
            Err(e) => {
                return Err(ParseFailure::new(format!(
                    "{e} (at byte {})",
                    reader.error_position()
                )))
            }
        };
        let position = reader.buffer_position();

        if root_closed && matches!(event, Event::Start(_) | Event::Empty(_)) {
            return Err(ParseFailure::new(format!(
                "element after the root element (at byte {position})"
            )));
        }

        if let Some(prefix) = unknown_prefix {
            if matches!(event, Event::Start(_) | Event::Empty(_)) {
                let prefix = String::from_utf8_lossy(&prefix).into_owned();
                if !unknown_prefixes.contains(&prefix) {
                    issues.push(ParseIssue::new(
                        ParseIssueKind::UndeclaredNamespace,
                        format!("prefix '{prefix}' is not bound to a namespace"),
                    ));
                    unknown_prefixes.push(prefix);
                }
            }
        }

        match event {
            Event::Decl(decl) => {
                let declared = decl
                    .encoding()
                    .and_then(Result::ok)
                    .map(|e| String::from_utf8_lossy(&e).to_ascii_lowercase());
                if let (Some(declared), Some(http)) = (declared, http_charset.as_deref()) {
                    if normalize_encoding(&declared) != normalize_encoding(http) {
                        issues.push(ParseIssue::new(
                            ParseIssueKind::CharacterEncodingOverride,
                            format!("document declared as {declared}, but served as {http}"),
                        ));
                    }
                }
            }
            Event::DocType(doctype) => {
                custom_entities = doctype.windows(8).any(|w| w == b"<!ENTITY");
            }
            Event::Start(_) => depth += 1,
            Event::Empty(_) => root_closed = depth == 0,
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                root_closed = depth == 0;
            }
            Event::Text(text) => {
                if root_closed && !text.iter().all(u8::is_ascii_whitespace) {
                    return Err(ParseFailure::new(format!(
                        "text after the root element (at byte {position})"
                    )));
                }
                if !custom_entities {
                    if let Err(e) = quick_xml::escape::unescape(&String::from_utf8_lossy(&text)) {
                        return Err(ParseFailure::new(format!(
                            "{e} (in text ending at byte {position})"
                        )));
                    }
                }
            }
            Event::Eof => {
                if depth > 0 {
                    return Err(ParseFailure::new("document ended inside an open element"));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(issues)
}

/// `"Text/XML; charset=UTF-8"` → `"text/xml"`
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

fn normalize_encoding(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Heuristic for error and bot-detection pages served in place of a feed.
pub fn looks_like_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(2048)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    let text = text.trim_start_matches('\u{feff}').trim_start();

    if text.starts_with("<!doctype html") || text.starts_with("<html") {
        return true;
    }
    text.contains("<html") && !text.contains("<rss") && !text.contains("<feed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
    <title>Example News</title>
    <description>All the news</description>
    <link>https://example.com/</link>
    <item><guid>1</guid><title>First</title><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
    <item><guid>2</guid><title>Second</title><pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Example</title>
    <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
    <updated>2024-03-01T12:00:00Z</updated>
    <entry>
        <title>Entry</title>
        <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
        <updated>2024-03-01T12:00:00Z</updated>
    </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_metadata() {
        let parsed = FeedRsParser
            .parse(RSS.as_bytes(), Some("application/rss+xml; charset=utf-8"))
            .unwrap();

        assert_eq!(parsed.title.as_deref(), Some("Example News"));
        assert_eq!(parsed.description.as_deref(), Some("All the news"));
        assert!(parsed.has_metadata);
        assert_eq!(parsed.entry_count, 2);
        assert_eq!(
            parsed.latest_entry.map(|d| d.to_rfc3339()),
            Some("2024-01-02T10:00:00+00:00".to_string())
        );
        assert!(parsed.issues.is_empty(), "unexpected issues: {:?}", parsed.issues);
    }

    #[test]
    fn test_parse_atom_metadata() {
        let parsed = FeedRsParser.parse(ATOM.as_bytes(), None).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Atom Example"));
        assert!(parsed.description.is_none());
        assert!(parsed.has_metadata);
        assert_eq!(parsed.entry_count, 1);
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn test_parse_empty_channel() {
        let body = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let parsed = FeedRsParser.parse(body.as_bytes(), None).unwrap();
        assert_eq!(parsed.entry_count, 0);
        assert!(parsed.latest_entry.is_none());
    }

    #[test]
    fn test_parse_invalid_xml_fails() {
        assert!(FeedRsParser.parse(b"<not valid xml", None).is_err());
    }

    #[test]
    fn test_parse_html_fails() {
        let html = b"<!DOCTYPE html><html><body>Just a moment...</body></html>";
        assert!(FeedRsParser.parse(html, Some("text/html")).is_err());
    }

    #[test]
    fn test_text_plain_flags_non_xml_content_type() {
        let parsed = FeedRsParser
            .parse(RSS.as_bytes(), Some("text/plain; charset=utf-8"))
            .unwrap();
        let kinds: Vec<_> = parsed.issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![ParseIssueKind::NonXmlContentType]);
        assert_eq!(
            parsed.issues[0].to_string(),
            "NonXMLContentType: text/plain is not an XML media type"
        );
    }

    #[test]
    fn test_scan_detects_encoding_override() {
        let body = br#"<?xml version="1.0" encoding="ISO-8859-1"?><rss version="2.0"><channel/></rss>"#;
        let issues = scan_document(body, Some("application/xml; charset=UTF-8")).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ParseIssueKind::CharacterEncodingOverride);
        assert_eq!(
            issues[0].detail,
            "document declared as iso-8859-1, but served as utf-8"
        );
    }

    #[test]
    fn test_scan_encoding_spelling_variants_match() {
        let body = br#"<?xml version="1.0" encoding="UTF8"?><rss version="2.0"><channel/></rss>"#;
        let issues = scan_document(body, Some("text/xml; charset=\"utf-8\"")).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn test_scan_detects_undeclared_namespace_once() {
        let body = br#"<rss version="2.0"><channel>
            <item><media:content url="a"/></item>
            <item><media:content url="b"/></item>
        </channel></rss>"#;
        let issues = scan_document(body, None).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ParseIssueKind::UndeclaredNamespace);
        assert!(issues[0].detail.contains("'media'"));
    }

    #[test]
    fn test_scan_declared_namespace_is_clean() {
        let body = br#"<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/"><channel>
            <item><media:content url="a"/></item>
        </channel></rss>"#;
        assert!(scan_document(body, Some("application/rss+xml"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_scan_rejects_documents_that_are_not_well_formed() {
        let cases: [&[u8]; 5] = [
            b"<rss><channel><title>T</channel></rss>",
            b"<rss><channel/></rss>trailing",
            b"<rss><channel/></rss><rss/>",
            b"<rss><channel><title>Caf&eacute;</title></channel></rss>",
            b"<rss><channel><title>Tom & Jerry</title></channel></rss>",
        ];
        for body in cases {
            let result = scan_document(body, None);
            assert!(result.is_err(), "accepted {}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn test_scan_accepts_predefined_entities_and_trailing_comments() {
        let body = br#"<?xml version="1.0"?>
<rss><channel><title>Q&amp;A &lt;daily&gt; &#233; &#x2014;</title>
<description><![CDATA[Tom & Jerry &nbsp;]]></description></channel></rss>
<!-- generated -->
"#;
        assert!(scan_document(body, None).unwrap().is_empty());
    }

    #[test]
    fn test_scan_skips_entity_check_with_internal_dtd() {
        let body = br#"<?xml version="1.0"?>
<!DOCTYPE rss [<!ENTITY brand "Example">]>
<rss><channel><title>&brand;</title></channel></rss>"#;
        assert!(scan_document(body, None).unwrap().is_empty());
    }

    #[test]
    fn test_entries_carry_stripped_text() {
        let body = r#"<rss version="2.0"><channel><title>T</title>
    <item><title>One</title><description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description></item>
    <item><title>Two</title></item>
</channel></rss>"#;
        let parsed = FeedRsParser.parse(body.as_bytes(), None).unwrap();
        assert_eq!(
            parsed.entries,
            vec![
                EntryText {
                    title: "One".to_string(),
                    text: "Hello world".to_string(),
                },
                EntryText {
                    title: "Two".to_string(),
                    text: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>a <em>b</em></p>\n c"), "a b c");
        assert_eq!(strip_tags("plain"), "plain");
    }

    #[test]
    fn test_media_type_and_charset() {
        assert_eq!(media_type("Text/XML; charset=UTF-8"), "text/xml");
        assert_eq!(charset("text/xml; Charset=UTF-8").as_deref(), Some("utf-8"));
        assert_eq!(charset("text/xml"), None);
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html(b"<!DOCTYPE html><html></html>"));
        assert!(looks_like_html(b"\n  <html lang=\"en\"><head>"));
        assert!(looks_like_html(b"<?xml version=\"1.0\"?><html><body/></html>"));
        assert!(!looks_like_html(RSS.as_bytes()));
        assert!(!looks_like_html(ATOM.as_bytes()));
        assert!(!looks_like_html(b"<not valid xml"));
    }
}
