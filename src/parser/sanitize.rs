//! Text sanitization for plain-text storage fields
//!
//! Titles and excerpts arrive from the remote API as rendered HTML. Before
//! they are stored (or sent to the paraphraser) they are reduced to plain
//! text: scripts and styles dropped, tags stripped, entities decoded and
//! whitespace normalized.

use regex::Regex;
use std::sync::LazyLock;

// Pre-compiled regex patterns for performance
static SCRIPT_STYLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Reduce rendered HTML to a single line of plain text
///
/// # Examples
///
/// ```
/// use syndic::parser::sanitize::strip_all_tags;
///
/// let html = "<p>Breaking&nbsp;news: <strong>rates</strong> &amp; markets</p>\n";
/// assert_eq!(strip_all_tags(html), "Breaking news: rates & markets");
/// ```
pub fn strip_all_tags(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE_REGEX.replace_all(html, "");
    let without_tags = strip_html_tags(&without_scripts);
    let decoded = decode_html_entities(&without_tags);
    let visible = remove_zero_width(&decoded);

    WHITESPACE_REGEX
        .replace_all(visible.trim(), " ")
        .trim()
        .to_string()
}

/// Remove all tags, keeping their text content
///
/// # Examples
///
/// ```
/// use syndic::parser::sanitize::strip_html_tags;
///
/// let html = "<p>Hello <strong>World</strong></p>";
/// assert_eq!(strip_html_tags(html), "Hello World");
/// ```
pub fn strip_html_tags(html: &str) -> String {
    TAG_REGEX.replace_all(html, "").to_string()
}

/// Decode named and numeric HTML entities
///
/// Non-breaking spaces become regular spaces so that whitespace
/// normalization treats them like any other blank.
pub fn decode_html_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).replace('\u{a0}', " ")
}

/// Remove zero-width spaces and similar invisible characters
pub fn remove_zero_width(text: &str) -> String {
    text.chars()
        .filter(|c| {
            !matches!(*c,
                '\u{200B}'..='\u{200F}' |
                '\u{2028}'..='\u{202F}' |
                '\u{FEFF}'
            )
        })
        .collect()
}

/// Check if text contains meaningful content
pub fn has_content(text: &str) -> bool {
    !text.trim().is_empty()
}
