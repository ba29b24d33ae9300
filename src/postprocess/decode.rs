//! Base64 payload discovery
//!
//! Candidates are runs of at least 30 base64 alphabet characters, optionally
//! introduced by a `base64,` marker. A candidate survives only when it
//! decodes to UTF-8 that either is a URL or looks like JSON carrying URLs.
//! Every decode problem drops the candidate silently.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use super::urls::extract_urls;
use crate::utils::{ScrapeError, ScrapeResult};

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:base64,)?([A-Za-z0-9+/]{30,}={0,2})")
        .unwrap_or_else(|e| panic!("built-in pattern failed to compile: {e}"))
});

/// Decode a padded standard base64 string to UTF-8 text
pub fn decode_utf8(input: &str) -> ScrapeResult<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ScrapeError::DecodeFailure(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ScrapeError::DecodeFailure(e.to_string()))
}

/// URLs carried by one base64 candidate, or `None` when it carries none
///
/// A leading `base64,` marker (as in data URIs) is stripped first.
pub fn try_decode_base64(candidate: &str) -> Option<Vec<String>> {
    let payload = candidate
        .rsplit_once("base64,")
        .map_or(candidate, |(_, rest)| rest);
    let decoded = match decode_utf8(payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            trace!("Dropping base64 candidate: {}", e);
            return None;
        }
    };

    let lowered = decoded.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return Some(vec![decoded]);
    }
    if decoded.contains('{') && decoded.contains('}') {
        let urls = extract_urls(&decoded, None);
        if !urls.is_empty() {
            return Some(urls);
        }
    }
    None
}

/// Decoded replacement for a field value flagged with `processBase64`
pub fn decode_field_value(value: &str) -> Option<String> {
    try_decode_base64(value.trim()).map(|urls| urls.join("\n"))
}

/// Scan free text for base64 tokens and return every URL they decode to
pub fn discover(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for caps in TOKEN.captures_iter(text) {
        if let Some(urls) = try_decode_base64(&caps[1]) {
            for url in urls {
                if !found.contains(&url) {
                    found.push(url);
                }
            }
        }
    }
    found
}
