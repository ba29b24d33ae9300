//! URL discovery in free text (script bodies, decoded payloads)

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use url::Url;

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("built-in pattern failed to compile: {e}"))
}

/// Streaming manifests, progressive video, TS segments and key endpoints
static MEDIA_URL: Lazy<Regex> =
    Lazy::new(|| case_insensitive(r"\.(?:m3u8|mp4|mpd|ts|key)(?:\?.*)?$|key\.php"));

static ABSOLUTE_URL: Lazy<Regex> = Lazy::new(|| case_insensitive(r#"https?://[^\s'",<>()]+"#));

/// Quoted and player-config URL shapes commonly found in page scripts
static SCRIPT_URL: Lazy<Regex> = Lazy::new(|| {
    let battery = [
        r#"(?:"|'|\()(?:https?:)?//[a-zA-Z0-9_\-./?=&%+~#;:@\[\]()]+(?:"|'|\))"#,
        r#"["'`](?:https?:)?//[^"'`\s]+\.m3u8(?:\?[^"'`\s]*)?["'`]"#,
        r#"["'`](?:https?:)?//[^"'`\s]+\.mp4(?:\?[^"'`\s]*)?["'`]"#,
        r#"const\s+(?:url|src|path|baseUrl)\s*=\s*["'](?:https?:)?//[^"']+["']"#,
        r#"(?:file|source|src|url):\s*["'`](?:https?:)?//[^"'`\s]+\.(?:m3u8|mp4)(?:\?[^"'`\s]*)?["'`]"#,
    ];
    case_insensitive(&battery.join("|"))
});

/// Root-relative media paths inside quotes
static RELATIVE_MEDIA_URL: Lazy<Regex> = Lazy::new(|| {
    case_insensitive(r#"['"](/[^\s'",<>()]+\.(?:m3u8|mp4|ts|mpd)(?:\?[^\s'",<>()]*)?)['"]"#)
});

const WRAPPING: &[char] = &['\'', '"', '`', '(', ')', '[', ']', '{', '}'];

pub fn is_media_url(url: &str) -> bool {
    MEDIA_URL.is_match(url)
}

/// True when a response content type identifies streamable media
pub fn is_media_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.contains("video/")
        || content_type.contains("application/x-mpegurl")
        || content_type.contains("application/dash+xml")
}

/// Every unique absolute http(s) URL mentioned in `text`
///
/// Protocol-relative matches take the scheme of `base`, or `https:` without
/// one. Root-relative media paths are resolved against `base` when one is given.
pub fn extract_urls(text: &str, base: Option<&str>) -> Vec<String> {
    let base = base.and_then(|b| Url::parse(b).ok());
    let mut candidates: Vec<String> = ABSOLUTE_URL
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    for m in SCRIPT_URL.find_iter(text) {
        // Keep only the URL itself from `const url = "..."` / `file: "..."`
        let raw = m.as_str();
        let start = raw.find("//").map_or(0, |i| {
            let prefix = &raw[..i];
            if prefix.to_ascii_lowercase().ends_with("https:") {
                i - 6
            } else if prefix.to_ascii_lowercase().ends_with("http:") {
                i - 5
            } else {
                i
            }
        });
        let cleaned = raw[start..].trim_matches(WRAPPING);
        if cleaned.starts_with("//") {
            match base.as_ref().and_then(|b| b.join(cleaned).ok()) {
                Some(joined) => candidates.push(joined.to_string()),
                None => candidates.push(format!("https:{cleaned}")),
            }
        } else {
            candidates.push(cleaned.to_string());
        }
    }

    if let Some(base) = &base {
        for caps in RELATIVE_MEDIA_URL.captures_iter(text) {
            if let Ok(joined) = base.join(&caps[1]) {
                candidates.push(joined.to_string());
            }
        }
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|url| url.trim_matches(WRAPPING).to_string())
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_patterns() {
        assert!(is_media_url("https://cdn.test/live/master.m3u8"));
        assert!(is_media_url("https://cdn.test/v.MP4?token=1"));
        assert!(is_media_url("https://cdn.test/seg-001.ts"));
        assert!(is_media_url("https://cdn.test/key.php?id=4"));
        assert!(!is_media_url("https://cdn.test/app.js"));
        assert!(!is_media_url("https://cdn.test/types.tsx"));
    }

    #[test]
    fn media_content_types() {
        assert!(is_media_content_type("video/mp4"));
        assert!(is_media_content_type("application/x-mpegURL; charset=utf-8"));
        assert!(!is_media_content_type("text/html"));
    }

    #[test]
    fn finds_absolute_quoted_and_player_urls() {
        let script = r#"
            var a = "https://cdn.test/one.m3u8";
            player.setup({ file: '//media.test/two.mp4' });
            const src = 'https://api.test/config';
        "#;
        let urls: HashSet<_> = extract_urls(script, None).into_iter().collect();
        assert!(urls.contains("https://cdn.test/one.m3u8"));
        assert!(urls.contains("https://media.test/two.mp4"));
        assert!(urls.contains("https://api.test/config"));
        assert!(urls.iter().all(|u| !u.ends_with('"') && !u.ends_with('\'')));
    }

    #[test]
    fn resolves_root_relative_media_against_base() {
        let urls = extract_urls(r#"load("/hls/index.m3u8")"#, Some("https://site.test/watch/9"));
        assert_eq!(urls, vec!["https://site.test/hls/index.m3u8".to_string()]);
    }

    #[test]
    fn results_are_unique() {
        let text = "https://a.test/x https://a.test/x 'https://a.test/x'";
        assert_eq!(extract_urls(text, None), vec!["https://a.test/x".to_string()]);
    }

    #[test]
    fn protocol_relative_urls_follow_the_page_scheme() {
        let script = "player.setup({ file: '//media.test/two.mp4' });";
        let urls = extract_urls(script, Some("http://site.test/watch/9"));
        assert_eq!(urls, vec!["http://media.test/two.mp4".to_string()]);

        let urls = extract_urls(script, Some("https://site.test/watch/9"));
        assert_eq!(urls, vec!["https://media.test/two.mp4".to_string()]);
    }
}
