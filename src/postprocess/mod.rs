//! Auxiliary passes that run after extraction and actions
//!
//! Each pass feeds the per-URL [`UrlAccumulator`]. Pass failures are logged
//! and skipped; they never fail the URL.

mod decode;
mod network;
mod urls;

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, warn};

pub use decode::{decode_field_value, decode_utf8, discover as discover_base64, try_decode_base64};
pub use network::{evaluate_network, filter_entries, is_media_entry};
pub use urls::{extract_urls, is_media_content_type, is_media_url};

use crate::automation::AutomationPage;
use crate::schema::FeatureFlags;
use crate::utils::ScrapeResult;

const INLINE_SCRIPTS_JS: &str = r#"(() => Array.from(document.querySelectorAll('script:not([src])')).map(s => s.textContent || '').join('\n'))()"#;

const SCRIPT_SOURCES_JS: &str =
    r#"(() => Array.from(document.querySelectorAll('script[src]')).map(s => s.src))()"#;

/// URL sets collected while processing one target URL
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UrlAccumulator {
    pub media_urls: BTreeSet<String>,
    pub hidden_links: BTreeSet<String>,
    pub decoded_urls: BTreeSet<String>,
}

impl UrlAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a URL recovered from base64; media URLs also join `media_urls`
    pub fn add_decoded(&mut self, url: String) {
        if is_media_url(&url) {
            self.media_urls.insert(url.clone());
        }
        self.decoded_urls.insert(url);
    }

    pub fn add_script_url(&mut self, url: String, media_aware: bool) {
        if media_aware && is_media_url(&url) {
            self.media_urls.insert(url.clone());
        }
        self.hidden_links.insert(url);
    }
}

/// Run every pass enabled in `features` against `page`
pub async fn run_pipeline<P: AutomationPage>(
    page: &P,
    features: &FeatureFlags,
    acc: &mut UrlAccumulator,
) {
    let base = page.current_url().await.ok();
    let base = base.as_deref();

    if features.media_capture
        && let Err(e) = capture_media(page, acc).await
    {
        warn!("Media capture pass failed: {}", e);
    }
    if features.hidden_links
        && let Err(e) = scan_inline_scripts(page, base, acc).await
    {
        warn!("Inline script scan failed: {}", e);
    }
    if features.scan_javascript
        && let Err(e) = scan_external_scripts(page, base, acc).await
    {
        warn!("External script scan failed: {}", e);
    }
    if features.base64_decode
        && let Err(e) = decode_page_base64(page, acc).await
    {
        warn!("Base64 discovery pass failed: {}", e);
    }
}

/// Media URLs from the captured request/response log
pub async fn capture_media<P: AutomationPage>(page: &P, acc: &mut UrlAccumulator) -> ScrapeResult<()> {
    for entry in page.network_log().await? {
        if is_media_entry(&entry) {
            acc.media_urls.insert(entry.url);
        }
    }
    Ok(())
}

pub async fn scan_inline_scripts<P: AutomationPage>(
    page: &P,
    base: Option<&str>,
    acc: &mut UrlAccumulator,
) -> ScrapeResult<()> {
    let text = match page.evaluate(INLINE_SCRIPTS_JS).await? {
        Value::String(text) => text,
        _ => return Ok(()),
    };
    let found = extract_urls(&text, base);
    debug!("Inline scripts mention {} URL(s)", found.len());
    for url in found {
        acc.add_script_url(url, false);
    }
    Ok(())
}

/// Fetch every external script and mine it for URLs
///
/// A script that cannot be fetched is skipped.
pub async fn scan_external_scripts<P: AutomationPage>(
    page: &P,
    base: Option<&str>,
    acc: &mut UrlAccumulator,
) -> ScrapeResult<()> {
    let sources = match page.evaluate(SCRIPT_SOURCES_JS).await? {
        Value::Array(items) => items,
        _ => return Ok(()),
    };
    for src in sources.iter().filter_map(Value::as_str) {
        match page.fetch_text(src).await {
            Ok(body) => {
                for url in extract_urls(&body, base) {
                    acc.add_script_url(url, true);
                }
            }
            Err(e) => warn!("Error fetching script {}: {}", src, e),
        }
    }
    Ok(())
}

/// Decode base64 tokens found anywhere in the serialized page
pub async fn decode_page_base64<P: AutomationPage>(page: &P, acc: &mut UrlAccumulator) -> ScrapeResult<()> {
    let markup = page.content().await?;
    for url in discover_base64(&markup) {
        acc.add_decoded(url);
    }
    Ok(())
}
