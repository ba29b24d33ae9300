//! Network log filtering for `type: "network"` post-actions

use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::urls::{is_media_content_type, is_media_url};
use crate::automation::{AutomationPage, NetworkEntry};
use crate::schema::NetworkFilter;
use crate::utils::ScrapeResult;

/// True when `entry` is media by URL shape or response content type
pub fn is_media_entry(entry: &NetworkEntry) -> bool {
    is_media_url(&entry.url)
        || entry
            .content_type
            .as_deref()
            .is_some_and(is_media_content_type)
}

/// Entries passing the method, URL and media filters, first occurrence per URL
pub fn filter_entries<'a>(entries: &'a [NetworkEntry], filter: &NetworkFilter) -> Vec<&'a NetworkEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|entry| {
            filter
                .methods
                .iter()
                .any(|method| method.eq_ignore_ascii_case(&entry.method))
        })
        .filter(|entry| filter.pattern.as_ref().is_none_or(|p| p.is_match(&entry.url)))
        .filter(|entry| !filter.media_only || is_media_entry(entry))
        .filter(|entry| seen.insert(entry.url.as_str()))
        .collect()
}

/// Evaluate a network post-action against the page's captured traffic
///
/// Returns the URL list, or `{method, url, status, responseBody}` objects when
/// bodies are requested. `null` when nothing matched.
pub async fn evaluate_network<P: AutomationPage>(
    page: &P,
    filter: &NetworkFilter,
) -> ScrapeResult<Value> {
    let log = page.network_log().await?;
    let matched = filter_entries(&log, filter);
    debug!("Network filter kept {} of {} requests", matched.len(), log.len());
    if matched.is_empty() {
        return Ok(Value::Null);
    }

    if !filter.include_body {
        return Ok(Value::Array(
            matched.into_iter().map(|e| Value::String(e.url.clone())).collect(),
        ));
    }

    let mut rows = Vec::with_capacity(matched.len());
    for entry in matched {
        let body = match entry.response_body.clone() {
            Some(body) => Some(body),
            None => page.response_body(entry).await.unwrap_or_else(|e| {
                warn!("Could not read response body for {}: {}", entry.url, e);
                None
            }),
        };
        rows.push(json!({
            "method": entry.method,
            "url": entry.url,
            "status": entry.status,
            "responseBody": body,
        }));
    }
    Ok(Value::Array(rows))
}
