//! Timeout validation utilities for page operations

use std::time::Duration;

use super::errors::{ScrapeError, ScrapeResult};

/// Maximum timeout for page navigation (5 minutes)
/// Covers slow-loading sites, heavy SPAs, and network delays
pub const MAX_NAVIGATION_TIMEOUT_MS: u64 = 300_000;

/// Maximum bounded wait for a selector to attach (60 seconds)
pub const MAX_SELECTOR_TIMEOUT_MS: u64 = 60_000;

/// Validate timeout for navigation operations
///
/// # Arguments
/// * `timeout_ms` - Optional timeout in milliseconds
/// * `default_ms` - Default timeout if None provided
///
/// # Returns
/// * `Ok(Duration)` - Validated Duration object
/// * `Err(ScrapeError::InvalidConfiguration)` - If timeout exceeds MAX_NAVIGATION_TIMEOUT_MS
pub fn validate_navigation_timeout(
    timeout_ms: Option<u64>,
    default_ms: u64,
) -> ScrapeResult<Duration> {
    let ms = timeout_ms.unwrap_or(default_ms);

    if ms > MAX_NAVIGATION_TIMEOUT_MS {
        return Err(ScrapeError::invalid(format!(
            "Navigation timeout cannot exceed {}ms ({} minutes). Received: {}ms ({:.1} minutes)",
            MAX_NAVIGATION_TIMEOUT_MS,
            MAX_NAVIGATION_TIMEOUT_MS / 60_000,
            ms,
            ms as f64 / 60_000.0
        )));
    }

    Ok(Duration::from_millis(ms))
}

/// Validate the bounded selector wait used by CSS resolution
pub fn validate_selector_timeout(
    timeout_ms: Option<u64>,
    default_ms: u64,
) -> ScrapeResult<Duration> {
    let ms = timeout_ms.unwrap_or(default_ms);

    if ms > MAX_SELECTOR_TIMEOUT_MS {
        return Err(ScrapeError::invalid(format!(
            "Selector timeout cannot exceed {}ms ({} seconds). Received: {}ms ({} seconds)",
            MAX_SELECTOR_TIMEOUT_MS,
            MAX_SELECTOR_TIMEOUT_MS / 1000,
            ms,
            ms / 1000
        )));
    }

    Ok(Duration::from_millis(ms))
}
