//! Shared configuration constants for the scraper
//!
//! Default values and configuration constants used throughout the codebase
//! to ensure consistency and avoid magic numbers.

/// Chrome user agent strings rotated per browser launch
///
/// Keep within a few releases of current stable so sites do not serve
/// legacy-browser fallbacks.
pub const CHROME_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
];

/// Navigation budget per attempt
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 60_000;

/// Bounded wait for a CSS selector to attach
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 20_000;

pub const DEFAULT_PAGE_LOAD_RETRIES: u32 = 3;

/// First retry delay; doubles per attempt
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Pause after each action so late media requests land in the network log
pub const DEFAULT_ACTION_SETTLE_MS: u64 = 2_000;

/// Pause between automatic scrolls before extraction
pub const DEFAULT_SCROLL_PAUSE_MS: u64 = 1_000;

/// Version reported in output metadata
pub const SCRAPER_VERSION: &str = env!("CARGO_PKG_VERSION");
