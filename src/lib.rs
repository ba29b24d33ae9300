//! Schema-driven web extraction over headless Chrome
//!
//! A JSON schema names the pages to visit, the fields to read from each page,
//! the interactions to perform, and the post-processing to run. [`run_job`]
//! interprets it against any [`AutomationContext`]; [`CdpContext`] is the
//! chromiumoxide-backed one used by the binary.

pub mod actions;
pub mod automation;
pub mod browser;
pub mod browser_setup;
pub mod extract;
pub mod job;
pub mod postprocess;
pub mod schema;
pub mod utils;

#[cfg(test)]
mod testing;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::constants::{
    CHROME_USER_AGENTS, DEFAULT_ACTION_SETTLE_MS, DEFAULT_BACKOFF_BASE_MS,
    DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_PAGE_LOAD_RETRIES, DEFAULT_SCROLL_PAUSE_MS,
    DEFAULT_SELECTOR_TIMEOUT_MS,
};
use crate::utils::{validate_navigation_timeout, validate_selector_timeout};

pub use actions::InteractionStyle;
pub use automation::{AutomationContext, AutomationPage};
pub use browser::{CdpContext, CdpPage};
pub use job::{ExtractionResult, JobOutput, JobSettings, run_job};
pub use schema::Schema;
pub use utils::{ScrapeError, ScrapeResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, certificate checks)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,

    /// User agents to rotate through; one is picked per launch.
    /// Empty means the built-in Chrome list.
    #[serde(default)]
    pub user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Timing and retry budget for extraction jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    #[serde(default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,

    #[serde(default = "default_page_load_retries")]
    pub page_load_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Pause after every action
    #[serde(default = "default_action_settle_ms")]
    pub action_settle_ms: u64,

    /// Pause between automatic scrolls before extraction
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    #[serde(default)]
    pub interaction: InteractionStyle,
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    false // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}
fn default_selector_timeout_ms() -> u64 {
    DEFAULT_SELECTOR_TIMEOUT_MS
}
fn default_page_load_retries() -> u32 {
    DEFAULT_PAGE_LOAD_RETRIES
}
fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}
fn default_action_settle_ms() -> u64 {
    DEFAULT_ACTION_SETTLE_MS
}
fn default_scroll_pause_ms() -> u64 {
    DEFAULT_SCROLL_PAUSE_MS
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            window: WindowConfig::default(),
            user_agents: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Random user agent from the configured list, else from the built-in one
    pub fn pick_user_agent(&self) -> String {
        let mut rng = rand::rng();
        let configured: Vec<&str> = self.user_agents.iter().map(String::as_str).collect();
        let pool: &[&str] = if configured.is_empty() {
            &CHROME_USER_AGENTS
        } else {
            &configured
        };
        pool.choose(&mut rng)
            .copied()
            .unwrap_or(CHROME_USER_AGENTS[0])
            .to_string()
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            selector_timeout_ms: default_selector_timeout_ms(),
            page_load_retries: default_page_load_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            action_settle_ms: default_action_settle_ms(),
            scroll_pause_ms: default_scroll_pause_ms(),
            interaction: InteractionStyle::default(),
        }
    }
}

impl ScrapeConfig {
    /// Validated runtime settings
    pub fn job_settings(&self) -> ScrapeResult<JobSettings> {
        use std::time::Duration;

        if self.page_load_retries == 0 {
            return Err(ScrapeError::invalid("page_load_retries must be at least 1"));
        }

        Ok(JobSettings {
            navigation_timeout: validate_navigation_timeout(
                Some(self.navigation_timeout_ms),
                DEFAULT_NAVIGATION_TIMEOUT_MS,
            )?,
            selector_timeout: validate_selector_timeout(
                Some(self.selector_timeout_ms),
                DEFAULT_SELECTOR_TIMEOUT_MS,
            )?,
            page_load_retries: self.page_load_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            action_settle: Duration::from_millis(self.action_settle_ms),
            scroll_pause: Duration::from_millis(self.scroll_pause_ms),
            interaction: self.interaction,
        })
    }
}

/// Load config from config.yaml in package root
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        load_config(&config_path)
    } else {
        Ok(Config::default())
    }
}

/// Load config from an explicit YAML file
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
