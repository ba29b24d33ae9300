//! Browser lifecycle for one extraction job
//!
//! A job owns exactly one Chrome process with its own temporary profile.
//! Every page it opens shares that profile's cookies and storage.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::page::CdpPage;
use crate::BrowserConfig;
use crate::automation::AutomationContext;
use crate::utils::{ScrapeError, ScrapeResult};

/// Browser process plus its CDP handler task
///
/// The handler must be aborted once the browser is gone or it keeps
/// polling a dead websocket.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserSession {
    /// Remove the profile directory
    ///
    /// Only call after `browser.wait()` returned; Chrome holds file locks
    /// until the process exits.
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(path) = &self.user_data_dir {
            warn!(
                "Browser dropped without close(); temp directory orphaned: {}",
                path.display()
            );
        }
    }
}

/// chromiumoxide-backed [`AutomationContext`]
pub struct CdpContext {
    session: Mutex<Option<BrowserSession>>,
    http: reqwest::Client,
    user_agent: String,
}

impl CdpContext {
    /// Launch Chrome with a fresh profile directory
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let user_agent = config.pick_user_agent();
        let user_data_dir = std::env::temp_dir().join(format!(
            "schemascrape_chrome_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));

        let (browser, handler) =
            crate::browser_setup::launch_browser(config, &user_agent, Some(user_data_dir.clone())).await?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.disable_security)
            .build()?;

        Ok(Self {
            session: Mutex::new(Some(BrowserSession {
                browser,
                handler,
                user_data_dir: Some(user_data_dir),
            })),
            http,
            user_agent,
        })
    }
}

#[async_trait]
impl AutomationContext for CdpContext {
    type Page = CdpPage;

    async fn open_page(&self) -> ScrapeResult<CdpPage> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| ScrapeError::Automation("Browser already closed".to_string()))?;

        // Blank first so the network recorder sees the target's first request
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(ScrapeError::automation)?;
        drop(guard);

        CdpPage::attach(page, self.http.clone(), self.user_agent.clone()).await
    }

    async fn close(&self) -> ScrapeResult<()> {
        let mut guard = self.session.lock().await;

        if let Some(mut session) = guard.take() {
            info!("Shutting down browser");

            if let Err(e) = session.browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            if let Err(e) = session.browser.wait().await {
                warn!("Failed to wait for browser exit: {}", e);
            }
            session.cleanup_temp_dir();
        }

        Ok(())
    }
}
