//! Page automation capability consumed by the extraction interpreter
//!
//! The interpreter never talks to Chrome directly. Everything it needs from a
//! live page goes through [`AutomationPage`], and everything it needs from the
//! shared browser context goes through [`AutomationContext`]. The production
//! implementation lives in `crate::browser` on top of chromiumoxide.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::schema::SelectorKind;
use crate::utils::ScrapeResult;

/// Where a selector is evaluated
#[derive(Debug)]
pub enum Scope<'a, N> {
    /// The whole document
    Document,
    /// Descendants of a previously matched node
    Node(&'a N),
}

impl<N> Clone for Scope<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for Scope<'_, N> {}

/// Element geometry in CSS pixels, viewport relative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Result of loading a URL into a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationOutcome {
    /// HTTP status of the main document, when the capability could observe it
    pub status: Option<u16>,
}

impl NavigationOutcome {
    /// Unknown statuses count as success; only observed 4xx/5xx fail
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|status| status < 400)
    }
}

/// One captured request (and its response, once seen)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    /// Capability-specific handle used to fetch the response body later
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

/// Operations a single open page must expose
///
/// All methods are suspension points. Implementations report automation-layer
/// failures as `ScrapeError::Automation`; "nothing matched" is an empty
/// vector or `None`, never an error.
#[async_trait]
pub trait AutomationPage: Send + Sync {
    /// Handle to a matched DOM node
    type Node: Clone + Send + Sync;

    async fn navigate(&self, url: &str, timeout: Duration) -> ScrapeResult<NavigationOutcome>;

    async fn current_url(&self) -> ScrapeResult<String>;

    /// All matches for `selector` within `scope`, in document order
    async fn query_all(
        &self,
        scope: Scope<'_, Self::Node>,
        kind: SelectorKind,
        selector: &str,
    ) -> ScrapeResult<Vec<Self::Node>>;

    /// Rendered text of the node (untrimmed)
    async fn text(&self, node: &Self::Node) -> ScrapeResult<Option<String>>;

    async fn inner_html(&self, node: &Self::Node) -> ScrapeResult<Option<String>>;

    async fn outer_html(&self, node: &Self::Node) -> ScrapeResult<Option<String>>;

    async fn attribute(&self, node: &Self::Node, name: &str) -> ScrapeResult<Option<String>>;

    /// Serialized markup of the whole document
    async fn content(&self) -> ScrapeResult<String>;

    async fn evaluate(&self, script: &str) -> ScrapeResult<serde_json::Value>;

    async fn scroll_into_view(&self, node: &Self::Node) -> ScrapeResult<()>;

    async fn click(&self, node: &Self::Node) -> ScrapeResult<()>;

    async fn hover(&self, node: &Self::Node) -> ScrapeResult<()>;

    /// Replace the editable value of `node` with `value`
    async fn fill(&self, node: &Self::Node, value: &str) -> ScrapeResult<()>;

    /// Single key press, dispatched to `node` when given, else to the focused element
    async fn press_key(&self, node: Option<&Self::Node>, key: &str) -> ScrapeResult<()>;

    async fn scroll_to_bottom(&self) -> ScrapeResult<()>;

    async fn bounding_box(&self, node: &Self::Node) -> ScrapeResult<Option<BoundingBox>>;

    async fn mouse_move(&self, x: f64, y: f64) -> ScrapeResult<()>;

    async fn mouse_down(&self, x: f64, y: f64) -> ScrapeResult<()>;

    async fn mouse_up(&self, x: f64, y: f64) -> ScrapeResult<()>;

    /// Snapshot of the traffic captured since the page was opened
    async fn network_log(&self) -> ScrapeResult<Vec<NetworkEntry>>;

    async fn response_body(&self, entry: &NetworkEntry) -> ScrapeResult<Option<String>>;

    /// Text of an external resource, fetched outside the page's JS realm
    async fn fetch_text(&self, url: &str) -> ScrapeResult<String>;

    async fn close(&self) -> ScrapeResult<()>;
}

/// Shared browser context (cookies, storage, fingerprint) for one job
#[async_trait]
pub trait AutomationContext: Send + Sync {
    type Page: AutomationPage;

    async fn open_page(&self) -> ScrapeResult<Self::Page>;

    /// Tear down the context. Must be safe to call more than once.
    async fn close(&self) -> ScrapeResult<()>;
}
