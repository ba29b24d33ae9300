//! chromiumoxide-backed [`AutomationPage`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::layout::Point;
use chromiumoxide::{Element, Page};
use chromiumoxide_cdp::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide_cdp::cdp::browser_protocol::network::{GetResponseBodyParams, RequestId};
use serde_json::Value;
use tracing::{debug, info};

use super::network::NetworkRecorder;
use crate::automation::{AutomationPage, BoundingBox, NavigationOutcome, NetworkEntry, Scope};
use crate::postprocess::decode_utf8;
use crate::schema::SelectorKind;
use crate::utils::{ScrapeError, ScrapeResult};

/// Attribute used to hand XPath matches over to a CSS query
const XPATH_MARKER: &str = "data-scrape-xpath";

const SCROLL_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";

const CLEAR_VALUE_JS: &str = "function() { this.value = ''; }";

/// One open tab plus the traffic captured on it
pub struct CdpPage {
    page: Page,
    recorder: NetworkRecorder,
    http: reqwest::Client,
    user_agent: String,
}

impl CdpPage {
    pub(crate) async fn attach(page: Page, http: reqwest::Client, user_agent: String) -> ScrapeResult<Self> {
        let recorder = NetworkRecorder::attach(&page).await?;
        Ok(Self {
            page,
            recorder,
            http,
            user_agent,
        })
    }

    /// Tag every element matched by `xpath` with a fresh marker, then select
    /// the marked elements with CSS so handles come back in document order
    async fn query_xpath(&self, scope: Scope<'_, Arc<Element>>, xpath: &str) -> ScrapeResult<Vec<Arc<Element>>> {
        let marker = uuid::Uuid::new_v4().to_string();
        let xpath_literal = serde_json::to_string(xpath).map_err(|e| ScrapeError::Json(e.to_string()))?;
        let body = format!(
            "const r = document.evaluate({xpath_literal}, ROOT, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             let n = 0; \
             for (let i = 0; i < r.snapshotLength; i++) {{ \
                 const el = r.snapshotItem(i); \
                 if (el.nodeType === 1) {{ el.setAttribute('{XPATH_MARKER}', '{marker}'); n++; }} \
             }} \
             return n;"
        );

        match scope {
            Scope::Document => {
                let script = format!("(() => {{ {} }})()", body.replace("ROOT", "document"));
                self.evaluate(&script).await?;
            }
            Scope::Node(element) => {
                let function = format!("function() {{ {} }}", body.replace("ROOT", "this"));
                element
                    .call_js_fn(function, false)
                    .await
                    .map_err(ScrapeError::automation)?;
            }
        }

        let selector = format!("[{XPATH_MARKER}='{marker}']");
        let found = self
            .page
            .find_elements(selector.as_str())
            .await
            .map_err(ScrapeError::automation)?;

        let cleanup = format!(
            "document.querySelectorAll(\"{selector}\").forEach(el => el.removeAttribute('{XPATH_MARKER}'))"
        );
        if let Err(e) = self.page.evaluate(cleanup).await {
            debug!("Failed to remove xpath markers: {}", e);
        }

        Ok(found.into_iter().map(Arc::new).collect())
    }

    async fn dispatch_mouse(&self, kind: DispatchMouseEventType, x: f64, y: f64) -> ScrapeResult<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(ScrapeError::automation)?;
        self.page.execute(params).await.map_err(ScrapeError::automation)?;
        Ok(())
    }

    /// Element that receives keys when no target is given
    async fn focused_element(&self) -> ScrapeResult<Element> {
        for selector in [":focus", "body"] {
            let mut found = self
                .page
                .find_elements(selector)
                .await
                .map_err(ScrapeError::automation)?;
            if !found.is_empty() {
                return Ok(found.remove(0));
            }
        }
        Err(ScrapeError::TargetNotFound {
            selector: ":focus".to_string(),
        })
    }
}

#[async_trait]
impl AutomationPage for CdpPage {
    type Node = Arc<Element>;

    async fn navigate(&self, url: &str, timeout: Duration) -> ScrapeResult<NavigationOutcome> {
        info!("Navigating to {}", url);
        let load = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation_response().await
        };

        let request = tokio::time::timeout(timeout, load)
            .await
            .map_err(|_| ScrapeError::NavigationFailure {
                url: url.to_string(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            })?
            .map_err(|e| ScrapeError::NavigationFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = request
            .as_ref()
            .and_then(|request| request.response.as_ref())
            .and_then(|response| u16::try_from(response.status).ok());
        debug!("Loaded {} with status {:?}", url, status);
        Ok(NavigationOutcome { status })
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        let url = self.page.url().await.map_err(ScrapeError::automation)?;
        Ok(url.unwrap_or_default())
    }

    async fn query_all(
        &self,
        scope: Scope<'_, Self::Node>,
        kind: SelectorKind,
        selector: &str,
    ) -> ScrapeResult<Vec<Self::Node>> {
        match kind {
            SelectorKind::Xpath => self.query_xpath(scope, selector).await,
            SelectorKind::Css => {
                let found = match scope {
                    Scope::Document => self.page.find_elements(selector).await,
                    Scope::Node(element) => element.find_elements(selector).await,
                }
                .map_err(ScrapeError::automation)?;
                Ok(found.into_iter().map(Arc::new).collect())
            }
        }
    }

    async fn text(&self, node: &Self::Node) -> ScrapeResult<Option<String>> {
        node.inner_text().await.map_err(ScrapeError::automation)
    }

    async fn inner_html(&self, node: &Self::Node) -> ScrapeResult<Option<String>> {
        node.inner_html().await.map_err(ScrapeError::automation)
    }

    async fn outer_html(&self, node: &Self::Node) -> ScrapeResult<Option<String>> {
        node.outer_html().await.map_err(ScrapeError::automation)
    }

    async fn attribute(&self, node: &Self::Node, name: &str) -> ScrapeResult<Option<String>> {
        node.attribute(name).await.map_err(ScrapeError::automation)
    }

    async fn content(&self) -> ScrapeResult<String> {
        self.page.content().await.map_err(ScrapeError::automation)
    }

    async fn evaluate(&self, script: &str) -> ScrapeResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(ScrapeError::automation)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn scroll_into_view(&self, node: &Self::Node) -> ScrapeResult<()> {
        node.scroll_into_view().await.map_err(ScrapeError::automation)?;
        Ok(())
    }

    async fn click(&self, node: &Self::Node) -> ScrapeResult<()> {
        // Clicking the point directly avoids chromiumoxide's visibility wait
        let point = node.clickable_point().await.map_err(ScrapeError::automation)?;
        self.page.click(point).await.map_err(ScrapeError::automation)?;
        Ok(())
    }

    async fn hover(&self, node: &Self::Node) -> ScrapeResult<()> {
        let point = node.clickable_point().await.map_err(ScrapeError::automation)?;
        self.page.move_mouse(point).await.map_err(ScrapeError::automation)?;
        Ok(())
    }

    async fn fill(&self, node: &Self::Node, value: &str) -> ScrapeResult<()> {
        self.click(node).await?;
        node.call_js_fn(CLEAR_VALUE_JS, false)
            .await
            .map_err(ScrapeError::automation)?;
        node.type_str(value).await.map_err(ScrapeError::automation)?;
        Ok(())
    }

    async fn press_key(&self, node: Option<&Self::Node>, key: &str) -> ScrapeResult<()> {
        match node {
            Some(element) => {
                element.press_key(key).await.map_err(ScrapeError::automation)?;
            }
            None => {
                let element = self.focused_element().await?;
                element.press_key(key).await.map_err(ScrapeError::automation)?;
            }
        }
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> ScrapeResult<()> {
        self.evaluate(SCROLL_BOTTOM_JS).await?;
        Ok(())
    }

    async fn bounding_box(&self, node: &Self::Node) -> ScrapeResult<Option<BoundingBox>> {
        match node.bounding_box().await {
            Ok(bbox) if bbox.width > 0.0 && bbox.height > 0.0 => Ok(Some(BoundingBox {
                x: bbox.x,
                y: bbox.y,
                width: bbox.width,
                height: bbox.height,
            })),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("No box model for element: {}", e);
                Ok(None)
            }
        }
    }

    async fn mouse_move(&self, x: f64, y: f64) -> ScrapeResult<()> {
        self.page
            .move_mouse(Point { x, y })
            .await
            .map_err(ScrapeError::automation)?;
        Ok(())
    }

    async fn mouse_down(&self, x: f64, y: f64) -> ScrapeResult<()> {
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y).await
    }

    async fn mouse_up(&self, x: f64, y: f64) -> ScrapeResult<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y).await
    }

    async fn network_log(&self) -> ScrapeResult<Vec<NetworkEntry>> {
        Ok(self.recorder.snapshot())
    }

    async fn response_body(&self, entry: &NetworkEntry) -> ScrapeResult<Option<String>> {
        let Some(request_id) = entry.request_id.as_deref() else {
            return Ok(None);
        };
        let params = GetResponseBodyParams::new(RequestId::new(request_id));
        match self.page.execute(params).await {
            Ok(response) if response.result.base64_encoded => Ok(decode_utf8(&response.result.body).ok()),
            Ok(response) => Ok(Some(response.result.body.clone())),
            // evicted from the buffer, or the request never completed
            Err(e) => {
                debug!("No body for {}: {}", entry.url, e);
                Ok(None)
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> ScrapeResult<String> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(ScrapeError::automation)?
            .error_for_status()
            .map_err(ScrapeError::automation)?;
        response.text().await.map_err(ScrapeError::automation)
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.recorder.stop();
        self.page.clone().close().await.map_err(ScrapeError::automation)
    }
}
