//! Scripted in-memory automation capability for tests
//!
//! Selectors are not interpreted: each (kind, selector) pair maps to nodes
//! registered up front, per document or per parent node. Every interaction
//! is appended to an event log so tests can assert on what was driven.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::automation::{
    AutomationContext, AutomationPage, BoundingBox, NavigationOutcome, NetworkEntry, Scope,
};
use crate::schema::SelectorKind;
use crate::utils::{ScrapeError, ScrapeResult};

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(1);

type MatchKey = (SelectorKind, String);

#[derive(Debug)]
pub(crate) struct FakeNode {
    pub id: usize,
    tag: String,
    text: Option<String>,
    inner_html: Option<String>,
    attrs: HashMap<String, String>,
    children: HashMap<MatchKey, Vec<Arc<FakeNode>>>,
    bbox: Option<BoundingBox>,
}

/// Builder for [`FakeNode`]
pub(crate) struct NodeBuilder(FakeNode);

pub(crate) fn node(tag: &str) -> NodeBuilder {
    NodeBuilder(FakeNode {
        id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
        tag: tag.to_string(),
        text: None,
        inner_html: None,
        attrs: HashMap::new(),
        children: HashMap::new(),
        bbox: None,
    })
}

impl NodeBuilder {
    pub fn text(mut self, text: &str) -> Self {
        self.0.text = Some(text.to_string());
        self
    }

    pub fn html(mut self, inner: &str) -> Self {
        self.0.inner_html = Some(inner.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.0.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.0.bbox = Some(BoundingBox {
            x,
            y,
            width,
            height,
        });
        self
    }

    pub fn child(mut self, selector: &str, nodes: Vec<Arc<FakeNode>>) -> Self {
        self.0
            .children
            .entry((SelectorKind::Css, selector.to_string()))
            .or_default()
            .extend(nodes);
        self
    }

    pub fn build(self) -> Arc<FakeNode> {
        Arc::new(self.0)
    }
}

#[derive(Default)]
struct PageState {
    url: Mutex<String>,
    matches: Mutex<HashMap<MatchKey, Vec<Arc<FakeNode>>>>,
    /// Selector -> number of queries that still come back empty
    delayed: Mutex<HashMap<String, usize>>,
    content: Mutex<String>,
    evaluations: Mutex<Vec<(String, Value)>>,
    network: Mutex<Vec<NetworkEntry>>,
    bodies: Mutex<HashMap<String, String>>,
    resources: Mutex<HashMap<String, String>>,
    navigations: Mutex<VecDeque<ScrapeResult<NavigationOutcome>>>,
    failing: Mutex<HashSet<&'static str>>,
    events: Mutex<Vec<String>>,
    queries: AtomicUsize,
    closed: AtomicBool,
}

/// Cheap to clone; clones share state so tests keep a handle after the job
#[derive(Clone, Default)]
pub(crate) struct FakePage {
    state: Arc<PageState>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        let page = Self::default();
        *page.state.url.lock() = url.to_string();
        page
    }

    pub fn with(self, selector: &str, nodes: Vec<Arc<FakeNode>>) -> Self {
        self.with_kind(SelectorKind::Css, selector, nodes)
    }

    pub fn with_kind(self, kind: SelectorKind, selector: &str, nodes: Vec<Arc<FakeNode>>) -> Self {
        self.state
            .matches
            .lock()
            .entry((kind, selector.to_string()))
            .or_default()
            .extend(nodes);
        self
    }

    /// `selector` matches nothing for the first `polls` queries
    pub fn delayed(self, selector: &str, polls: usize) -> Self {
        self.state.delayed.lock().insert(selector.to_string(), polls);
        self
    }

    pub fn content(self, markup: &str) -> Self {
        *self.state.content.lock() = markup.to_string();
        self
    }

    /// Scripts containing `needle` evaluate to `value`
    pub fn evaluates(self, needle: &str, value: Value) -> Self {
        self.state.evaluations.lock().push((needle.to_string(), value));
        self
    }

    pub fn request(self, entry: NetworkEntry) -> Self {
        self.state.network.lock().push(entry);
        self
    }

    pub fn body(self, request_id: &str, body: &str) -> Self {
        self.state
            .bodies
            .lock()
            .insert(request_id.to_string(), body.to_string());
        self
    }

    pub fn resource(self, url: &str, text: &str) -> Self {
        self.state
            .resources
            .lock()
            .insert(url.to_string(), text.to_string());
        self
    }

    /// Queue navigation outcomes; once drained every navigation returns 200
    pub fn navigations(self, outcomes: Vec<ScrapeResult<NavigationOutcome>>) -> Self {
        self.state.navigations.lock().extend(outcomes);
        self
    }

    /// Make every call of the named operation fail
    pub fn failing(self, operation: &'static str) -> Self {
        self.state.failing.lock().insert(operation);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().clone()
    }

    pub fn count_events(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn query_count(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn record(&self, event: String) {
        self.state.events.lock().push(event);
    }

    fn check(&self, operation: &'static str) -> ScrapeResult<()> {
        if self.state.failing.lock().contains(operation) {
            return Err(ScrapeError::automation(format!("{operation} failed (scripted)")));
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationPage for FakePage {
    type Node = Arc<FakeNode>;

    async fn navigate(&self, url: &str, _timeout: Duration) -> ScrapeResult<NavigationOutcome> {
        self.record(format!("navigate:{url}"));
        self.check("navigate")?;
        let outcome = self
            .state
            .navigations
            .lock()
            .pop_front()
            .unwrap_or(Ok(NavigationOutcome { status: Some(200) }));
        if outcome.is_ok() {
            *self.state.url.lock() = url.to_string();
        }
        outcome
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        Ok(self.state.url.lock().clone())
    }

    async fn query_all(
        &self,
        scope: Scope<'_, Self::Node>,
        kind: SelectorKind,
        selector: &str,
    ) -> ScrapeResult<Vec<Self::Node>> {
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        self.check("query")?;
        {
            let mut delayed = self.state.delayed.lock();
            if let Some(remaining) = delayed.get_mut(selector)
                && *remaining > 0
            {
                *remaining -= 1;
                return Ok(Vec::new());
            }
        }
        let key = (kind, selector.to_string());
        let found = match scope {
            Scope::Document => self.state.matches.lock().get(&key).cloned(),
            Scope::Node(parent) => parent.children.get(&key).cloned(),
        };
        Ok(found.unwrap_or_default())
    }

    async fn text(&self, node: &Self::Node) -> ScrapeResult<Option<String>> {
        self.check("text")?;
        Ok(node.text.clone())
    }

    async fn inner_html(&self, node: &Self::Node) -> ScrapeResult<Option<String>> {
        Ok(node.inner_html.clone().or_else(|| node.text.clone()))
    }

    async fn outer_html(&self, node: &Self::Node) -> ScrapeResult<Option<String>> {
        let inner = node
            .inner_html
            .clone()
            .or_else(|| node.text.clone())
            .unwrap_or_default();
        let mut attrs: Vec<_> = node.attrs.iter().collect();
        attrs.sort();
        let attrs: String = attrs
            .into_iter()
            .map(|(k, v)| format!(" {k}=\"{v}\""))
            .collect();
        Ok(Some(format!("<{tag}{attrs}>{inner}</{tag}>", tag = node.tag)))
    }

    async fn attribute(&self, node: &Self::Node, name: &str) -> ScrapeResult<Option<String>> {
        Ok(node.attrs.get(name).cloned())
    }

    async fn content(&self) -> ScrapeResult<String> {
        Ok(self.state.content.lock().clone())
    }

    async fn evaluate(&self, script: &str) -> ScrapeResult<Value> {
        self.check("evaluate")?;
        let evaluations = self.state.evaluations.lock();
        Ok(evaluations
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn scroll_into_view(&self, node: &Self::Node) -> ScrapeResult<()> {
        self.record(format!("scroll_into_view:{}", node.id));
        Ok(())
    }

    async fn click(&self, node: &Self::Node) -> ScrapeResult<()> {
        self.record(format!("click:{}", node.id));
        self.check("click")
    }

    async fn hover(&self, node: &Self::Node) -> ScrapeResult<()> {
        self.record(format!("hover:{}", node.id));
        self.check("hover")
    }

    async fn fill(&self, node: &Self::Node, value: &str) -> ScrapeResult<()> {
        self.record(format!("fill:{}={value}", node.id));
        self.check("fill")
    }

    async fn press_key(&self, node: Option<&Self::Node>, key: &str) -> ScrapeResult<()> {
        match node {
            Some(node) => self.record(format!("key:{}={key}", node.id)),
            None => self.record(format!("key:{key}")),
        }
        self.check("key")
    }

    async fn scroll_to_bottom(&self) -> ScrapeResult<()> {
        self.record("scroll_bottom".to_string());
        self.check("scroll")
    }

    async fn bounding_box(&self, node: &Self::Node) -> ScrapeResult<Option<BoundingBox>> {
        Ok(node.bbox)
    }

    async fn mouse_move(&self, x: f64, y: f64) -> ScrapeResult<()> {
        self.record(format!("mouse_move:{x:.0},{y:.0}"));
        Ok(())
    }

    async fn mouse_down(&self, x: f64, y: f64) -> ScrapeResult<()> {
        self.record(format!("mouse_down:{x:.0},{y:.0}"));
        Ok(())
    }

    async fn mouse_up(&self, x: f64, y: f64) -> ScrapeResult<()> {
        self.record(format!("mouse_up:{x:.0},{y:.0}"));
        Ok(())
    }

    async fn network_log(&self) -> ScrapeResult<Vec<NetworkEntry>> {
        Ok(self.state.network.lock().clone())
    }

    async fn response_body(&self, entry: &NetworkEntry) -> ScrapeResult<Option<String>> {
        Ok(entry
            .request_id
            .as_ref()
            .and_then(|id| self.state.bodies.lock().get(id).cloned()))
    }

    async fn fetch_text(&self, url: &str) -> ScrapeResult<String> {
        self.record(format!("fetch:{url}"));
        self.state
            .resources
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::automation(format!("404 for {url}")))
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        self.record("close".to_string());
        Ok(())
    }
}

/// Hands out pre-scripted pages in order
#[derive(Default)]
pub(crate) struct FakeContext {
    pages: Mutex<VecDeque<FakePage>>,
    closed: AtomicUsize,
}

impl FakeContext {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationContext for FakeContext {
    type Page = FakePage;

    async fn open_page(&self) -> ScrapeResult<FakePage> {
        self.pages
            .lock()
            .pop_front()
            .ok_or_else(|| ScrapeError::automation("no scripted page left"))
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
