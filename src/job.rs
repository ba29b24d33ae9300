//! Job orchestration: URL expansion, page loads, and per-URL aggregation
//!
//! URLs are processed one after another on pages opened from a single shared
//! context. A failure on one URL is recorded in that URL's result and the job
//! moves on; the context is closed once every URL has been visited.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::actions::{ActionExecutor, ActionSettings, InteractionStyle};
use crate::automation::{AutomationContext, AutomationPage, NavigationOutcome, Scope};
use crate::extract::Extractor;
use crate::postprocess::{UrlAccumulator, evaluate_network, run_pipeline};
use crate::schema::{Field, PostActionDescriptor, Schema};
use crate::utils::constants::{
    DEFAULT_ACTION_SETTLE_MS, DEFAULT_BACKOFF_BASE_MS, DEFAULT_NAVIGATION_TIMEOUT_MS,
    DEFAULT_PAGE_LOAD_RETRIES, DEFAULT_SCROLL_PAUSE_MS, DEFAULT_SELECTOR_TIMEOUT_MS,
    SCRAPER_VERSION,
};
use crate::utils::{ScrapeError, ScrapeResult, retry_with_backoff};

/// Runtime knobs for one job
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub page_load_retries: u32,
    pub backoff_base: Duration,
    pub action_settle: Duration,
    pub scroll_pause: Duration,
    pub interaction: InteractionStyle,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            selector_timeout: Duration::from_millis(DEFAULT_SELECTOR_TIMEOUT_MS),
            page_load_retries: DEFAULT_PAGE_LOAD_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            action_settle: Duration::from_millis(DEFAULT_ACTION_SETTLE_MS),
            scroll_pause: Duration::from_millis(DEFAULT_SCROLL_PAUSE_MS),
            interaction: InteractionStyle::default(),
        }
    }
}

impl JobSettings {
    fn action_settings(&self) -> ActionSettings {
        ActionSettings {
            style: self.interaction,
            selector_timeout: self.selector_timeout,
            navigation_timeout: self.navigation_timeout,
            backoff_base: self.backoff_base,
            settle: self.action_settle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlMetadata {
    pub url: String,
    pub final_url: Option<String>,
    pub status: Option<u16>,
}

/// Everything extracted from one target URL
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Property and post-action values keyed by field name
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_urls: Option<Vec<String>>,
    pub metadata: UrlMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// Result for a URL that could not be processed: every property is null
    pub fn failed(schema: &Schema, url: &str, reason: String) -> Self {
        let fields = schema
            .property_names()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        Self {
            fields,
            media_urls: None,
            hidden_links: None,
            decoded_urls: None,
            metadata: UrlMetadata {
                url: url.to_string(),
                final_url: None,
                status: None,
            },
            error: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobMetadata {
    pub timestamp: String,
    pub version: String,
    pub url: String,
}

/// Final document: one result per expanded URL, in expansion order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutput {
    pub metadata: JobMetadata,
    pub data: Vec<ExtractionResult>,
}

impl JobOutput {
    /// Union of the media URLs of every result
    pub fn media_urls(&self) -> BTreeSet<String> {
        self.data
            .iter()
            .filter_map(|result| result.media_urls.as_ref())
            .flatten()
            .cloned()
            .collect()
    }
}

/// Run `schema` against every URL it expands to, then close `context`
pub async fn run_job<C: AutomationContext>(
    context: &C,
    schema: &Schema,
    settings: &JobSettings,
) -> JobOutput {
    let urls = schema.target.expand();
    info!("Scraping {} URL(s) for {}", urls.len(), schema.target.describe());

    let mut data = Vec::with_capacity(urls.len());
    for url in &urls {
        data.push(scrape_url(context, schema, settings, url).await);
    }

    if let Err(e) = context.close().await {
        warn!("Failed to close browser context: {}", e);
    }

    let failed = data.iter().filter(|result| result.error.is_some()).count();
    info!("Job finished: {} URL(s), {} with errors", data.len(), failed);

    JobOutput {
        metadata: JobMetadata {
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: SCRAPER_VERSION.to_string(),
            url: schema.target.describe().to_string(),
        },
        data,
    }
}

async fn scrape_url<C: AutomationContext>(
    context: &C,
    schema: &Schema,
    settings: &JobSettings,
    url: &str,
) -> ExtractionResult {
    info!("Starting scraping job for {}", url);
    let page = match context.open_page().await {
        Ok(page) => page,
        Err(e) => {
            error!("Could not open a page for {}: {}", url, e);
            return ExtractionResult::failed(schema, url, e.to_string());
        }
    };

    let result = scrape_page(&page, schema, settings, url).await;

    if let Err(e) = page.close().await {
        warn!("Failed to close page for {}: {}", url, e);
    }
    result
}

/// Navigate with retry and exponential backoff
///
/// Error statuses (4xx/5xx) count as failed attempts.
pub async fn load_page<P: AutomationPage>(
    page: &P,
    url: &str,
    settings: &JobSettings,
) -> ScrapeResult<NavigationOutcome> {
    retry_with_backoff(
        "Page load",
        settings.page_load_retries,
        settings.backoff_base,
        move |_| async move {
            let outcome = page
                .navigate(url, settings.navigation_timeout)
                .await
                .map_err(|e| ScrapeError::NavigationFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            if outcome.is_success() {
                Ok(outcome)
            } else {
                Err(ScrapeError::NavigationFailure {
                    url: url.to_string(),
                    reason: format!("HTTP status {}", outcome.status.unwrap_or_default()),
                })
            }
        },
    )
    .await
}

async fn scrape_page<P: AutomationPage>(
    page: &P,
    schema: &Schema,
    settings: &JobSettings,
    url: &str,
) -> ExtractionResult {
    let outcome = match load_page(page, url, settings).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Failed after {} attempts: {}", settings.page_load_retries.max(1), e);
            return ExtractionResult::failed(schema, url, e.to_string());
        }
    };

    // lazy-loaded content
    for _ in 0..schema.max_page_scroll {
        if let Err(e) = page.scroll_to_bottom().await {
            warn!("Auto-scroll failed: {}", e);
            break;
        }
        tokio::time::sleep(settings.scroll_pause).await;
    }

    let extractor = Extractor::new(page, settings.selector_timeout);
    let mut fields = extractor.extract_all(&schema.properties).await;

    let mut error = None;
    if let Err(e) = ActionExecutor::new(page, settings.action_settings())
        .perform_all(&schema.actions)
        .await
    {
        warn!("Actions stopped for {}: {}", url, e);
        error = Some(e.to_string());
    }

    let mut acc = UrlAccumulator::new();
    run_pipeline(page, &schema.features, &mut acc).await;

    for field in schema.post_actions.iter().filter(|field| !field.is_reserved()) {
        let value = post_action(page, &extractor, field).await;
        fields.insert(field.name.clone(), value);
    }

    let features = schema.features;
    let UrlAccumulator {
        media_urls,
        hidden_links,
        decoded_urls,
    } = acc;
    if features.media_capture {
        info!("Captured {} media URL(s) on {}", media_urls.len(), url);
    }

    ExtractionResult {
        fields,
        media_urls: features.media_capture.then(|| media_urls.into_iter().collect()),
        hidden_links: features.hidden_links.then(|| hidden_links.into_iter().collect()),
        decoded_urls: features.base64_decode.then(|| decoded_urls.into_iter().collect()),
        metadata: UrlMetadata {
            url: url.to_string(),
            final_url: page.current_url().await.ok(),
            status: outcome.status,
        },
        error,
    }
}

async fn post_action<P: AutomationPage>(
    page: &P,
    extractor: &Extractor<'_, P>,
    field: &Field<PostActionDescriptor>,
) -> Value {
    let result = match field.spec() {
        Ok(PostActionDescriptor::Network(filter)) => evaluate_network(page, filter).await,
        Ok(PostActionDescriptor::Property(descriptor)) => {
            extractor.evaluate(descriptor, Scope::Document).await
        }
        Ok(PostActionDescriptor::Collect(collect)) => extractor.collect(collect).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        warn!("Post-action '{}' failed: {}", field.name, e);
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    use crate::automation::NetworkEntry;
    use crate::testing::{FakeContext, FakePage, node};

    fn settings() -> JobSettings {
        JobSettings {
            selector_timeout: Duration::from_millis(100),
            ..JobSettings::default()
        }
    }

    fn titled(url: &str, title: &str) -> FakePage {
        FakePage::new(url).with("h1", vec![node("h1").text(title).build()])
    }

    #[tokio::test(start_paused = true)]
    async fn template_produces_one_result_per_id_in_order() {
        let schema = Schema::from_value(json!({
            "urlTemplate": "https://x.test/{id}",
            "urlRange": { "start": 1, "end": 3 },
            "properties": { "title": { "type": "string", "selector": "h1" } }
        }))
        .unwrap();
        let pages = vec![titled("", "one"), titled("", "two"), titled("", "three")];
        let context = FakeContext::new(pages.clone());

        let output = run_job(&context, &schema, &settings()).await;

        assert_eq!(output.data.len(), 3);
        let urls: Vec<_> = output.data.iter().map(|r| r.metadata.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.test/1", "https://x.test/2", "https://x.test/3"]);
        let titles: Vec<_> = output.data.iter().map(|r| r.fields["title"].clone()).collect();
        assert_eq!(titles, vec![json!("one"), json!("two"), json!("three")]);
        assert_eq!(output.metadata.url, "https://x.test/{id}");
        assert!(pages.iter().all(FakePage::is_closed));
        assert_eq!(context.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_navigation_yields_null_fields_and_error() {
        let schema = Schema::from_value(json!({
            "url": "https://down.test/",
            "properties": {
                "title": { "type": "string", "selector": "h1" },
                "links": { "type": "array", "selector": "a", "items": { "text": { "selector": "self" } } }
            }
        }))
        .unwrap();
        let page = FakePage::new("about:blank").failing("navigate");
        let context = FakeContext::new(vec![page.clone()]);

        let output = run_job(&context, &schema, &settings()).await;

        assert_eq!(output.data.len(), 1);
        let result = &output.data[0];
        assert_eq!(result.fields.len(), 2);
        assert!(result.fields.values().all(Value::is_null));
        assert!(!result.error.as_deref().unwrap_or_default().is_empty());
        assert_eq!(page.count_events("navigate:"), 3);
        assert!(page.is_closed());
        assert_eq!(context.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_is_retried_then_recorded() {
        let schema = Schema::from_value(json!({
            "url": "https://a.test/",
            "properties": { "title": { "type": "string", "selector": "h1" } }
        }))
        .unwrap();
        let page = titled("", "ok").navigations(vec![
            Ok(NavigationOutcome { status: Some(502) }),
            Ok(NavigationOutcome { status: Some(200) }),
        ]);
        let context = FakeContext::new(vec![page.clone()]);

        let output = run_job(&context, &schema, &settings()).await;
        let result = &output.data[0];
        assert_eq!(result.error, None);
        assert_eq!(result.fields["title"], json!("ok"));
        assert_eq!(result.metadata.status, Some(200));
        assert_eq!(page.count_events("navigate:"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_url_does_not_stop_the_next_one() {
        let schema = Schema::from_value(json!({
            "urlTemplate": "https://x.test/{id}",
            "urlRange": { "start": 1, "end": 2 },
            "properties": { "title": { "type": "string", "selector": "h1" } }
        }))
        .unwrap();
        let context = FakeContext::new(vec![
            FakePage::new("").failing("navigate"),
            titled("", "second"),
        ]);
        let output = run_job(&context, &schema, &settings()).await;
        assert!(output.data[0].error.is_some());
        assert_eq!(output.data[1].fields["title"], json!("second"));
        assert_eq!(output.data[1].error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_page_is_recorded_per_url() {
        let schema = Schema::from_value(json!({
            "url": "https://a.test/",
            "properties": { "title": { "type": "string", "selector": "h1" } }
        }))
        .unwrap();
        let context = FakeContext::new(Vec::new());
        let output = run_job(&context, &schema, &settings()).await;
        assert_eq!(output.data[0].fields["title"], Value::Null);
        assert!(output.data[0].error.is_some());
        assert_eq!(context.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn action_failure_keeps_fields_and_post_processing() {
        let encoded = STANDARD.encode("https://cdn.test/secret/index.m3u8");
        let schema = Schema::from_value(json!({
            "url": "https://a.test/",
            "enableMediaCapture": true,
            "enableBase64Decode": true,
            "maxPageScroll": 2,
            "properties": { "title": { "type": "string", "selector": "h1" } },
            "actions": [
                { "type": "click", "selector": "#missing", "retries": 1 },
                { "type": "scroll" }
            ],
            "postActions": {
                "streams": { "type": "network", "pattern": "\\.m3u8" },
                "heading": { "type": "html", "selector": "h1" }
            }
        }))
        .unwrap();
        let page = titled("", "Show")
            .content(&format!("<script>var p = '{encoded}';</script>"))
            .request(NetworkEntry {
                method: "GET".into(),
                url: "https://cdn.test/live/chunklist.m3u8".into(),
                ..Default::default()
            });
        let context = FakeContext::new(vec![page.clone()]);

        let output = run_job(&context, &schema, &settings()).await;
        let result = &output.data[0];

        assert_eq!(result.fields["title"], json!("Show"));
        assert!(result.error.as_deref().unwrap().contains("click"));
        assert_eq!(page.count_events("scroll_bottom"), 2);
        assert_eq!(result.fields["streams"], json!(["https://cdn.test/live/chunklist.m3u8"]));
        assert_eq!(result.fields["heading"], json!("<h1>Show</h1>"));
        assert_eq!(
            result.decoded_urls,
            Some(vec!["https://cdn.test/secret/index.m3u8".to_string()])
        );
        assert_eq!(
            result.media_urls,
            Some(vec![
                "https://cdn.test/live/chunklist.m3u8".to_string(),
                "https://cdn.test/secret/index.m3u8".to_string(),
            ])
        );
        assert_eq!(result.hidden_links, None);
        assert_eq!(output.media_urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn serialized_result_flattens_fields() {
        let schema = Schema::from_value(json!({
            "url": "https://a.test/",
            "properties": { "title": { "type": "string", "selector": "h1" } }
        }))
        .unwrap();
        let context = FakeContext::new(vec![titled("", "Hi")]);
        let output = run_job(&context, &schema, &settings()).await;

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["metadata"]["version"], json!(SCRAPER_VERSION));
        assert!(value["data"].is_array());
        assert_eq!(
            value["data"][0],
            json!({
                "title": "Hi",
                "metadata": { "url": "https://a.test/", "finalUrl": "https://a.test/", "status": 200 }
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn field_named_like_a_result_key_never_shadows_it() {
        let schema = Schema::from_value(json!({
            "url": "https://a.test/",
            "properties": {
                "error": { "type": "string", "selector": ".banner" },
                "title": { "type": "string", "selector": "h1" }
            },
            "actions": [{ "type": "click", "selector": "#play", "retries": 1 }]
        }))
        .unwrap();
        let page = titled("", "Hi")
            .with(".banner", vec![node("div").text("site error banner").build()])
            .with("#play", vec![node("button").build()])
            .failing("click");
        let context = FakeContext::new(vec![page]);

        let output = run_job(&context, &schema, &settings()).await;
        let result = &output.data[0];
        assert!(!result.fields.contains_key("error"));

        let text = serde_json::to_string(result).unwrap();
        assert_eq!(text.matches("\"error\"").count(), 1);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value["error"].as_str().unwrap().contains("click"));
        assert_eq!(value["title"], json!("Hi"));
    }
}
