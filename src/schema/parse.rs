//! Schema document parsing and validation
//!
//! Accepts the camelCase keys of current schema files and the snake_case
//! spellings of older ones.

use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    ActionDescriptor, ActionKind, ActionTarget, ArrayField, Attribute, CollectField,
    DEFAULT_ACTION_RETRIES, DEFAULT_REGEX_SELECTOR, FeatureFlags, Field, HtmlField, ItemFilter,
    NetworkFilter, PostActionDescriptor, PropertyDescriptor, RESERVED_RESULT_KEYS, RegexField,
    SELF_SELECTOR, Schema, Selector, SelectorKind, Target, UrlTarget, ValueField,
};
use crate::utils::{ScrapeError, ScrapeResult};

/// Array fields with this name drop items whose `text` is blank unless told otherwise
const LINKS_FIELD: &str = "links";
const LINKS_TEXT_FIELD: &str = "text";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    url: Option<String>,
    #[serde(alias = "url_template")]
    url_template: Option<String>,
    #[serde(alias = "url_range")]
    url_range: Option<RawRange>,
    #[serde(default)]
    properties: Option<Value>,
    #[serde(default)]
    actions: Vec<Value>,
    #[serde(default, alias = "post_actions")]
    post_actions: Map<String, Value>,
    #[serde(default, alias = "enable_media_capture")]
    enable_media_capture: bool,
    #[serde(default, alias = "enable_hidden_links")]
    enable_hidden_links: bool,
    #[serde(default, alias = "enable_base64_decode")]
    enable_base64_decode: bool,
    #[serde(default, alias = "scan_javascript")]
    scan_javascript: bool,
    #[serde(default, alias = "max_page_scroll")]
    max_page_scroll: u32,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    start: i64,
    end: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperty {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(alias = "selector_type")]
    selector_type: Option<String>,
    selector: Option<String>,
    attribute: Option<String>,
    items: Option<Map<String, Value>>,
    pattern: Option<String>,
    filter: Option<RawFilter>,
    #[serde(default, alias = "process_base64")]
    process_base64: bool,
    #[serde(alias = "skip_empty")]
    skip_empty: Option<String>,
    methods: Option<Vec<String>>,
    #[serde(default, alias = "media_only")]
    media_only: bool,
    #[serde(default, alias = "include_body")]
    include_body: bool,
}

#[derive(Debug, Deserialize)]
struct RawFilter {
    attribute: String,
    pattern: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(alias = "selector_type")]
    selector_type: Option<String>,
    selector: Option<String>,
    #[serde(alias = "match_text")]
    match_text: Option<String>,
    value: Option<Value>,
    duration: Option<f64>,
    retries: Option<u32>,
}

pub(super) fn schema_from_value(value: Value) -> ScrapeResult<Schema> {
    let raw: RawSchema = serde_json::from_value(value)
        .map_err(|e| ScrapeError::Schema(format!("Malformed schema document: {e}")))?;

    let target = url_target(&raw)?;

    let properties = match raw.properties {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ScrapeError::Schema(format!(
                "'properties' must be an object, got {}",
                json_kind(&other)
            )));
        }
    };

    let properties = properties
        .into_iter()
        .map(|(name, value)| {
            let spec = reserved(&name).and_then(|()| property_from_value(&name, value, false));
            Field { name, spec }
        })
        .collect();

    let actions = raw
        .actions
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let label = value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            Field {
                name: format!("actions[{index}] ({label})"),
                spec: action_from_value(value),
            }
        })
        .collect();

    let post_actions = raw
        .post_actions
        .into_iter()
        .map(|(name, value)| {
            let spec = reserved(&name).and_then(|()| post_action_from_value(&name, value));
            Field { name, spec }
        })
        .collect();

    let schema = Schema {
        target,
        properties,
        actions,
        post_actions,
        features: FeatureFlags {
            media_capture: raw.enable_media_capture,
            hidden_links: raw.enable_hidden_links,
            base64_decode: raw.enable_base64_decode,
            scan_javascript: raw.scan_javascript,
        },
        max_page_scroll: raw.max_page_scroll,
    };

    for field in &schema.properties {
        if let Err(reason) = &field.spec {
            warn!("Property '{}' is misconfigured and will extract null: {}", field.name, reason);
        }
    }
    debug!(
        "Loaded schema for {} ({} properties, {} actions, {} post-actions)",
        schema.target.describe(),
        schema.properties.len(),
        schema.actions.len(),
        schema.post_actions.len()
    );

    Ok(schema)
}

fn url_target(raw: &RawSchema) -> ScrapeResult<UrlTarget> {
    match (&raw.url, &raw.url_template) {
        (Some(_), Some(_)) => Err(ScrapeError::Schema(
            "Schema must set exactly one of 'url' or 'urlTemplate', not both".into(),
        )),
        (None, None) => Err(ScrapeError::Schema(
            "No URL or URL template provided in schema".into(),
        )),
        (Some(url), None) => {
            if url.trim().is_empty() {
                return Err(ScrapeError::Schema("'url' cannot be empty".into()));
            }
            Ok(UrlTarget::Literal(url.clone()))
        }
        (None, Some(template)) => {
            let range = raw.url_range.as_ref().ok_or_else(|| {
                ScrapeError::Schema("'urlTemplate' requires 'urlRange' {start, end}".into())
            })?;
            if range.start > range.end {
                return Err(ScrapeError::Schema(format!(
                    "urlRange.start ({}) must not exceed urlRange.end ({})",
                    range.start, range.end
                )));
            }
            if !template.contains("{id}") {
                warn!("urlTemplate '{}' has no {{id}} placeholder; every URL will be identical", template);
            }
            Ok(UrlTarget::Template {
                template: template.clone(),
                start: range.start,
                end: range.end,
            })
        }
    }
}

fn property_from_value(name: &str, value: Value, nested: bool) -> Result<PropertyDescriptor, String> {
    let raw: RawProperty = serde_json::from_value(value).map_err(|e| e.to_string())?;
    property_from_raw(name, raw, nested)
}

fn property_from_raw(name: &str, raw: RawProperty, nested: bool) -> Result<PropertyDescriptor, String> {
    // Item sub-descriptors historically omit the type and mean "string"
    let kind = match raw.kind.as_deref() {
        Some(kind) => kind.to_ascii_lowercase(),
        None if nested => "string".to_string(),
        None => return Err("missing required 'type'".into()),
    };

    match kind.as_str() {
        "string" => Ok(PropertyDescriptor::String(ValueField {
            target: target(&raw, nested, None)?,
            attribute: raw.attribute.as_deref().map(Attribute::parse),
            process_base64: raw.process_base64,
        })),
        "html" => Ok(PropertyDescriptor::Html(HtmlField {
            target: target(&raw, nested, None)?,
        })),
        "regex" => {
            let pattern = raw
                .pattern
                .as_deref()
                .ok_or_else(|| format!("regex pattern required for '{name}'"))?;
            let target = target(&raw, nested, Some(DEFAULT_REGEX_SELECTOR))?;
            let read_markup = match &target {
                Target::Query(selector) => {
                    selector.expr.contains("script") || selector.expr.contains("iframe")
                }
                Target::SelfNode => false,
            };
            Ok(PropertyDescriptor::Regex(RegexField {
                target,
                pattern: compile(pattern)?,
                read_markup,
                process_base64: raw.process_base64,
            }))
        }
        "array" => {
            let array_target = target(&raw, nested, None)?;
            let items = raw
                .items
                .ok_or_else(|| format!("array field '{name}' requires 'items'"))?;
            let items = unwrap_legacy_items(items)
                .into_iter()
                .map(|(item_name, value)| {
                    let spec = property_from_value(&item_name, value, true);
                    Field {
                        name: item_name,
                        spec,
                    }
                })
                .collect();
            let filter = raw
                .filter
                .map(|filter| -> Result<ItemFilter, String> {
                    Ok(ItemFilter {
                        field: filter.attribute,
                        pattern: compile(&filter.pattern)?,
                    })
                })
                .transpose()?;
            let skip_empty = raw
                .skip_empty
                .or_else(|| (name == LINKS_FIELD).then(|| LINKS_TEXT_FIELD.to_string()));
            Ok(PropertyDescriptor::Array(ArrayField {
                target: array_target,
                items,
                filter,
                skip_empty,
            }))
        }
        other => Err(format!(
            "unknown property type '{other}' (expected string, array, regex or html)"
        )),
    }
}

/// Top-level fields share the result object with the engine's own keys
fn reserved(name: &str) -> Result<(), String> {
    if RESERVED_RESULT_KEYS.contains(&name) {
        Err(format!("'{name}' is a reserved result key; rename the field"))
    } else {
        Ok(())
    }
}

/// `items` is either the field mapping or `{ "properties": { ... } }`
fn unwrap_legacy_items(mut items: Map<String, Value>) -> Map<String, Value> {
    let is_wrapper = items.len() == 1
        && items
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|inner| inner.values().all(Value::is_object) && !inner.contains_key("type"));
    if is_wrapper {
        if let Some(Value::Object(inner)) = items.remove("properties") {
            return inner;
        }
    }
    items
}

fn target(raw: &RawProperty, nested: bool, default: Option<&str>) -> Result<Target, String> {
    let selector = match raw.selector.as_deref().or(default) {
        Some(selector) => selector,
        None => return Err("missing required 'selector'".into()),
    };
    if selector == SELF_SELECTOR {
        if !nested {
            return Err("'self' selector is only valid inside array items".into());
        }
        return Ok(Target::SelfNode);
    }
    let kind = SelectorKind::parse(raw.selector_type.as_deref()).map_err(|e| e.to_string())?;
    Ok(Target::Query(Selector {
        kind,
        expr: selector.to_string(),
    }))
}

fn action_from_value(value: Value) -> Result<ActionDescriptor, String> {
    let raw: RawAction = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let kind = raw
        .kind
        .as_deref()
        .map(str::to_ascii_lowercase)
        .ok_or("missing required 'type'")?;

    let target = match raw.selector.as_deref() {
        Some(selector) => Some(ActionTarget {
            selector: Selector {
                kind: SelectorKind::parse(raw.selector_type.as_deref()).map_err(|e| e.to_string())?,
                expr: selector.to_string(),
            },
            match_text: raw.match_text.as_deref().map(compile).transpose()?,
        }),
        None => None,
    };
    let value = raw.value.as_ref().map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    let require_target = |target: Option<ActionTarget>| {
        target.ok_or_else(|| format!("'{kind}' action requires a 'selector'"))
    };
    let require_value =
        |value: Option<String>| value.ok_or_else(|| format!("'{kind}' action requires a 'value'"));

    let action = match kind.as_str() {
        "click" => ActionKind::Click {
            target: require_target(target)?,
        },
        "write" | "fill" => ActionKind::Write {
            target: require_target(target)?,
            value: require_value(value)?,
        },
        "hover" => ActionKind::Hover {
            target: require_target(target)?,
        },
        "scroll" => ActionKind::Scroll,
        "wait" => {
            let seconds = raw.duration.unwrap_or(0.0);
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(format!("invalid wait duration {seconds}"));
            }
            ActionKind::Wait {
                duration: Duration::from_secs_f64(seconds),
            }
        }
        "keyboard" => ActionKind::Keyboard {
            target,
            key: require_value(value)?,
        },
        "goto" => ActionKind::Goto {
            url: require_value(value)?,
        },
        other => {
            return Err(format!(
                "unknown action type '{other}' (expected click, write, fill, scroll, wait, keyboard, goto or hover)"
            ));
        }
    };

    Ok(ActionDescriptor {
        kind: action,
        retries: raw.retries.unwrap_or(DEFAULT_ACTION_RETRIES).max(1),
    })
}

fn post_action_from_value(name: &str, value: Value) -> Result<PostActionDescriptor, String> {
    let raw: RawProperty = serde_json::from_value(value).map_err(|e| e.to_string())?;
    match raw.kind.as_deref() {
        Some("network") => {
            let methods = raw
                .methods
                .unwrap_or_else(|| vec!["GET".into(), "POST".into()])
                .into_iter()
                .map(|m| m.to_ascii_uppercase())
                .collect();
            Ok(PostActionDescriptor::Network(NetworkFilter {
                pattern: raw
                    .pattern
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(compile)
                    .transpose()?,
                methods,
                include_body: raw.include_body,
                media_only: raw.media_only,
            }))
        }
        None => {
            let selector = raw
                .selector
                .as_deref()
                .ok_or("post-action without a type requires a 'selector'")?;
            Ok(PostActionDescriptor::Collect(CollectField {
                selector: Selector {
                    kind: SelectorKind::parse(raw.selector_type.as_deref())
                        .map_err(|e| e.to_string())?,
                    expr: selector.to_string(),
                },
                attribute: raw.attribute.as_deref().map(Attribute::parse),
            }))
        }
        Some(_) => property_from_raw(name, raw, false).map(PostActionDescriptor::Property),
    }
}

/// Schema patterns are always case-insensitive
pub(crate) fn compile(pattern: &str) -> Result<Regex, String> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| format!("invalid pattern '{pattern}': {e}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
