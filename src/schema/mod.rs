//! Validated schema model
//!
//! A schema document is parsed once (see [`parse`]) into these types. Each
//! property, action and post-action is a sum type carrying only the fields
//! its kind uses. Entries that fail validation keep their error next to their
//! name so the failure surfaces only when that one entry is evaluated.

mod parse;

#[cfg(test)]
pub(crate) use parse::compile as parse_regex;

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::{ScrapeError, ScrapeResult};

/// Selector sentinel meaning "the matched array element itself"
pub const SELF_SELECTOR: &str = "self";

/// Default selector for regex fields that omit one
pub const DEFAULT_REGEX_SELECTOR: &str = "a";

/// Attribute names whose values are resolved against the page URL
pub const URL_ATTRIBUTES: [&str; 4] = ["href", "src", "data-src", "data-url"];

pub const DEFAULT_ACTION_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
}

impl SelectorKind {
    pub fn parse(value: Option<&str>) -> ScrapeResult<Self> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("css") => Ok(SelectorKind::Css),
            Some("xpath") => Ok(SelectorKind::Xpath),
            Some(other) => Err(ScrapeError::invalid(format!(
                "Invalid selector type '{other}' (expected css or xpath)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub kind: SelectorKind,
    pub expr: String,
}

impl Selector {
    pub fn css(expr: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Css,
            expr: expr.into(),
        }
    }
}

/// What a descriptor reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The scope node itself (`"selector": "self"`)
    SelfNode,
    Query(Selector),
}

impl Target {
    pub fn describe(&self) -> &str {
        match self {
            Target::SelfNode => SELF_SELECTOR,
            Target::Query(selector) => &selector.expr,
        }
    }
}

/// Requested representation of a matched node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    InnerHtml,
    OuterHtml,
    Named(String),
}

impl Attribute {
    pub fn parse(name: &str) -> Self {
        match name {
            "innerHTML" => Attribute::InnerHtml,
            "outerHTML" => Attribute::OuterHtml,
            other => Attribute::Named(other.to_string()),
        }
    }

    /// href/src/data-src/data-url values must come back absolute
    pub fn is_url_like(&self) -> bool {
        match self {
            Attribute::Named(name) => URL_ATTRIBUTES
                .iter()
                .any(|candidate| name.eq_ignore_ascii_case(candidate)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueField {
    pub target: Target,
    pub attribute: Option<Attribute>,
    pub process_base64: bool,
}

/// Keep an array item only when `field` matches `pattern`
#[derive(Debug, Clone)]
pub struct ItemFilter {
    pub field: String,
    pub pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct ArrayField {
    pub target: Target,
    pub items: Vec<Field<PropertyDescriptor>>,
    pub filter: Option<ItemFilter>,
    /// Drop items whose value for this item field is empty or whitespace
    pub skip_empty: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegexField {
    pub target: Target,
    pub pattern: Regex,
    /// Read inner markup instead of text (script/iframe selectors)
    pub read_markup: bool,
    pub process_base64: bool,
}

#[derive(Debug, Clone)]
pub struct HtmlField {
    pub target: Target,
}

/// One field's extraction rule
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    String(ValueField),
    Array(ArrayField),
    Regex(RegexField),
    Html(HtmlField),
}

impl PropertyDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyDescriptor::String(_) => "string",
            PropertyDescriptor::Array(_) => "array",
            PropertyDescriptor::Regex(_) => "regex",
            PropertyDescriptor::Html(_) => "html",
        }
    }
}

/// Keys every extraction result carries alongside the schema's own fields
pub const RESERVED_RESULT_KEYS: [&str; 5] =
    ["metadata", "error", "mediaUrls", "hiddenLinks", "decodedUrls"];

/// A named schema entry, or the reason it failed validation
#[derive(Debug, Clone)]
pub struct Field<T> {
    pub name: String,
    pub spec: Result<T, String>,
}

impl<T> Field<T> {
    pub fn spec(&self) -> ScrapeResult<&T> {
        self.spec
            .as_ref()
            .map_err(|reason| ScrapeError::InvalidConfiguration(format!("{}: {reason}", self.name)))
    }

    /// Named like a result key, so it can never appear in the output
    pub fn is_reserved(&self) -> bool {
        RESERVED_RESULT_KEYS.contains(&self.name.as_str())
    }
}

/// Element an action operates on
#[derive(Debug, Clone)]
pub struct ActionTarget {
    pub selector: Selector,
    /// Pick the first match whose text satisfies this pattern
    pub match_text: Option<Regex>,
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    Click { target: ActionTarget },
    Write { target: ActionTarget, value: String },
    Scroll,
    Wait { duration: Duration },
    Keyboard { target: Option<ActionTarget>, key: String },
    Goto { url: String },
    Hover { target: ActionTarget },
}

#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub retries: u32,
}

impl ActionDescriptor {
    pub fn name(&self) -> &'static str {
        match &self.kind {
            ActionKind::Click { .. } => "click",
            ActionKind::Write { .. } => "write",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait { .. } => "wait",
            ActionKind::Keyboard { .. } => "keyboard",
            ActionKind::Goto { .. } => "goto",
            ActionKind::Hover { .. } => "hover",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkFilter {
    /// URL pattern; `None` keeps every URL
    pub pattern: Option<Regex>,
    /// Upper-cased HTTP methods
    pub methods: Vec<String>,
    pub include_body: bool,
    pub media_only: bool,
}

/// Legacy post-action without a type: collect every match
#[derive(Debug, Clone)]
pub struct CollectField {
    pub selector: Selector,
    pub attribute: Option<Attribute>,
}

#[derive(Debug, Clone)]
pub enum PostActionDescriptor {
    Network(NetworkFilter),
    Property(PropertyDescriptor),
    Collect(CollectField),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub media_capture: bool,
    pub hidden_links: bool,
    pub base64_decode: bool,
    pub scan_javascript: bool,
}

/// Literal URL or templated id range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlTarget {
    Literal(String),
    Template {
        template: String,
        start: i64,
        end: i64,
    },
}

impl UrlTarget {
    /// One URL per id in `[start, end]`, ascending, or the literal URL
    pub fn expand(&self) -> Vec<String> {
        match self {
            UrlTarget::Literal(url) => vec![url.clone()],
            UrlTarget::Template {
                template,
                start,
                end,
            } => (*start..=*end)
                .map(|id| template.replace("{id}", &id.to_string()))
                .collect(),
        }
    }

    /// Value reported in the output metadata
    pub fn describe(&self) -> &str {
        match self {
            UrlTarget::Literal(url) => url,
            UrlTarget::Template { template, .. } => template,
        }
    }
}

/// Root descriptor. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Schema {
    pub target: UrlTarget,
    pub properties: Vec<Field<PropertyDescriptor>>,
    pub actions: Vec<Field<ActionDescriptor>>,
    pub post_actions: Vec<Field<PostActionDescriptor>>,
    pub features: FeatureFlags,
    pub max_page_scroll: u32,
}

impl Schema {
    pub fn from_json_str(input: &str) -> ScrapeResult<Self> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> ScrapeResult<Self> {
        parse::schema_from_value(value)
    }

    pub fn from_path(path: &Path) -> ScrapeResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ScrapeError::Io(format!("Failed to read schema {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|field| !field.is_reserved())
            .map(|field| field.name.as_str())
    }
}
