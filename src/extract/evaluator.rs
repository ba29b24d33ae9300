//! Recursive property evaluation

use std::collections::HashSet;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::resolver::{resolve, resolve_first, resolve_target};
use super::value::extract_value;
use crate::automation::{AutomationPage, Scope};
use crate::postprocess::decode_field_value;
use crate::schema::{
    ArrayField, CollectField, Field, HtmlField, ItemFilter, PropertyDescriptor, RegexField,
    ValueField,
};
use crate::utils::{Lookup, ScrapeResult};

/// Evaluates property descriptors against one page
pub struct Extractor<'p, P: AutomationPage> {
    page: &'p P,
    selector_timeout: Duration,
}

impl<'p, P: AutomationPage> Extractor<'p, P> {
    pub fn new(page: &'p P, selector_timeout: Duration) -> Self {
        Self {
            page,
            selector_timeout,
        }
    }

    /// Evaluate every field in declared order
    ///
    /// A field that fails is logged and stored as `null`; its siblings are
    /// unaffected.
    pub async fn extract_all(&self, fields: &[Field<PropertyDescriptor>]) -> Map<String, Value> {
        let mut data = Map::new();
        for field in fields {
            if field.is_reserved() {
                warn!("Skipping field '{}': name is reserved for result metadata", field.name);
                continue;
            }
            let value = self.extract_field(field, Scope::Document).await;
            data.insert(field.name.clone(), value);
        }
        data
    }

    async fn extract_field(&self, field: &Field<PropertyDescriptor>, scope: Scope<'_, P::Node>) -> Value {
        let result = match field.spec() {
            Ok(descriptor) => self.evaluate(descriptor, scope).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!("Field '{}' failed: {}", field.name, e);
            Value::Null
        })
    }

    /// Evaluate one descriptor within `scope`
    pub fn evaluate<'a>(
        &'a self,
        descriptor: &'a PropertyDescriptor,
        scope: Scope<'a, P::Node>,
    ) -> BoxFuture<'a, ScrapeResult<Value>> {
        async move {
            match descriptor {
                PropertyDescriptor::String(field) => self.string(field, scope).await,
                PropertyDescriptor::Array(field) => self.array(field, scope).await,
                PropertyDescriptor::Regex(field) => self.regex(field, scope).await,
                PropertyDescriptor::Html(field) => self.html(field, scope).await,
            }
        }
        .boxed()
    }

    async fn string(&self, field: &ValueField, scope: Scope<'_, P::Node>) -> ScrapeResult<Value> {
        let node = match resolve_first(self.page, scope, &field.target, self.selector_timeout).await? {
            Lookup::Found(node) => node,
            Lookup::NotFound => {
                debug!("'{}' matched nothing", field.target.describe());
                return Ok(Value::Null);
            }
        };
        let value = extract_value(self.page, &node, field.attribute.as_ref()).await?;
        Ok(match value {
            Some(raw) if field.process_base64 => {
                Value::String(decode_field_value(&raw).unwrap_or(raw))
            }
            Some(raw) => Value::String(raw),
            None => Value::Null,
        })
    }

    async fn array(&self, field: &ArrayField, scope: Scope<'_, P::Node>) -> ScrapeResult<Value> {
        let elements = resolve_target(self.page, scope, &field.target, self.selector_timeout).await?;
        debug!("'{}' matched {} element(s)", field.target.describe(), elements.len());

        let mut items = Vec::with_capacity(elements.len());
        for element in &elements {
            let mut item = Map::new();
            for sub in &field.items {
                let value = self.extract_field(sub, Scope::Node(element)).await;
                item.insert(sub.name.clone(), value);
            }

            if let Some(key) = &field.skip_empty
                && is_blank(item.get(key))
            {
                continue;
            }
            if let Some(filter) = &field.filter
                && !keeps(filter, &item)
            {
                continue;
            }
            items.push(Value::Object(item));
        }
        Ok(Value::Array(items))
    }

    async fn regex(&self, field: &RegexField, scope: Scope<'_, P::Node>) -> ScrapeResult<Value> {
        let elements = resolve_target(self.page, scope, &field.target, self.selector_timeout).await?;
        // a single capture group selects what is kept
        let group = usize::from(field.pattern.captures_len() == 2);

        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for element in &elements {
            let text = if field.read_markup {
                self.page.inner_html(element).await?
            } else {
                self.page.text(element).await?
            };
            let Some(text) = text else { continue };
            for caps in field.pattern.captures_iter(&text) {
                if let Some(m) = caps.get(group)
                    && seen.insert(m.as_str().to_string())
                {
                    matches.push(m.as_str().to_string());
                }
            }
        }

        if field.process_base64 {
            let decoded: Vec<String> = matches.iter().filter_map(|m| decode_field_value(m)).collect();
            for value in decoded {
                if seen.insert(value.clone()) {
                    matches.push(value);
                }
            }
        }
        Ok(Value::Array(matches.into_iter().map(Value::String).collect()))
    }

    async fn html(&self, field: &HtmlField, scope: Scope<'_, P::Node>) -> ScrapeResult<Value> {
        match resolve_first(self.page, scope, &field.target, self.selector_timeout).await? {
            Lookup::Found(node) => Ok(self
                .page
                .outer_html(&node)
                .await?
                .map_or(Value::Null, Value::String)),
            Lookup::NotFound => Ok(Value::Null),
        }
    }

    /// Every distinct non-empty value read from all matches of `field.selector`
    pub async fn collect(&self, field: &CollectField) -> ScrapeResult<Value> {
        let nodes = resolve(self.page, Scope::Document, &field.selector, self.selector_timeout).await?;
        let mut values: Vec<String> = Vec::new();
        for node in &nodes {
            if let Some(value) = extract_value(self.page, node, field.attribute.as_ref()).await?
                && !value.is_empty()
                && !values.contains(&value)
            {
                values.push(value);
            }
        }
        if values.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::Array(values.into_iter().map(Value::String).collect()))
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn keeps(filter: &ItemFilter, item: &Map<String, Value>) -> bool {
    match item.get(&filter.field) {
        Some(Value::String(s)) => filter.pattern.is_match(s),
        None | Some(Value::Null) => filter.pattern.is_match(""),
        Some(other) => filter.pattern.is_match(&other.to_string()),
    }
}
