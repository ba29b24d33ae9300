//! Selector resolution against a document or an element scope

use std::time::Duration;

use tracing::debug;

use crate::automation::{AutomationPage, Scope};
use crate::schema::{Selector, SelectorKind, Target};
use crate::utils::{Lookup, ScrapeError, ScrapeResult, wait_for_element};

/// All matches for `selector` within `scope`, in document order
///
/// Document-wide CSS lookups first wait up to `timeout` for a match to
/// attach; running out of time yields an empty vector. Lookups inside an
/// element scope and XPath lookups query once.
pub async fn resolve<P: AutomationPage>(
    page: &P,
    scope: Scope<'_, P::Node>,
    selector: &Selector,
    timeout: Duration,
) -> ScrapeResult<Vec<P::Node>> {
    match (selector.kind, scope) {
        (SelectorKind::Css, Scope::Document) => {
            match wait_for_element(page, scope, SelectorKind::Css, &selector.expr, timeout).await {
                Ok(nodes) => Ok(nodes),
                Err(e) if e.is_not_found() => {
                    debug!("{}", e);
                    Ok(Vec::new())
                }
                Err(e) => Err(e),
            }
        }
        (kind, scope) => page.query_all(scope, kind, &selector.expr).await,
    }
}

/// Resolve a descriptor target, honouring the `self` sentinel
pub async fn resolve_target<P: AutomationPage>(
    page: &P,
    scope: Scope<'_, P::Node>,
    target: &Target,
    timeout: Duration,
) -> ScrapeResult<Vec<P::Node>> {
    match (target, scope) {
        (Target::SelfNode, Scope::Node(node)) => Ok(vec![node.clone()]),
        (Target::SelfNode, Scope::Document) => Err(ScrapeError::invalid(
            "'self' selector used outside an array item",
        )),
        (Target::Query(selector), scope) => resolve(page, scope, selector, timeout).await,
    }
}

/// First match of `target` in document order
pub async fn resolve_first<P: AutomationPage>(
    page: &P,
    scope: Scope<'_, P::Node>,
    target: &Target,
    timeout: Duration,
) -> ScrapeResult<Lookup<P::Node>> {
    let nodes = resolve_target(page, scope, target, timeout).await?;
    Ok(nodes.into_iter().next().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, node};

    const WAIT: Duration = Duration::from_secs(20);

    #[tokio::test(start_paused = true)]
    async fn css_timeout_is_empty_not_error() {
        let page = FakePage::new("https://a.test/");
        let started = tokio::time::Instant::now();
        let nodes = resolve(&page, Scope::Document, &Selector::css(".missing"), WAIT)
            .await
            .unwrap();
        assert!(nodes.is_empty());
        assert!(started.elapsed() >= WAIT);
        assert!(page.query_count() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn css_waits_for_late_nodes() {
        let item = node("li").text("late").build();
        let page = FakePage::new("https://a.test/")
            .with("li", vec![item.clone()])
            .delayed("li", 3);
        let nodes = resolve(&page, Scope::Document, &Selector::css("li"), WAIT)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, item.id);
        assert_eq!(page.query_count(), 4);
    }

    #[tokio::test]
    async fn xpath_queries_once() {
        let page = FakePage::new("https://a.test/");
        let selector = Selector {
            kind: SelectorKind::Xpath,
            expr: "//div".into(),
        };
        let nodes = resolve(&page, Scope::Document, &selector, WAIT).await.unwrap();
        assert!(nodes.is_empty());
        assert_eq!(page.query_count(), 1);
    }

    #[tokio::test]
    async fn element_scope_sees_only_descendants() {
        let inner = node("span").text("in").build();
        let card = node("div").child("span", vec![inner.clone()]).build();
        let page = FakePage::new("https://a.test/")
            .with("span", vec![node("span").text("out").build()]);
        let target = Target::Query(Selector::css("span"));
        let found = resolve_first(&page, Scope::Node(&card), &target, WAIT)
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(found.id, inner.id);
    }

    #[tokio::test]
    async fn self_target_needs_an_element() {
        let page = FakePage::new("https://a.test/");
        let card = node("div").build();
        let nodes = resolve_target(&page, Scope::Node(&card), &Target::SelfNode, WAIT)
            .await
            .unwrap();
        assert_eq!(nodes[0].id, card.id);
        let err = resolve_target(&page, Scope::Document, &Target::SelfNode, WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidConfiguration(_)));
    }
}
