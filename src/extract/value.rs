//! Reading one representation of a matched node

use tracing::trace;
use url::Url;

use crate::automation::AutomationPage;
use crate::schema::Attribute;
use crate::utils::ScrapeResult;

/// Read `attribute` from `node`, or its trimmed text when none is requested
///
/// Values of href/src/data-src/data-url come back absolute, resolved
/// against the page's current URL.
pub async fn extract_value<P: AutomationPage>(
    page: &P,
    node: &P::Node,
    attribute: Option<&Attribute>,
) -> ScrapeResult<Option<String>> {
    match attribute {
        None => Ok(page.text(node).await?.map(|text| text.trim().to_string())),
        Some(Attribute::InnerHtml) => page.inner_html(node).await,
        Some(Attribute::OuterHtml) => page.outer_html(node).await,
        Some(attr @ Attribute::Named(name)) => {
            let raw = page.attribute(node, name).await?;
            match raw {
                Some(raw) if attr.is_url_like() => {
                    let base = page.current_url().await?;
                    Ok(Some(absolutize(&base, &raw)))
                }
                other => Ok(other),
            }
        }
    }
}

/// Resolve `raw` against `base`; unparseable input is returned unchanged
pub fn absolutize(base: &str, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match Url::parse(base).and_then(|base| base.join(raw)) {
        Ok(joined) => joined.to_string(),
        Err(e) => {
            trace!("Keeping '{}' as-is ({})", raw, e);
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, node};

    #[test]
    fn parent_relative_paths_are_resolved() {
        assert_eq!(absolutize("https://a.test/x/", "../y.jpg"), "https://a.test/y.jpg");
        assert_eq!(absolutize("https://a.test/x/", "/z"), "https://a.test/z");
        assert_eq!(absolutize("https://a.test/x/", "//cdn.test/v.mp4"), "https://cdn.test/v.mp4");
        assert_eq!(absolutize("https://a.test/x/", "https://b.test/"), "https://b.test/");
    }

    #[test]
    fn unusable_base_keeps_raw_value() {
        assert_eq!(absolutize("not a url", "../y.jpg"), "../y.jpg");
        assert_eq!(absolutize("https://a.test/", "   "), "");
    }

    #[tokio::test]
    async fn reads_each_representation() {
        let img = node("img")
            .text("  caption \n")
            .html("<b>caption</b>")
            .attr("src", "../y.jpg")
            .attr("alt", "pic")
            .build();
        let page = FakePage::new("https://a.test/x/");

        let text = extract_value(&page, &img, None).await.unwrap();
        assert_eq!(text.as_deref(), Some("caption"));

        let inner = extract_value(&page, &img, Some(&Attribute::InnerHtml)).await.unwrap();
        assert_eq!(inner.as_deref(), Some("<b>caption</b>"));

        let outer = extract_value(&page, &img, Some(&Attribute::OuterHtml)).await.unwrap();
        assert!(outer.unwrap().starts_with("<img "));

        let src = extract_value(&page, &img, Some(&Attribute::parse("src"))).await.unwrap();
        assert_eq!(src.as_deref(), Some("https://a.test/y.jpg"));

        let alt = extract_value(&page, &img, Some(&Attribute::parse("alt"))).await.unwrap();
        assert_eq!(alt.as_deref(), Some("pic"));

        let missing = extract_value(&page, &img, Some(&Attribute::parse("title"))).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn lazy_load_attributes_are_absolutized() {
        let thumb = node("div")
            .attr("data-src", "/thumb.jpg")
            .attr("data-url", "clips/4")
            .attr("data-id", "/not-a-link")
            .build();
        let page = FakePage::new("https://a.test/x/");

        let src = extract_value(&page, &thumb, Some(&Attribute::parse("data-src"))).await.unwrap();
        assert_eq!(src.as_deref(), Some("https://a.test/thumb.jpg"));

        let url = extract_value(&page, &thumb, Some(&Attribute::parse("data-url"))).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://a.test/x/clips/4"));

        let id = extract_value(&page, &thumb, Some(&Attribute::parse("data-id"))).await.unwrap();
        assert_eq!(id.as_deref(), Some("/not-a-link"));
    }
}
