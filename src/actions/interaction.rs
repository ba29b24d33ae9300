//! Pointer interaction strategies

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::automation::{AutomationPage, BoundingBox};
use crate::utils::ScrapeResult;

/// How clicks and hovers are delivered to the page
///
/// `HumanLike` moves the mouse to a random point inside the element and
/// pauses between pointer events; `Deterministic` uses direct element calls
/// and never sleeps, which keeps tests reproducible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStyle {
    #[default]
    Deterministic,
    HumanLike,
}

impl InteractionStyle {
    /// Point to press inside `bbox`
    pub fn click_point(&self, bbox: &BoundingBox) -> (f64, f64) {
        match self {
            InteractionStyle::Deterministic => bbox.center(),
            InteractionStyle::HumanLike => (
                bbox.x + bbox.width * rand::random_range(0.25..0.75),
                bbox.y + bbox.height * rand::random_range(0.25..0.75),
            ),
        }
    }

    /// Short random pause between pointer events
    pub async fn pause(&self) {
        if let InteractionStyle::HumanLike = self {
            let millis = rand::random_range(80..250);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    pub async fn click<P: AutomationPage>(&self, page: &P, node: &P::Node) -> ScrapeResult<()> {
        page.scroll_into_view(node).await?;
        if *self == InteractionStyle::Deterministic {
            return page.click(node).await;
        }
        match page.bounding_box(node).await? {
            Some(bbox) => {
                let (x, y) = self.click_point(&bbox);
                page.mouse_move(x, y).await?;
                self.pause().await;
                page.mouse_down(x, y).await?;
                self.pause().await;
                page.mouse_up(x, y).await
            }
            // detached or zero-size: let the automation layer pick the point
            None => page.click(node).await,
        }
    }

    pub async fn hover<P: AutomationPage>(&self, page: &P, node: &P::Node) -> ScrapeResult<()> {
        page.scroll_into_view(node).await?;
        if *self == InteractionStyle::Deterministic {
            return page.hover(node).await;
        }
        match page.bounding_box(node).await? {
            Some(bbox) => {
                let (x, y) = self.click_point(&bbox);
                page.mouse_move(x, y).await?;
                self.pause().await;
                Ok(())
            }
            None => page.hover(node).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, node};

    #[test]
    fn human_points_stay_inside_the_box() {
        let bbox = BoundingBox {
            x: 100.0,
            y: 50.0,
            width: 40.0,
            height: 20.0,
        };
        assert_eq!(InteractionStyle::Deterministic.click_point(&bbox), (120.0, 60.0));
        for _ in 0..100 {
            let (x, y) = InteractionStyle::HumanLike.click_point(&bbox);
            assert!((110.0..130.0).contains(&x));
            assert!((55.0..65.0).contains(&y));
        }
    }

    #[test]
    fn style_names_match_config_spelling() {
        let style: InteractionStyle = serde_json::from_str("\"human_like\"").unwrap();
        assert_eq!(style, InteractionStyle::HumanLike);
    }

    #[tokio::test(start_paused = true)]
    async fn human_click_is_a_mouse_sequence() {
        let button = node("button").bbox(0.0, 0.0, 100.0, 40.0).build();
        let page = FakePage::new("https://a.test/");
        InteractionStyle::HumanLike.click(&page, &button).await.unwrap();
        let kinds: Vec<_> = page
            .events()
            .iter()
            .map(|e| e.split(':').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(kinds, vec!["scroll_into_view", "mouse_move", "mouse_down", "mouse_up"]);
    }

    #[tokio::test]
    async fn deterministic_click_uses_the_element() {
        let button = node("button").bbox(0.0, 0.0, 100.0, 40.0).build();
        let page = FakePage::new("https://a.test/");
        InteractionStyle::Deterministic.click(&page, &button).await.unwrap();
        assert_eq!(
            page.events(),
            vec![format!("scroll_into_view:{}", button.id), format!("click:{}", button.id)]
        );
    }
}
