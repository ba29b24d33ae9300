//! Page interactions declared in a schema's `actions` list

mod interaction;

use std::time::Duration;

use tracing::{debug, error, info, warn};

pub use interaction::InteractionStyle;

use crate::automation::{AutomationPage, Scope};
use crate::extract::resolve;
use crate::schema::{ActionDescriptor, ActionKind, ActionTarget, Field};
use crate::utils::{ScrapeError, ScrapeResult, retry_with_backoff};

/// Timing and style knobs for action execution
#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub style: InteractionStyle,
    pub selector_timeout: Duration,
    pub navigation_timeout: Duration,
    pub backoff_base: Duration,
    /// Pause after every successful action
    pub settle: Duration,
}

pub struct ActionExecutor<'p, P: AutomationPage> {
    page: &'p P,
    settings: ActionSettings,
}

impl<'p, P: AutomationPage> ActionExecutor<'p, P> {
    pub fn new(page: &'p P, settings: ActionSettings) -> Self {
        Self { page, settings }
    }

    /// Run `actions` in order, pausing after each
    ///
    /// A misconfigured action is skipped and the rest still run; its error is
    /// returned once the list is done. An action that exhausts its retries
    /// stops the list and its error is returned instead.
    pub async fn perform_all(&self, actions: &[Field<ActionDescriptor>]) -> ScrapeResult<()> {
        let mut skipped = None;
        for field in actions {
            let action = match field.spec() {
                Ok(action) => action,
                Err(e) => {
                    warn!("Skipping action {}", e);
                    skipped.get_or_insert(e);
                    continue;
                }
            };
            self.perform(action).await?;
            tokio::time::sleep(self.settings.settle).await;
        }
        skipped.map_or(Ok(()), Err)
    }

    /// Perform one action with up to `action.retries` attempts
    pub async fn perform(&self, action: &ActionDescriptor) -> ScrapeResult<()> {
        let name = action.name();
        retry_with_backoff(name, action.retries, self.settings.backoff_base, move |attempt| async move {
            debug!("{} attempt {}/{}", name, attempt + 1, action.retries);
            self.attempt(action).await
        })
        .await
        .map_err(|e| {
            error!("Action '{}' failed after {} attempt(s): {}", name, action.retries, e);
            ScrapeError::ActionFailure {
                action: name.to_string(),
                attempts: action.retries,
                reason: e.to_string(),
            }
        })
    }

    async fn attempt(&self, action: &ActionDescriptor) -> ScrapeResult<()> {
        let page = self.page;
        let style = self.settings.style;
        match &action.kind {
            ActionKind::Click { target } => {
                let node = self.locate(target).await?;
                style.click(page, &node).await
            }
            ActionKind::Write { target, value } => {
                let node = self.locate(target).await?;
                page.scroll_into_view(&node).await?;
                page.fill(&node, value).await
            }
            ActionKind::Hover { target } => {
                let node = self.locate(target).await?;
                style.hover(page, &node).await
            }
            ActionKind::Scroll => page.scroll_to_bottom().await,
            ActionKind::Wait { duration } => {
                tokio::time::sleep(*duration).await;
                Ok(())
            }
            ActionKind::Keyboard { target, key } => {
                let node = match target {
                    Some(target) => Some(self.locate(target).await?),
                    None => None,
                };
                page.press_key(node.as_ref(), key).await
            }
            ActionKind::Goto { url } => {
                info!("Navigating to {}", url);
                let outcome = page.navigate(url, self.settings.navigation_timeout).await?;
                if outcome.is_success() {
                    Ok(())
                } else {
                    Err(ScrapeError::NavigationFailure {
                        url: url.clone(),
                        reason: format!("HTTP status {}", outcome.status.unwrap_or_default()),
                    })
                }
            }
        }
    }

    /// First match of the target's selector, or the first whose text
    /// satisfies `match_text` when given
    async fn locate(&self, target: &ActionTarget) -> ScrapeResult<P::Node> {
        let nodes = resolve(
            self.page,
            Scope::Document,
            &target.selector,
            self.settings.selector_timeout,
        )
        .await?;

        let found = match &target.match_text {
            None => nodes.into_iter().next(),
            Some(pattern) => {
                let mut chosen = None;
                for node in nodes {
                    let text = self.page.text(&node).await?.unwrap_or_default();
                    if pattern.is_match(text.trim()) {
                        chosen = Some(node);
                        break;
                    }
                }
                chosen
            }
        };
        found.ok_or_else(|| ScrapeError::TargetNotFound {
            selector: target.selector.expr.clone(),
        })
    }
}
