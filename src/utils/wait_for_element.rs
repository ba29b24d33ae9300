//! Element polling utility for SPA support
//!
//! Provides wait_for_element() which polls for DOM elements with exponential backoff.
//! Single Page Applications render elements via JavaScript after the initial
//! load event fires, so a selector may need a moment before it attaches.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::automation::{AutomationPage, Scope};
use crate::schema::SelectorKind;
use crate::utils::{ScrapeError, ScrapeResult};

/// Wait until at least one node matches `selector`, polling with exponential backoff
///
/// # Returns
/// * `Ok(nodes)` - Every match at the moment the first one attached
/// * `Err(ScrapeError::ResolutionTimeout)` - Nothing attached within `timeout`
/// * `Err(_)` - The automation layer failed
///
/// # Polling Strategy
/// - Starts at 100ms intervals
/// - Doubles each retry (exponential backoff)
/// - Caps at 1 second maximum interval
/// - Total duration limited by timeout parameter
pub async fn wait_for_element<P: AutomationPage>(
    page: &P,
    scope: Scope<'_, P::Node>,
    kind: SelectorKind,
    selector: &str,
    timeout: Duration,
) -> ScrapeResult<Vec<P::Node>> {
    let start = Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        let nodes = page.query_all(scope, kind, selector).await?;
        if !nodes.is_empty() {
            return Ok(nodes);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ScrapeError::ResolutionTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis(),
            });
        }

        trace!("'{}' not attached yet, polling again in {:?}", selector, poll_interval);
        tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;

        poll_interval = (poll_interval * 2).min(max_interval);
    }
}
