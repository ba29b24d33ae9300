// Shared scraper utilities
pub mod constants;
mod errors;
mod retry;
mod timeout;
mod wait_for_element;

pub use errors::{Lookup, ScrapeError, ScrapeResult};
pub use retry::{backoff_delay, retry_with_backoff};
pub use timeout::{validate_navigation_timeout, validate_selector_timeout};
pub use wait_for_element::wait_for_element;
