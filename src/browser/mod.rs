//! Chrome-backed automation capability
//!
//! [`CdpContext`] owns the browser process for one job; [`CdpPage`] wraps a
//! single tab and records its network traffic from creation.

mod context;
mod network;
mod page;

pub use crate::browser_setup::{download_managed_browser, find_browser_executable};
pub use context::CdpContext;
pub use page::CdpPage;
