//! Request/response capture for one page
//!
//! Listens to `Network.requestWillBeSent` and `Network.responseReceived` from
//! the moment the page is created, so traffic triggered by navigation and by
//! actions lands in the same log. Both event streams feed a single task, so
//! the log is only ever written from one place.

use std::collections::HashSet;
use std::sync::Arc;

use chromiumoxide::Page;
use chromiumoxide_cdp::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::automation::NetworkEntry;
use crate::utils::{ScrapeError, ScrapeResult};

/// The parts of a CDP network event the log keeps
#[derive(Debug, Clone)]
enum Traffic {
    Request {
        id: String,
        method: String,
        url: String,
        headers: Option<serde_json::Value>,
    },
    Response {
        id: String,
        url: String,
        status: Option<u16>,
        mime: String,
    },
}

impl From<Arc<EventRequestWillBeSent>> for Traffic {
    fn from(event: Arc<EventRequestWillBeSent>) -> Self {
        Traffic::Request {
            id: event.request_id.inner().to_string(),
            method: event.request.method.clone(),
            url: event.request.url.clone(),
            headers: serde_json::to_value(&event.request.headers).ok(),
        }
    }
}

impl From<Arc<EventResponseReceived>> for Traffic {
    fn from(event: Arc<EventResponseReceived>) -> Self {
        Traffic::Response {
            id: event.request_id.inner().to_string(),
            url: event.response.url.clone(),
            status: u16::try_from(event.response.status).ok(),
            mime: event.response.mime_type.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct TrafficLog {
    entries: Vec<NetworkEntry>,
    /// Entries created from a response whose request has not been seen yet
    orphaned: HashSet<String>,
}

impl TrafficLog {
    fn apply(&mut self, traffic: Traffic) {
        match traffic {
            Traffic::Request {
                id,
                method,
                url,
                headers,
            } => {
                if self.orphaned.remove(&id)
                    && let Some(entry) = self.latest_mut(&id)
                {
                    entry.method = method;
                    entry.url = url;
                    entry.headers = headers;
                    return;
                }
                self.entries.push(NetworkEntry {
                    request_id: Some(id),
                    method,
                    url,
                    headers,
                    ..Default::default()
                });
            }
            Traffic::Response { id, url, status, mime } => {
                if let Some(entry) = self.latest_mut(&id) {
                    entry.status = status;
                    entry.content_type = Some(mime);
                    return;
                }
                // request issued before the listener attached, or still in flight
                debug!("Response without recorded request: {}", url);
                self.orphaned.insert(id.clone());
                self.entries.push(NetworkEntry {
                    request_id: Some(id),
                    method: "GET".to_string(),
                    url,
                    status,
                    content_type: Some(mime),
                    ..Default::default()
                });
            }
        }
    }

    fn latest_mut(&mut self, id: &str) -> Option<&mut NetworkEntry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|entry| entry.request_id.as_deref() == Some(id))
    }
}

pub(crate) struct NetworkRecorder {
    log: Arc<Mutex<TrafficLog>>,
    task: JoinHandle<()>,
}

impl NetworkRecorder {
    /// Enable the Network domain on `page` and start listening
    pub(crate) async fn attach(page: &Page) -> ScrapeResult<Self> {
        if let Err(e) = page.execute(EnableParams::default()).await {
            warn!("Failed to enable Network domain: {}", e);
        }

        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(ScrapeError::automation)?
            .map(Traffic::from);
        let responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(ScrapeError::automation)?
            .map(Traffic::from);

        let log = Arc::new(Mutex::new(TrafficLog::default()));

        let task_log = log.clone();
        let task = tokio::spawn(async move {
            let mut events = stream::select(requests, responses);
            while let Some(traffic) = events.next().await {
                task_log.lock().apply(traffic);
            }
        });

        Ok(Self { log, task })
    }

    pub(crate) fn snapshot(&self) -> Vec<NetworkEntry> {
        self.log.lock().entries.clone()
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for NetworkRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
