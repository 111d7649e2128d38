//! Shared fixtures for the coordinator integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]
#![allow(clippy::expect_used, reason = "Test assertions")]

use anyhow::{Error, anyhow};
use dom::{Document, NodeId};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use table_sync::{Coordinator, SyncConfig, SyncEvent, Transport};
use tokio::sync::broadcast::Receiver;
use tokio::sync::oneshot;
use url::Url;

pub const PAGE_URL: &str = "https://example.com/items/?status=active&page=3&q=foo";

pub const PAGE: &str = r#"<html><body>
<div class="iommi-part">
    <form class="iommi_filter" method="get" id="f1" data-iommi-errors="errors" data-iommi-id-of-table="t1">
        <input type="text" name="q" id="q" value="foo">
        <select name="status" id="status">
            <option value="">---</option>
            <option value="active" selected>Active</option>
            <option value="closed">Closed</option>
        </select>
        <input type="checkbox" name="mine" id="mine">
        <input type="file" name="upload" id="upload">
        <button data-iommi-filter-button id="filter_button">Filter</button>
    </form>
    <div class="iommi_query_error hidden" id="err1"><span></span></div>
</div>
<div class="iommi-table-container" id="c1">
    <table data-iommi-id="t1" data-endpoint="/tbody">
        <thead><tr><th class="iommi_sort_header"><a href="?order=name" id="sort_name">Name</a></th></tr></thead>
        <tbody><tr><td id="cell">row</td></tr></tbody>
    </table>
    <a class="iommi_page_link" href="?page=2" id="page2">2</a>
</div>
<div class="iommi-table-container" id="c2">
    <table data-iommi-id="t2" data-endpoint="/other_tbody"><tbody></tbody></table>
    <div data-iommi-page-parameter="t2/page" aria-label="Pages"></div>
</div>
</body></html>"#;

/// Scripted response for one request.
pub enum Reply {
    Json(Value),
    Fail(String),
    /// Resolves once the paired sender fires; never resolves if it is dropped unsent.
    Hold(oneshot::Receiver<Value>),
}

/// In-memory transport answering by endpoint marker in the request query.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<Vec<(String, VecDeque<Reply>)>>,
    fallback: Mutex<Vec<(String, Value)>>,
    requests: Mutex<Vec<Url>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `reply` for the next request whose query contains `marker`.
    pub fn reply(&self, marker: &str, reply: Reply) {
        let mut scripted = self.scripted.lock();
        if let Some((_, queue)) = scripted.iter_mut().find(|(known, _)| known == marker) {
            queue.push_back(reply);
        } else {
            scripted.push((marker.to_owned(), VecDeque::from([reply])));
        }
    }

    pub fn reply_json(&self, marker: &str, value: Value) {
        self.reply(marker, Reply::Json(value));
    }

    /// Queue a held reply and return the sender releasing it.
    pub fn hold(&self, marker: &str) -> oneshot::Sender<Value> {
        let (sender, receiver) = oneshot::channel();
        self.reply(marker, Reply::Hold(receiver));
        sender
    }

    /// Answer every otherwise unscripted request for `marker` with `value`.
    pub fn always(&self, marker: &str, value: Value) {
        self.fallback.lock().push((marker.to_owned(), value));
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, marker: &str) -> Vec<Url> {
        self.requests
            .lock()
            .iter()
            .filter(|url| url.query().is_some_and(|query| query.contains(marker)))
            .cloned()
            .collect()
    }

    fn next_reply(&self, url: &Url) -> Option<Reply> {
        let query = url.query().unwrap_or_default();
        let scripted = self
            .scripted
            .lock()
            .iter_mut()
            .find(|(marker, queue)| query.contains(marker.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());
        scripted.or_else(|| {
            self.fallback
                .lock()
                .iter()
                .find(|(marker, _)| query.contains(marker.as_str()))
                .map(|(_, value)| Reply::Json(value.clone()))
        })
    }
}

impl Transport for MockTransport {
    fn get_json(&self, url: &Url) -> BoxFuture<'static, Result<Value, Error>> {
        self.requests.lock().push(url.clone());
        let reply = self.next_reply(url);
        let url = url.clone();
        Box::pin(async move {
            match reply {
                None => Err(anyhow!("no scripted reply for {url}")),
                Some(Reply::Json(value)) => Ok(value),
                Some(Reply::Fail(message)) => Err(anyhow!(message)),
                Some(Reply::Hold(receiver)) => receiver
                    .await
                    .map_err(|_| anyhow!("held reply for {url} was dropped")),
            }
        })
    }
}

pub fn init_logging() {
    drop(env_logger::builder().is_test(true).try_init());
}

pub fn page_url() -> Url {
    Url::parse(PAGE_URL).expect("page url")
}

/// Coordinator over `html` loaded at `url`, with requests that never time out.
pub fn coordinator_at(html: &str, url: &str, transport: &Arc<MockTransport>) -> Coordinator {
    init_logging();
    let document = Document::parse(html).expect("page parses");
    let transport: Arc<MockTransport> = Arc::clone(transport);
    let url = Url::parse(url).expect("page url");
    Coordinator::new(document, url, transport, SyncConfig::new(None, 400, true))
}

pub fn coordinator_for(html: &str, transport: &Arc<MockTransport>) -> Coordinator {
    coordinator_at(html, PAGE_URL, transport)
}

pub fn coordinator(transport: &Arc<MockTransport>) -> Coordinator {
    coordinator_for(PAGE, transport)
}

pub fn node(coordinator: &Coordinator, id: &str) -> NodeId {
    coordinator.with_document(|document| {
        document
            .find_by_attribute_value(document.root(), "id", id)
            .expect("element with the given id")
    })
}

pub fn table_html(text: &str) -> Value {
    json!({
        "html": format!(
            r#"<table data-iommi-id="t1" data-endpoint="/tbody"><tbody><tr><td>{text}</td></tr></tbody></table><a class="iommi_page_link" href="?page=2" id="page2">2</a>"#
        )
    })
}

/// Every event received so far.
pub fn drain(receiver: &mut Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Short names of the events dispatched on `target`, in order.
pub fn kinds_for(events: &[SyncEvent], target: NodeId) -> Vec<&'static str> {
    events
        .iter()
        .filter(|event| event.target() == Some(target))
        .map(|event| match event {
            SyncEvent::LoadingStart { .. } => "start",
            SyncEvent::LoadingEnd { .. } => "end",
            SyncEvent::Populated { .. } => "populated",
            SyncEvent::Error { .. } => "error",
            SyncEvent::Invalid { .. } => "invalid",
            SyncEvent::RowInserted { .. } => "row",
            SyncEvent::InitStart | SyncEvent::InitEnd | SyncEvent::ReloadRequested => "page",
        })
        .collect()
}
