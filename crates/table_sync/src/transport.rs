use anyhow::{Error, anyhow};
use futures::future::BoxFuture;
use log::trace;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use url::Url;

/// Fetches JSON documents over GET.
///
/// The coordinator only ever issues GET requests and treats every response
/// body as JSON; hosts and tests swap in their own implementation.
pub trait Transport: Send + Sync {
    fn get_json(&self, url: &Url) -> BoxFuture<'static, Result<Value, Error>>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &Url) -> BoxFuture<'static, Result<Value, Error>> {
        let client = self.client.clone();
        let url = url.clone();
        Box::pin(async move {
            trace!("GET {url}");
            let response = client
                .get(url.clone())
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(|err| anyhow!("Failed to fetch URL {url}: {err}"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("Failed to fetch URL: {url} (Status: {status})"));
            }
            let body = response
                .bytes()
                .await
                .map_err(|err| anyhow!("Failed to read body of {url}: {err}"))?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Object(Map::new()));
            }
            serde_json::from_slice(&body)
                .map_err(|err| anyhow!("Invalid JSON from {url} (Status: {status}): {err}"))
        })
    }
}
