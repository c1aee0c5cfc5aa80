//! reqwest-backed transport
//!
//! Each dispatch runs on its own tokio task; aborting the request aborts the task.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method};
use tracing::debug;

use crate::config::HttpConfig;
use crate::domain::{Request, Response};

use super::completion::Completion;
use super::error::TransportError;
use super::{AbortHandle, Transport};

/// Transport that performs requests over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport from configuration
    pub fn from_config(config: &HttpConfig) -> Result<Self, TransportError> {
        debug!(base_url = ?config.base_url, timeout_ms = config.timeout_ms, "HttpTransport::from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout,
        })
    }

    /// Join relative URLs onto the configured base URL
    pub fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if url.starts_with('/') => format!("{}{}", base.trim_end_matches('/'), url),
            _ => url.to_string(),
        }
    }

    async fn send(client: Client, url: String, request: Request, timeout: Duration) -> Result<Response, TransportError> {
        let method = Method::from_bytes(request.method_or_default().as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?;
        debug!(%method, %url, "HttpTransport::send: called");

        let mut builder = client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| map_error(e, timeout))?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(|e| map_error(e, timeout))?;

        debug!(status, len = body.len(), "HttpTransport::send: response received");
        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

impl Transport for HttpTransport {
    fn dispatch(&self, request: Request, completion: Completion) -> Box<dyn AbortHandle> {
        let url = self.resolve_url(&request.url);
        let client = self.client.clone();
        let timeout = self.timeout;
        debug!(id = %completion.id(), %url, "HttpTransport::dispatch: called");

        let task = tokio::spawn(async move {
            let result = Self::send(client, url, request, timeout).await;
            completion.complete(result);
        });
        Box::new(task.abort_handle())
    }
}

fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestId;
    use crate::queue::CompletionEvent;
    use tokio::sync::mpsc;

    fn transport(base_url: Option<&str>) -> HttpTransport {
        HttpTransport::from_config(&HttpConfig {
            base_url: base_url.map(str::to_string),
            timeout_ms: 2_000,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_url() {
        let t = transport(Some("http://api.example.com/"));
        assert_eq!(t.resolve_url("/users"), "http://api.example.com/users");
        assert_eq!(t.resolve_url("http://other/x"), "http://other/x");

        let t = transport(None);
        assert_eq!(t.resolve_url("/users"), "/users");
    }

    #[tokio::test]
    async fn test_refused_connection_reports_failure() {
        let t = transport(Some("http://127.0.0.1:1"));
        let (tx, mut rx) = mpsc::unbounded_channel::<CompletionEvent>();
        let completion = Completion::new(RequestId::new(1), tx);

        let _abort = t.dispatch(Request::get("/unreachable"), completion);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("completion should be reported")
            .expect("channel open");
        assert_eq!(event.id, RequestId::new(1));
        assert!(event.result.is_err());
    }

    #[tokio::test]
    async fn test_abort_reports_dropped() {
        let t = transport(Some("http://10.255.255.1"));
        let (tx, mut rx) = mpsc::unbounded_channel::<CompletionEvent>();
        let completion = Completion::new(RequestId::new(2), tx);

        let abort = t.dispatch(Request::get("/slow"), completion);
        abort.abort();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("completion should be reported")
            .expect("channel open");
        assert!(event.result.is_err());
    }
}
