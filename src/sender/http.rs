use crate::error::{TraceError, TraceResult};
use crate::sender::model::{self, Endpoint};
use crate::sender::Sender;
use crate::span::Span;
use futures_util::future::BoxFuture;
use std::time::Duration;

const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://localhost:9411/api/v2/spans";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts batches as Zipkin v2 JSON over HTTP.
///
/// One POST per batch; the collector's 2xx is success, anything else is a
/// [`TraceError::SenderFailure`] surfaced through the reporter's failure
/// counter (and to `flush`/`shutdown` callers).
#[derive(Debug)]
pub struct HttpSender {
    client: reqwest::blocking::Client,
    endpoint: String,
    local_endpoint: Option<Endpoint>,
}

impl HttpSender {
    /// Builder targeting the default local collector endpoint.
    pub fn builder() -> HttpSenderBuilder {
        HttpSenderBuilder::default()
    }

    fn post(&self, batch: Vec<Span>) -> TraceResult<()> {
        let body = serde_json::to_vec(
            &batch
                .iter()
                .map(|span| model::into_wire(span, self.local_endpoint.as_ref()))
                .collect::<Vec<_>>(),
        )
        .map_err(|err| TraceError::SenderFailure(Box::new(err)))?;

        self.client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| TraceError::SenderFailure(Box::new(err)))?;
        Ok(())
    }
}

impl Sender for HttpSender {
    fn send(&mut self, batch: Vec<Span>) -> BoxFuture<'static, TraceResult<()>> {
        // The blocking client is driven from the reporter's own thread, so
        // resolving eagerly here does not stall an executor.
        let result = self.post(batch);
        Box::pin(std::future::ready(result))
    }
}

#[derive(Debug)]
pub struct HttpSenderBuilder {
    endpoint: String,
    service_name: Option<String>,
    timeout: Duration,
}

impl Default for HttpSenderBuilder {
    fn default() -> Self {
        HttpSenderBuilder {
            endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_owned(),
            service_name: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpSenderBuilder {
    /// Collector URL to POST batches to.
    pub fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Service name reported as the spans' local endpoint.
    pub fn with_service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Per-request timeout. Defaults to ten seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> TraceResult<HttpSender> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| TraceError::SenderFailure(Box::new(err)))?;
        Ok(HttpSender {
            client,
            endpoint: self.endpoint,
            local_endpoint: self.service_name.map(Endpoint::new),
        })
    }
}
