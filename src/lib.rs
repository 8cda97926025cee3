//! Distributed-tracing instrumentation for services that talk to each other
//! over request/response transports.
//!
//! The crate covers the in-process half of tracing: continuing a trace
//! across call boundaries with B3 headers, deciding which traces to keep,
//! recording timed spans, and shipping finished spans to a collector in
//! batches without blocking request threads.
//!
//! # Getting started
//!
//! ```
//! use cloudtrace::config::TracingConfig;
//! use cloudtrace::sender::InMemorySender;
//! use cloudtrace::Tracing;
//! use std::collections::HashMap;
//!
//! let sender = InMemorySender::new();
//! let received = sender.clone();
//! let tracing = Tracing::builder()
//!     .with_config(TracingConfig::builder().with_service_name("client-service").build())
//!     .build(sender);
//!
//! // Inbound: continue (or start) a trace from request headers.
//! let headers: HashMap<String, String> = HashMap::new();
//! let mut span = tracing.server_interceptor().on_request(&headers, "GET /clients");
//! span.tag("http.status_code", "200");
//!
//! // Outbound: open a client span and inject its context downstream.
//! let parent = span.context().clone();
//! let mut outgoing: HashMap<String, String> = HashMap::new();
//! let client_span = tracing
//!     .client_interceptor()
//!     .on_request(Some(&parent), &mut outgoing, "call billing");
//! assert!(outgoing.contains_key("x-b3-traceid"));
//! client_span.finish();
//! span.finish();
//!
//! tracing.flush().unwrap();
//! assert_eq!(received.finished_spans().len(), 2);
//! tracing.shutdown().unwrap();
//! ```

#![warn(missing_debug_implementations, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod context;
pub mod error;
pub mod id_generator;
pub mod interceptor;
pub mod propagation;
pub mod reporter;
pub mod sampler;
pub mod sender;
pub mod span;

pub use config::TracingConfig;
pub use context::{SamplingState, SpanId, TraceContext, TraceId};
pub use error::{ExtractError, TraceError, TraceResult};
pub use interceptor::{ActiveSpan, ClientInterceptor, ServerInterceptor};
pub use reporter::{AsyncReporter, OverflowPolicy};
pub use sampler::Sampler;
pub use sender::Sender;
pub use span::{Span, SpanKind, SpanRecorder};

use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::propagation::B3Propagator;
use crate::reporter::AsyncReporterBuilder;
use std::sync::Arc;

#[derive(Debug)]
struct TracingInner {
    service_name: String,
    sampler: Sampler,
    propagator: B3Propagator,
    id_generator: Box<dyn IdGenerator>,
    reporter: AsyncReporter,
}

/// Entry point tying the tracing components together.
///
/// One `Tracing` per process is the expected shape. It is cheap to clone
/// (clones share the reporter) and hands out the interceptors that do the
/// per-request work.
#[derive(Clone, Debug)]
pub struct Tracing {
    inner: Arc<TracingInner>,
}

impl Tracing {
    /// Builder with default configuration.
    pub fn builder() -> TracingBuilder {
        TracingBuilder::default()
    }

    /// Interceptor for inbound requests.
    pub fn server_interceptor(&self) -> ServerInterceptor {
        ServerInterceptor::new(self.clone())
    }

    /// Interceptor for outbound requests.
    pub fn client_interceptor(&self) -> ClientInterceptor {
        ClientInterceptor::new(self.clone())
    }

    /// Start a brand new trace: fresh identifiers, sampling decided by the
    /// configured policy.
    pub fn new_root(&self) -> TraceContext {
        let trace_id = self.inner.id_generator.new_trace_id();
        let span_id = self.inner.id_generator.new_span_id();
        self.inner
            .sampler
            .resolve(TraceContext::new(trace_id, span_id))
    }

    /// Push everything queued so far through the sender.
    pub fn flush(&self) -> TraceResult<()> {
        self.inner.reporter.flush()
    }

    /// Flush and stop the reporter. Safe to call more than once.
    pub fn shutdown(&self) -> TraceResult<()> {
        self.inner.reporter.shutdown()
    }

    /// Spans discarded by the reporter so far.
    pub fn dropped_spans(&self) -> usize {
        self.inner.reporter.dropped_spans()
    }

    /// Batches the sender rejected so far.
    pub fn failed_batches(&self) -> usize {
        self.inner.reporter.failed_batches()
    }

    pub(crate) fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub(crate) fn sampler(&self) -> &Sampler {
        &self.inner.sampler
    }

    pub(crate) fn propagator(&self) -> &B3Propagator {
        &self.inner.propagator
    }

    pub(crate) fn id_generator(&self) -> &dyn IdGenerator {
        self.inner.id_generator.as_ref()
    }

    pub(crate) fn reporter(&self) -> &AsyncReporter {
        &self.inner.reporter
    }
}

/// Assembles a [`Tracing`] instance from a config and a sender.
#[derive(Debug)]
pub struct TracingBuilder {
    config: TracingConfig,
    id_generator: Box<dyn IdGenerator>,
}

impl Default for TracingBuilder {
    fn default() -> Self {
        TracingBuilder {
            config: TracingConfig::default(),
            id_generator: Box::new(RandomIdGenerator::default()),
        }
    }
}

impl TracingBuilder {
    pub fn with_config(mut self, config: TracingConfig) -> Self {
        self.config = config;
        self
    }

    /// Swap the identifier source, mostly useful in tests.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, generator: G) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    /// Spawn the reporter around `sender` and assemble the instance.
    pub fn build<S>(self, sender: S) -> Tracing
    where
        S: Sender + 'static,
    {
        let config = self.config;
        let propagator = if config.extra_propagation_keys.is_empty() {
            B3Propagator::new()
        } else {
            B3Propagator::with_extra_keys(config.extra_propagation_keys.clone())
        };
        let reporter = AsyncReporterBuilder::default()
            .with_batch_size(config.batch_size)
            .with_queue_capacity(config.queue_capacity)
            .with_flush_interval(config.flush_interval)
            .with_overflow_policy(config.overflow_policy)
            .with_shutdown_timeout(config.shutdown_timeout)
            .build(sender);
        Tracing {
            inner: Arc::new(TracingInner {
                service_name: config.service_name,
                sampler: config.sampling_policy,
                propagator,
                id_generator: self.id_generator,
                reporter,
            }),
        }
    }
}
