//! # Interceptors
//!
//! Call-boundary glue. The [`ServerInterceptor`] turns an incoming request
//! into an [`ActiveSpan`] whose context continues the caller's trace; the
//! [`ClientInterceptor`] opens a child span for an outgoing request and
//! writes its context into the outgoing headers. Both are thin wrappers
//! meant to be invoked from whatever middleware layer the host framework
//! provides.

use crate::context::TraceContext;
use crate::error::ExtractError;
use crate::propagation::{Extractor, Injector};
use crate::span::{SpanKind, SpanRecorder};
use crate::Tracing;

const SERVICE_NAME_TAG: &str = "service.name";
const OUTCOME_TAG: &str = "outcome";

/// An open span tied to one request.
///
/// Finishing (explicitly or on drop) hands the span to the reporter when
/// its context is sampled, and discards it otherwise.
#[derive(Debug)]
pub struct ActiveSpan {
    tracing: Tracing,
    recorder: SpanRecorder,
}

impl ActiveSpan {
    fn start(tracing: Tracing, context: TraceContext, name: &str, kind: SpanKind) -> Self {
        let mut recorder = SpanRecorder::start(context, name, kind);
        let _ = recorder.tag(SERVICE_NAME_TAG, tracing.service_name());
        ActiveSpan { tracing, recorder }
    }

    /// The context of this span, for example to hand to a
    /// [`ClientInterceptor`] for an outgoing call.
    pub fn context(&self) -> &TraceContext {
        self.recorder.context()
    }

    /// Add a string tag.
    pub fn tag<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        // Only fails after finish, which consumes the span.
        let _ = self.recorder.tag(key, value);
    }

    /// Close the span and report it if sampled.
    pub fn finish(mut self) {
        self.finish_inner();
    }

    fn finish_inner(&mut self) {
        if self.recorder.is_finished() {
            return;
        }
        if let Ok(span) = self.recorder.finish() {
            if span.context().is_sampled() {
                self.tracing.reporter().report(span);
            }
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.finish_inner();
    }
}

/// Continues traces across inbound requests.
#[derive(Clone, Debug)]
pub struct ServerInterceptor {
    tracing: Tracing,
}

impl ServerInterceptor {
    pub(crate) fn new(tracing: Tracing) -> Self {
        ServerInterceptor { tracing }
    }

    /// Open a server span for an incoming request.
    ///
    /// A valid extracted context is continued with a fresh span id and the
    /// incoming span as parent; a deferred sampling decision is resolved
    /// locally. Missing or malformed headers start a new root trace, never
    /// an error for the request path.
    pub fn on_request(&self, carrier: &dyn Extractor, name: &str) -> ActiveSpan {
        let context = match self.tracing.propagator().extract(carrier) {
            Ok(extracted) => {
                let resolved = self.tracing.sampler().resolve(extracted);
                resolved.new_child(self.tracing.id_generator().new_span_id())
            }
            Err(ExtractError::Absent) => self.tracing.new_root(),
            Err(err @ ExtractError::MalformedHeader { .. }) => {
                tracing::debug!(
                    name: "ServerInterceptor.MalformedContext",
                    error = %err,
                    message = "starting a new trace for a request with malformed context headers"
                );
                self.tracing.new_root()
            }
        };
        ActiveSpan::start(self.tracing.clone(), context, name, SpanKind::Server)
    }

    /// Run a handler inside a server span, tagging the outcome.
    pub fn handle<F, T, E>(&self, carrier: &dyn Extractor, name: &str, handler: F) -> Result<T, E>
    where
        F: FnOnce(&mut ActiveSpan) -> Result<T, E>,
    {
        let mut span = self.on_request(carrier, name);
        let result = handler(&mut span);
        span.tag(OUTCOME_TAG, if result.is_ok() { "success" } else { "error" });
        span.finish();
        result
    }
}

/// Propagates traces into outbound requests.
#[derive(Clone, Debug)]
pub struct ClientInterceptor {
    tracing: Tracing,
}

impl ClientInterceptor {
    pub(crate) fn new(tracing: Tracing) -> Self {
        ClientInterceptor { tracing }
    }

    /// Open a client span for an outgoing request and inject its context
    /// into the carrier.
    ///
    /// With a parent, the span continues the parent's trace; without one it
    /// starts a new root. Either way the injected headers describe the new
    /// client span, so the remote side sees it as its parent.
    pub fn on_request(
        &self,
        parent: Option<&TraceContext>,
        carrier: &mut dyn Injector,
        name: &str,
    ) -> ActiveSpan {
        let context = match parent {
            Some(parent) => {
                let resolved = self.tracing.sampler().resolve(parent.clone());
                resolved.new_child(self.tracing.id_generator().new_span_id())
            }
            None => self.tracing.new_root(),
        };
        self.tracing.propagator().inject(&context, carrier);
        ActiveSpan::start(self.tracing.clone(), context, name, SpanKind::Client)
    }

    /// Run an outgoing call inside a client span, tagging the outcome.
    pub fn call<F, T, E>(
        &self,
        parent: Option<&TraceContext>,
        carrier: &mut dyn Injector,
        name: &str,
        call: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut ActiveSpan) -> Result<T, E>,
    {
        let mut span = self.on_request(parent, carrier, name);
        let result = call(&mut span);
        span.tag(OUTCOME_TAG, if result.is_ok() { "success" } else { "error" });
        span.finish();
        result
    }
}
