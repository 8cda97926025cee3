//! Cross-service scenarios exercising propagation, sampling, recording and
//! reporting together through the public API.

use cloudtrace::config::TracingConfig;
use cloudtrace::id_generator::IncrementIdGenerator;
use cloudtrace::propagation::{B3_PARENT_SPAN_ID_HEADER, B3_SAMPLED_HEADER, B3_TRACE_ID_HEADER};
use cloudtrace::sender::InMemorySender;
use cloudtrace::{Sampler, SamplingState, SpanKind, Tracing};
use std::collections::HashMap;

fn service(name: &str, sampler: Sampler) -> (Tracing, InMemorySender) {
    let sender = InMemorySender::new();
    let handle = sender.clone();
    let tracing = Tracing::builder()
        .with_config(
            TracingConfig::builder()
                .with_service_name(name)
                .with_sampling_policy(sampler)
                .with_extra_propagation_keys(["client-id"])
                .build(),
        )
        .with_id_generator(IncrementIdGenerator::new())
        .build(sender);
    (tracing, handle)
}

#[test]
fn one_trace_flows_across_three_services() {
    let (frontend, frontend_spans) = service("frontend", Sampler::AlwaysOn);
    let (billing, billing_spans) = service("billing", Sampler::AlwaysOn);
    let (ledger, ledger_spans) = service("ledger", Sampler::AlwaysOn);

    // Frontend originates the trace with an outgoing call.
    let mut to_billing: HashMap<String, String> = HashMap::new();
    let frontend_span =
        frontend
            .client_interceptor()
            .on_request(None, &mut to_billing, "POST /billing");
    let root_context = frontend_span.context().clone();

    // Billing continues it and fans out to ledger.
    let mut to_ledger: HashMap<String, String> = HashMap::new();
    let billing_result: Result<(), ()> =
        billing
            .server_interceptor()
            .handle(&to_billing, "POST /billing", |server_span| {
                let parent = server_span.context().clone();
                billing.client_interceptor().call(
                    Some(&parent),
                    &mut to_ledger,
                    "GET /ledger",
                    |_client_span| Ok(()),
                )
            });
    assert_eq!(billing_result, Ok(()));

    // Ledger handles the innermost request.
    let ledger_span = ledger
        .server_interceptor()
        .on_request(&to_ledger, "GET /ledger");
    let ledger_context = ledger_span.context().clone();
    ledger_span.finish();
    frontend_span.finish();

    frontend.shutdown().unwrap();
    billing.shutdown().unwrap();
    ledger.shutdown().unwrap();

    // One trace id everywhere.
    for spans in [
        frontend_spans.finished_spans(),
        billing_spans.finished_spans(),
        ledger_spans.finished_spans(),
    ] {
        assert!(!spans.is_empty());
        for span in &spans {
            assert_eq!(span.context().trace_id(), root_context.trace_id());
            assert!(span.context().is_sampled());
        }
    }

    // Each hop's parent is the span on the other side of the wire.
    let billing_server = &billing_spans.finished_spans()[1];
    assert_eq!(billing_server.kind(), SpanKind::Server);
    assert_eq!(
        billing_server.context().parent_span_id(),
        Some(root_context.span_id())
    );
    let billing_client = &billing_spans.finished_spans()[0];
    assert_eq!(billing_client.kind(), SpanKind::Client);
    assert_eq!(
        billing_client.context().parent_span_id(),
        Some(billing_server.context().span_id())
    );
    assert_eq!(
        ledger_context.parent_span_id(),
        Some(billing_client.context().span_id())
    );
}

#[test]
fn deferred_decision_is_resolved_once_and_propagated() {
    let (upstream, _) = service("upstream", Sampler::AlwaysOff);
    let (downstream, downstream_spans) = service("downstream", Sampler::AlwaysOn);

    // Headers with ids but no sampling header leave the decision open.
    let mut headers: HashMap<String, String> = HashMap::new();
    let span = upstream
        .client_interceptor()
        .on_request(None, &mut headers, "call");
    assert_eq!(span.context().sampling(), SamplingState::NotSampled);
    span.finish();
    headers.remove(B3_SAMPLED_HEADER);

    // Downstream resolves the deferred decision with its own policy and the
    // result sticks for the rest of the trace.
    let server_span = downstream.server_interceptor().on_request(&headers, "work");
    assert_eq!(server_span.context().sampling(), SamplingState::Sampled);

    let mut next_hop: HashMap<String, String> = HashMap::new();
    let parent = server_span.context().clone();
    let client_span =
        downstream
            .client_interceptor()
            .on_request(Some(&parent), &mut next_hop, "next");
    assert_eq!(next_hop.get(B3_SAMPLED_HEADER).map(String::as_str), Some("1"));
    client_span.finish();
    server_span.finish();

    downstream.shutdown().unwrap();
    assert_eq!(downstream_spans.finished_spans().len(), 2);
}

#[test]
fn upstream_veto_suppresses_reporting_downstream() {
    let (upstream, upstream_spans) = service("upstream", Sampler::AlwaysOff);
    let (downstream, downstream_spans) = service("downstream", Sampler::AlwaysOn);

    let mut headers: HashMap<String, String> = HashMap::new();
    let span = upstream
        .client_interceptor()
        .on_request(None, &mut headers, "call");
    assert_eq!(headers.get(B3_SAMPLED_HEADER).map(String::as_str), Some("0"));
    span.finish();

    let server_span = downstream.server_interceptor().on_request(&headers, "work");
    assert_eq!(server_span.context().sampling(), SamplingState::NotSampled);
    server_span.finish();

    upstream.shutdown().unwrap();
    downstream.shutdown().unwrap();
    assert!(upstream_spans.finished_spans().is_empty());
    assert!(downstream_spans.finished_spans().is_empty());
}

#[test]
fn malformed_incoming_context_does_not_poison_the_service() {
    let (tracing, spans) = service("api", Sampler::AlwaysOn);

    let mut headers: HashMap<String, String> = HashMap::new();
    headers.insert(B3_TRACE_ID_HEADER.to_owned(), "zzzz".to_owned());
    headers.insert("x-b3-spanid".to_owned(), "00f067aa0ba902b7".to_owned());

    let span = tracing.server_interceptor().on_request(&headers, "GET /");
    assert!(span.context().is_valid());
    assert!(span.context().parent_span_id().is_none());
    span.finish();

    tracing.shutdown().unwrap();
    assert_eq!(spans.finished_spans().len(), 1);
}

#[test]
fn extra_propagation_key_rides_along_the_whole_trace() {
    let (gateway, _) = service("gateway", Sampler::AlwaysOn);
    let (backend, _) = service("backend", Sampler::AlwaysOn);

    let mut incoming: HashMap<String, String> = HashMap::new();
    incoming.insert(B3_TRACE_ID_HEADER.to_owned(), "a".repeat(32));
    incoming.insert("x-b3-spanid".to_owned(), "b".repeat(16));
    incoming.insert(B3_SAMPLED_HEADER.to_owned(), "1".to_owned());
    incoming.insert("client-id".to_owned(), "mobile-app".to_owned());

    let server_span = gateway.server_interceptor().on_request(&incoming, "GET /");
    assert_eq!(
        server_span.context().extra_value("client-id"),
        Some("mobile-app")
    );

    let mut outgoing: HashMap<String, String> = HashMap::new();
    let parent = server_span.context().clone();
    let client_span =
        gateway
            .client_interceptor()
            .on_request(Some(&parent), &mut outgoing, "call backend");
    assert_eq!(outgoing.get("client-id").map(String::as_str), Some("mobile-app"));

    let backend_span = backend.server_interceptor().on_request(&outgoing, "work");
    assert_eq!(
        backend_span.context().extra_value("client-id"),
        Some("mobile-app")
    );

    backend_span.finish();
    client_span.finish();
    server_span.finish();
    gateway.shutdown().unwrap();
    backend.shutdown().unwrap();
}

#[test]
fn injected_headers_use_canonical_hex_forms() {
    let (tracing, _) = service("api", Sampler::AlwaysOn);

    let mut outgoing: HashMap<String, String> = HashMap::new();
    let root = tracing.new_root();
    let span = tracing
        .client_interceptor()
        .on_request(Some(&root), &mut outgoing, "call");

    let trace_id = &outgoing[B3_TRACE_ID_HEADER];
    let span_id = &outgoing["x-b3-spanid"];
    let parent_id = &outgoing[B3_PARENT_SPAN_ID_HEADER];
    assert_eq!(trace_id.len(), 32);
    assert_eq!(span_id.len(), 16);
    assert_eq!(parent_id.len(), 16);
    for value in [trace_id, span_id, parent_id] {
        assert!(value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    span.finish();
    tracing.shutdown().unwrap();
}
