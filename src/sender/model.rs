//! Zipkin v2 JSON wire model.

use crate::span::{Span, SpanKind};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum Kind {
    Client,
    Server,
    Producer,
    Consumer,
}

impl From<SpanKind> for Kind {
    fn from(kind: SpanKind) -> Self {
        match kind {
            SpanKind::Client => Kind::Client,
            SpanKind::Server => Kind::Server,
            SpanKind::Producer => Kind::Producer,
            SpanKind::Consumer => Kind::Consumer,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Endpoint {
    service_name: String,
}

impl Endpoint {
    pub(crate) fn new(service_name: String) -> Self {
        Endpoint { service_name }
    }
}

/// One span in the shape Zipkin-compatible collectors accept.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireSpan {
    trace_id: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    name: String,
    kind: Kind,
    /// Microseconds since the UNIX epoch.
    timestamp: u64,
    /// Microseconds.
    duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    tags: std::collections::HashMap<String, String>,
}

fn epoch_micros(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_micros() as u64
}

pub(crate) fn into_wire(span: &Span, local_endpoint: Option<&Endpoint>) -> WireSpan {
    let context = span.context();
    WireSpan {
        trace_id: format!("{:032x}", context.trace_id()),
        id: format!("{:016x}", context.span_id()),
        parent_id: context.parent_span_id().map(|id| format!("{id:016x}")),
        name: span.name().to_owned(),
        kind: span.kind().into(),
        timestamp: epoch_micros(span.start_time()),
        duration: span
            .end_time()
            .duration_since(span.start_time())
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_micros() as u64,
        local_endpoint: local_endpoint.cloned(),
        tags: span.tags().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SamplingState, SpanId, TraceContext, TraceId};
    use crate::span::SpanRecorder;

    #[test]
    fn serializes_zipkin_v2_shape() {
        let context = TraceContext::new(
            TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128),
            SpanId::from(0x00f0_67aa_0ba9_02b7u64),
        )
        .with_parent_span_id(SpanId::from(1u64))
        .with_sampling(SamplingState::Sampled);
        let mut recorder = SpanRecorder::start(context, "get /", crate::span::SpanKind::Server);
        recorder.tag("http.status_code", "200").unwrap();
        let span = recorder.finish().unwrap();

        let endpoint = Endpoint::new("client-service".to_owned());
        let wire = into_wire(&span, Some(&endpoint));
        let value = serde_json::to_value(&wire).unwrap();

        assert_eq!(value["traceId"], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(value["id"], "00f067aa0ba902b7");
        assert_eq!(value["parentId"], "0000000000000001");
        assert_eq!(value["name"], "get /");
        assert_eq!(value["kind"], "SERVER");
        assert_eq!(value["localEndpoint"]["serviceName"], "client-service");
        assert_eq!(value["tags"]["http.status_code"], "200");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn omits_absent_fields() {
        let context = TraceContext::new(TraceId::from(1u128), SpanId::from(2u64));
        let mut recorder = SpanRecorder::start(context, "op", crate::span::SpanKind::Client);
        let span = recorder.finish().unwrap();

        let value = serde_json::to_value(into_wire(&span, None)).unwrap();
        assert!(value.get("parentId").is_none());
        assert!(value.get("localEndpoint").is_none());
        assert!(value.get("tags").is_none());
    }
}
