//! # B3 Propagator
//!
//! The [`B3Propagator`] carries a [`TraceContext`] across a process boundary
//! using the multi-header B3 format:
//!
//! ```text
//! X-B3-TraceId: {trace_id}
//! X-B3-SpanId: {span_id}
//! X-B3-ParentSpanId: {parent_span_id}
//! X-B3-Sampled: {sampling_state}
//! ```
//!
//! plus one verbatim header per configured extra propagation key. Decoding
//! is strict: 32 lowercase hex chars for the trace id, 16 for span ids, and
//! `0`/`1` for the sampled header. An absent sampled header decodes as
//! [`SamplingState::Deferred`], never as sampled.

use crate::context::{SamplingState, SpanId, TraceContext, TraceId};
use crate::error::ExtractError;
use crate::propagation::{Extractor, Injector};

/// B3 names its headers in mixed case, but different protocols use
/// different formats. For example, HTTP will use X-B3-$name while gRPC will
/// use x-b3-$name. So here we leave it lower case since we cannot tell what
/// kind of protocol will be used.
pub const B3_TRACE_ID_HEADER: &str = "x-b3-traceid";
/// Span id header name.
pub const B3_SPAN_ID_HEADER: &str = "x-b3-spanid";
/// Sampled header name; `1`/`0`, absent means deferred.
pub const B3_SAMPLED_HEADER: &str = "x-b3-sampled";
/// Parent span id header name; only present for non-root spans.
pub const B3_PARENT_SPAN_ID_HEADER: &str = "x-b3-parentspanid";

/// Extracts and injects [`TraceContext`]s using B3 multi-headers.
#[derive(Clone, Debug, Default)]
pub struct B3Propagator {
    extra_keys: Vec<String>,
    fields: Vec<String>,
}

impl B3Propagator {
    /// Create a propagator with no extra propagation keys.
    pub fn new() -> Self {
        Self::with_extra_keys(Vec::new())
    }

    /// Create a propagator that additionally carries the given header keys
    /// verbatim through every context (e.g. a `client-id`).
    pub fn with_extra_keys(extra_keys: Vec<String>) -> Self {
        let mut fields = vec![
            B3_TRACE_ID_HEADER.to_string(),
            B3_SPAN_ID_HEADER.to_string(),
            B3_PARENT_SPAN_ID_HEADER.to_string(),
            B3_SAMPLED_HEADER.to_string(),
        ];
        fields.extend(extra_keys.iter().map(|k| k.to_lowercase()));
        let extra_keys = extra_keys.iter().map(|k| k.to_lowercase()).collect();
        B3Propagator { extra_keys, fields }
    }

    /// The header names this propagator reads and writes.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.as_str())
    }

    /// Write the context's fields into the carrier.
    pub fn inject(&self, context: &TraceContext, injector: &mut dyn Injector) {
        injector.set(
            B3_TRACE_ID_HEADER,
            format!("{:032x}", context.trace_id().to_u128()),
        );
        injector.set(
            B3_SPAN_ID_HEADER,
            format!("{:016x}", context.span_id().to_u64()),
        );
        if let Some(parent) = context.parent_span_id() {
            injector.set(B3_PARENT_SPAN_ID_HEADER, format!("{:016x}", parent.to_u64()));
        }
        match context.sampling() {
            SamplingState::Sampled => injector.set(B3_SAMPLED_HEADER, "1".to_string()),
            SamplingState::NotSampled => injector.set(B3_SAMPLED_HEADER, "0".to_string()),
            // Deferred: no header, downstream decides.
            SamplingState::Deferred => {}
        }
        for key in &self.extra_keys {
            if let Some(value) = context.extra_value(key) {
                injector.set(key, value.to_string());
            }
        }
    }

    /// Read a context from the carrier.
    ///
    /// Returns [`ExtractError::Absent`] when the required trace id / span id
    /// headers are missing, and [`ExtractError::MalformedHeader`] when a
    /// present header fails strict decoding. Neither is fatal: callers start
    /// a new root trace in response.
    pub fn extract(&self, extractor: &dyn Extractor) -> Result<TraceContext, ExtractError> {
        let (trace_hex, span_hex) = match (
            extractor.get(B3_TRACE_ID_HEADER),
            extractor.get(B3_SPAN_ID_HEADER),
        ) {
            (Some(trace_hex), Some(span_hex)) => (trace_hex, span_hex),
            _ => return Err(ExtractError::Absent),
        };

        let trace_id = extract_trace_id(trace_hex)?;
        let span_id = extract_span_id(B3_SPAN_ID_HEADER, span_hex)?;
        let mut context = TraceContext::new(trace_id, span_id);

        if let Some(parent_hex) = extractor.get(B3_PARENT_SPAN_ID_HEADER) {
            let parent = extract_span_id(B3_PARENT_SPAN_ID_HEADER, parent_hex)?;
            context = context.with_parent_span_id(parent);
        }

        let sampling = match extractor.get(B3_SAMPLED_HEADER) {
            Some("0") => SamplingState::NotSampled,
            Some("1") => SamplingState::Sampled,
            Some(other) => {
                return Err(ExtractError::MalformedHeader {
                    header: B3_SAMPLED_HEADER,
                    value: other.to_string(),
                })
            }
            None => SamplingState::Deferred,
        };
        context = context.with_sampling(sampling);

        for key in &self.extra_keys {
            if let Some(value) = extractor.get(key) {
                context = context.with_extra(key.clone(), value.to_string());
            }
        }

        Ok(context)
    }
}

fn is_strict_hex(value: &str, len: usize) -> bool {
    value.len() == len
        && value
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Extract trace id from a hex encoded value. Only lowercase hex of exactly
/// 32 chars is allowed, and the all-zero id is invalid.
fn extract_trace_id(value: &str) -> Result<TraceId, ExtractError> {
    let malformed = || ExtractError::MalformedHeader {
        header: B3_TRACE_ID_HEADER,
        value: value.to_string(),
    };
    if !is_strict_hex(value, 32) {
        return Err(malformed());
    }
    let trace_id = TraceId::from_hex(value).map_err(|_| malformed())?;
    if trace_id == TraceId::INVALID {
        return Err(malformed());
    }
    Ok(trace_id)
}

/// Extract a span id from a hex encoded value. Only lowercase hex of exactly
/// 16 chars is allowed, and the all-zero id is invalid.
fn extract_span_id(header: &'static str, value: &str) -> Result<SpanId, ExtractError> {
    let malformed = || ExtractError::MalformedHeader {
        header,
        value: value.to_string(),
    };
    if !is_strict_hex(value, 16) {
        return Err(malformed());
    }
    let span_id = SpanId::from_hex(value).map_err(|_| malformed())?;
    if span_id == SpanId::INVALID {
        return Err(malformed());
    }
    Ok(span_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TRACE_ID_STR: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN_ID_STR: &str = "00f067aa0ba902b7";
    const PARENT_SPAN_ID_STR: &str = "00f067aa0ba90200";
    const TRACE_ID_HEX: u128 = 0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736;
    const SPAN_ID_HEX: u64 = 0x00f0_67aa_0ba9_02b7;
    const PARENT_SPAN_ID_HEX: u64 = 0x00f0_67aa_0ba9_0200;

    fn carrier(
        trace: Option<&str>,
        span: Option<&str>,
        sampled: Option<&str>,
        parent: Option<&str>,
    ) -> HashMap<String, String> {
        let mut carrier = HashMap::new();
        if let Some(trace_id) = trace {
            carrier.set(B3_TRACE_ID_HEADER, trace_id.to_owned());
        }
        if let Some(span_id) = span {
            carrier.set(B3_SPAN_ID_HEADER, span_id.to_owned());
        }
        if let Some(sampled) = sampled {
            carrier.set(B3_SAMPLED_HEADER, sampled.to_owned());
        }
        if let Some(parent) = parent {
            carrier.set(B3_PARENT_SPAN_ID_HEADER, parent.to_owned());
        }
        carrier
    }

    fn base_context() -> TraceContext {
        TraceContext::new(TraceId::from(TRACE_ID_HEX), SpanId::from(SPAN_ID_HEX))
    }

    #[rustfmt::skip]
    #[allow(clippy::type_complexity)]
    fn extract_data() -> Vec<((Option<&'static str>, Option<&'static str>, Option<&'static str>, Option<&'static str>), TraceContext)> {
        // (TraceId, SpanId, Sampled, ParentSpanId)
        vec![
            ((Some(TRACE_ID_STR), Some(SPAN_ID_STR), None, None), base_context()), // deferred
            ((Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("0"), None), base_context().with_sampling(SamplingState::NotSampled)),
            ((Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("1"), None), base_context().with_sampling(SamplingState::Sampled)),
            ((Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("1"), Some(PARENT_SPAN_ID_STR)), base_context().with_sampling(SamplingState::Sampled).with_parent_span_id(SpanId::from(PARENT_SPAN_ID_HEX))),
        ]
    }

    #[rustfmt::skip]
    #[allow(clippy::type_complexity)]
    fn extract_malformed_data() -> Vec<(Option<&'static str>, Option<&'static str>, Option<&'static str>, Option<&'static str>)> {
        vec![
            (Some("ab00000000000000000000000000000000"), Some(SPAN_ID_STR), Some("1"), None), // trace id length > 32
            (Some("ab0000000000000000000000000000"), Some(SPAN_ID_STR), Some("1"), None),     // trace id length < 32
            (Some("a3ce929d0e0e4736"), Some(SPAN_ID_STR), Some("1"), None),                   // 64-bit short form rejected
            (Some("4bf92f3577b34da6a3ce929d0e0e4hhh"), Some(SPAN_ID_STR), Some("1"), None),   // illegal hex char
            (Some("4BF92F3577B34DA6A3CE929D0E0E4736"), Some(SPAN_ID_STR), Some("1"), None),   // upper case trace id
            (Some("00000000000000000000000000000000"), Some(SPAN_ID_STR), Some("1"), None),   // all-zero trace id
            (Some(TRACE_ID_STR), Some("cd0000000000000000"), Some("1"), None),                // span id length > 16
            (Some(TRACE_ID_STR), Some("00F067AA0BA902B7"), Some("1"), None),                  // upper case span id
            (Some(TRACE_ID_STR), Some("0000000000000000"), Some("1"), None),                  // all-zero span id
            (Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("true"), None),                      // lenient sampled form rejected
            (Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("d"), None),                         // debug flag not supported
            (Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("10"), None),                        // sampled length wrong
            (Some(TRACE_ID_STR), Some(SPAN_ID_STR), None, Some("EF00000000000000")),          // upper case parent span id
            (Some(TRACE_ID_STR), Some(SPAN_ID_STR), None, Some("qw00000000000000")),          // parent span id with bug
        ]
    }

    #[rustfmt::skip]
    #[allow(clippy::type_complexity)]
    fn extract_absent_data() -> Vec<(Option<&'static str>, Option<&'static str>, Option<&'static str>, Option<&'static str>)> {
        vec![
            (None, None, None, None),
            (None, Some(SPAN_ID_STR), None, None),  // missing trace id
            (Some(TRACE_ID_STR), None, None, None), // missing span id
            (None, None, Some("0"), None),          // sampled alone is not a context
        ]
    }

    #[test]
    fn extract_b3() {
        let propagator = B3Propagator::new();

        for ((trace, span, sampled, parent), expected) in extract_data() {
            let carrier = carrier(trace, span, sampled, parent);
            assert_eq!(propagator.extract(&carrier), Ok(expected));
        }

        for (trace, span, sampled, parent) in extract_malformed_data() {
            let carrier = carrier(trace, span, sampled, parent);
            assert!(
                matches!(
                    propagator.extract(&carrier),
                    Err(ExtractError::MalformedHeader { .. })
                ),
                "expected malformed for {:?}",
                (trace, span, sampled, parent)
            );
        }

        for (trace, span, sampled, parent) in extract_absent_data() {
            let carrier = carrier(trace, span, sampled, parent);
            assert_eq!(propagator.extract(&carrier), Err(ExtractError::Absent));
        }
    }

    #[rustfmt::skip]
    #[allow(clippy::type_complexity)]
    fn inject_data() -> Vec<(TraceContext, Option<&'static str>, Option<&'static str>, Option<&'static str>)> {
        // context, expected sampled, expected parent
        vec![
            (base_context().with_sampling(SamplingState::Sampled), Some(SPAN_ID_STR), Some("1"), None),
            (base_context().with_sampling(SamplingState::NotSampled), Some(SPAN_ID_STR), Some("0"), None),
            (base_context(), Some(SPAN_ID_STR), None, None), // deferred writes no sampled header
            (base_context().with_sampling(SamplingState::Sampled).with_parent_span_id(SpanId::from(PARENT_SPAN_ID_HEX)), Some(SPAN_ID_STR), Some("1"), Some(PARENT_SPAN_ID_STR)),
        ]
    }

    #[test]
    fn inject_b3() {
        let propagator = B3Propagator::new();

        for (context, span_id, sampled, parent) in inject_data() {
            let mut injector: HashMap<String, String> = HashMap::new();
            propagator.inject(&context, &mut injector);

            assert_eq!(
                Extractor::get(&injector, B3_TRACE_ID_HEADER),
                Some(TRACE_ID_STR)
            );
            assert_eq!(Extractor::get(&injector, B3_SPAN_ID_HEADER), span_id);
            assert_eq!(Extractor::get(&injector, B3_SAMPLED_HEADER), sampled);
            assert_eq!(
                Extractor::get(&injector, B3_PARENT_SPAN_ID_HEADER),
                parent
            );
        }
    }

    #[test]
    fn round_trip() {
        let propagator = B3Propagator::with_extra_keys(vec!["client-id".to_string()]);

        let contexts = vec![
            base_context().with_sampling(SamplingState::Sampled),
            base_context().with_sampling(SamplingState::NotSampled),
            base_context(),
            base_context()
                .with_sampling(SamplingState::Sampled)
                .with_parent_span_id(SpanId::from(PARENT_SPAN_ID_HEX))
                .with_extra("client-id", "mobile-app"),
        ];

        for context in contexts {
            let mut carrier: HashMap<String, String> = HashMap::new();
            propagator.inject(&context, &mut carrier);
            assert_eq!(propagator.extract(&carrier), Ok(context.clone()));
        }
    }

    #[test]
    fn extra_key_is_carried_verbatim() {
        let propagator = B3Propagator::with_extra_keys(vec!["client-id".to_string()]);
        let mut carrier = carrier(Some(TRACE_ID_STR), Some(SPAN_ID_STR), Some("1"), None);
        carrier.set("client-id", "web/1.4 (checkout)".to_string());

        let context = propagator.extract(&carrier).unwrap();
        assert_eq!(context.extra_value("client-id"), Some("web/1.4 (checkout)"));

        // A plain propagator ignores unconfigured keys.
        let plain = B3Propagator::new();
        let context = plain.extract(&carrier).unwrap();
        assert_eq!(context.extra_value("client-id"), None);
    }

    #[test]
    fn test_get_fields() {
        let propagator = B3Propagator::with_extra_keys(vec!["client-id".to_string()]);
        assert_eq!(
            propagator.fields().collect::<Vec<&str>>(),
            vec![
                B3_TRACE_ID_HEADER,
                B3_SPAN_ID_HEADER,
                B3_PARENT_SPAN_ID_HEADER,
                B3_SAMPLED_HEADER,
                "client-id",
            ]
        );
    }
}
