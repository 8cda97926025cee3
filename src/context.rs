//! Trace identifiers and the immutable [`TraceContext`].

use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }

    /// Returns the trace id as a `u128`.
    pub const fn to_u128(self) -> u128 {
        self.0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }

    /// Returns the span id as a `u64`.
    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The three-state sampling decision carried by a [`TraceContext`].
///
/// An upstream `Sampled` or `NotSampled` is authoritative; `Deferred` means
/// no decision has been made yet and the local [`Sampler`] should decide.
/// A missing sampled header on the wire extracts as `Deferred`, never as
/// sampled.
///
/// [`Sampler`]: crate::sampler::Sampler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplingState {
    /// The trace is recorded and its spans are reported.
    Sampled,
    /// The trace is not reported; spans are still timed locally.
    NotSampled,
    /// No decision yet; downstream (or the local sampler) decides.
    #[default]
    Deferred,
}

impl SamplingState {
    /// Returns `true` if the decision is `Sampled`.
    pub fn is_sampled(&self) -> bool {
        matches!(self, SamplingState::Sampled)
    }

    /// Returns `true` unless the decision is still `Deferred`.
    pub fn is_decided(&self) -> bool {
        !matches!(self, SamplingState::Deferred)
    }
}

/// Immutable identifier set for one span's position in a trace.
///
/// A context is never mutated once constructed; deriving a child via
/// [`TraceContext::new_child`] produces a new value sharing the trace id,
/// sampling decision and extra fields, with the prior span id as parent.
///
/// Within one trace the trace id is constant across every derived context,
/// and each context created from a fresh span id identifies exactly one span
/// instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    sampling: SamplingState,
    extra: HashMap<String, String>,
}

impl TraceContext {
    /// Construct a new root-like context with no parent, a deferred sampling
    /// decision and no extra fields.
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        TraceContext {
            trace_id,
            span_id,
            parent_span_id: None,
            sampling: SamplingState::Deferred,
            extra: HashMap::new(),
        }
    }

    /// Returns a copy of this context with the given parent span id.
    pub fn with_parent_span_id(mut self, parent_span_id: SpanId) -> Self {
        self.parent_span_id = Some(parent_span_id);
        self
    }

    /// Returns a copy of this context with the given sampling decision.
    pub fn with_sampling(mut self, sampling: SamplingState) -> Self {
        self.sampling = sampling;
        self
    }

    /// Returns a copy of this context with the given extra field set.
    ///
    /// Extra fields are propagated opaquely across process boundaries; the
    /// core never interprets their values.
    pub fn with_extra<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Derive a child context for `span_id`.
    ///
    /// The trace id, sampling decision and extra fields carry over; the
    /// current span id becomes the child's parent.
    pub fn new_child(&self, span_id: SpanId) -> Self {
        TraceContext {
            trace_id: self.trace_id,
            span_id,
            parent_span_id: Some(self.span_id),
            sampling: self.sampling,
            extra: self.extra.clone(),
        }
    }

    /// The trace id shared by every span in this trace.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of the span this context belongs to.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The parent span id, if this is not a root context.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// The sampling decision carried by this context.
    pub fn sampling(&self) -> SamplingState {
        self.sampling
    }

    /// Returns `true` if this context is decided and sampled.
    pub fn is_sampled(&self) -> bool {
        self.sampling.is_sampled()
    }

    /// Returns `true` if both ids are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// All opaquely propagated extra fields.
    pub fn extra(&self) -> &HashMap<String, String> {
        &self.extra
    }

    /// Look up a single extra field by key.
    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(|v| v.as_str())
    }
}
