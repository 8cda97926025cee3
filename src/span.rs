//! # Span
//!
//! A [`Span`] is one timed unit of work within a trace. It is produced by
//! finishing a [`SpanRecorder`], which accumulates timing and tags while the
//! work is in flight. Recorders are confined to the request that created
//! them and need no locking; the immutable `Span` is what crosses into the
//! reporter.

use crate::context::TraceContext;
use crate::error::{TraceError, TraceResult};
use std::collections::HashMap;
use std::time::SystemTime;

/// The role a span plays at a call boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Outbound side of a remote call.
    Client,
    /// Inbound side of a remote call.
    Server,
    /// Message published to a broker.
    Producer,
    /// Message consumed from a broker.
    Consumer,
}

/// Single finished operation within a trace.
///
/// Immutable; created only by [`SpanRecorder::finish`]. Ownership transfers
/// to the reporter on handoff.
#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    context: TraceContext,
    name: String,
    kind: SpanKind,
    start_time: SystemTime,
    end_time: SystemTime,
    tags: HashMap<String, String>,
}

impl Span {
    /// The context identifying this span's position in its trace.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The span kind.
    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    /// When the operation started.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// When the operation finished. Always `>= start_time`.
    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    /// String tags recorded while the span was open.
    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }
}

#[derive(Debug)]
struct RecorderData {
    name: String,
    kind: SpanKind,
    start_time: SystemTime,
    tags: HashMap<String, String>,
}

/// Mutable accumulator for one in-flight span.
///
/// States: `Open -> Finished`. Tags may be added only while open;
/// [`finish`] transitions to finished and yields the immutable [`Span`].
/// Any mutation after finishing, including a second finish, fails with
/// [`TraceError::InvalidSpanState`].
///
/// [`finish`]: SpanRecorder::finish
#[derive(Debug)]
pub struct SpanRecorder {
    context: TraceContext,
    data: Option<RecorderData>,
}

impl SpanRecorder {
    /// Open a recorder, stamping the start time with the current time.
    pub fn start<T: Into<String>>(context: TraceContext, name: T, kind: SpanKind) -> Self {
        SpanRecorder {
            context,
            data: Some(RecorderData {
                name: name.into(),
                kind,
                start_time: SystemTime::now(),
                tags: HashMap::new(),
            }),
        }
    }

    /// The context this recorder was opened with. Available in both states.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Returns `true` once [`finish`](SpanRecorder::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.data.is_none()
    }

    /// Add a string tag. Fails once the recorder is finished.
    pub fn tag<K, V>(&mut self, key: K, value: V) -> TraceResult<()>
    where
        K: Into<String>,
        V: Into<String>,
    {
        match self.data.as_mut() {
            Some(data) => {
                data.tags.insert(key.into(), value.into());
                Ok(())
            }
            None => Err(TraceError::InvalidSpanState),
        }
    }

    /// Stamp the end time and produce the immutable [`Span`], invalidating
    /// the recorder. A second call fails with
    /// [`TraceError::InvalidSpanState`].
    ///
    /// Recorders for unsampled contexts still track timing and tags for
    /// local use; keeping the finished span out of the reporter is the
    /// interceptor's job, not the recorder's.
    pub fn finish(&mut self) -> TraceResult<Span> {
        let data = self.data.take().ok_or(TraceError::InvalidSpanState)?;
        let now = SystemTime::now();
        // The system clock can step backwards between the two stamps.
        let end_time = if now < data.start_time {
            data.start_time
        } else {
            now
        };
        Ok(Span {
            context: self.context.clone(),
            name: data.name,
            kind: data.kind,
            start_time: data.start_time,
            end_time,
            tags: data.tags,
        })
    }
}
