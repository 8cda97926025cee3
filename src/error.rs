use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for tracing operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing core.
///
/// None of these are ever allowed to escape into an instrumented request
/// path; they surface only through explicit calls such as
/// [`SpanRecorder::finish`] or [`AsyncReporter::flush`].
///
/// [`SpanRecorder::finish`]: crate::span::SpanRecorder::finish
/// [`AsyncReporter::flush`]: crate::reporter::AsyncReporter::flush
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A recorder was mutated or finished after it had already been finished.
    /// This is a programming error in the instrumentation, not a runtime
    /// condition.
    #[error("span recorder already finished")]
    InvalidSpanState,

    /// The sender failed to deliver a batch. The batch is not retried; the
    /// failure is counted on the reporter.
    #[error("sender failed to deliver batch: {0}")]
    SenderFailure(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The reporter queue was at capacity and a span was dropped.
    #[error("reporter queue at capacity, span dropped")]
    QueueOverflow,

    /// A flush or shutdown did not complete within its timeout.
    #[error("flush timed out after {} ms", .0.as_millis())]
    FlushTimedOut(Duration),

    /// The reporter has already been shut down.
    #[error("reporter already shut down")]
    AlreadyShutdown,

    /// Other errors not covered above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(err_msg.into())
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string().into())
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);

/// Failure to extract a [`TraceContext`] from a carrier.
///
/// Neither variant is fatal: the caller starts a new root trace in both
/// cases. The distinction exists so that malformed upstream headers can be
/// logged rather than silently conflated with "no headers at all".
///
/// [`TraceContext`]: crate::context::TraceContext
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The required trace id / span id headers are not present.
    #[error("no propagation headers in carrier")]
    Absent,

    /// A header was present but did not decode. Decoding is strict: ids must
    /// be lowercase hex of exact length, the sampled header must be `0` or
    /// `1`.
    #[error("malformed {header} header: {value:?}")]
    MalformedHeader {
        /// Name of the offending header.
        header: &'static str,
        /// The raw value that failed to decode.
        value: String,
    },
}
