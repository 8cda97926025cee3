use crate::error::{TraceError, TraceResult};
use crate::sender::Sender;
use crate::span::Span;
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// Stores batches in memory for inspection.
///
/// Cloning shares the underlying storage, so a test can keep one handle
/// while handing the other to a reporter.
///
/// # Example
///
/// ```
/// use cloudtrace::sender::InMemorySender;
///
/// let sender = InMemorySender::new();
/// let handle = sender.clone();
/// // hand `sender` to an AsyncReporter, then inspect:
/// assert!(handle.finished_spans().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySender {
    batches: Arc<Mutex<Vec<Vec<Span>>>>,
}

impl InMemorySender {
    pub fn new() -> Self {
        InMemorySender::default()
    }

    /// Every batch received so far, in arrival order.
    pub fn batches(&self) -> Vec<Vec<Span>> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    /// All received spans, flattened across batches.
    pub fn finished_spans(&self) -> Vec<Span> {
        self.batches
            .lock()
            .map(|batches| batches.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Clears the stored batches.
    pub fn reset(&self) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.clear();
        }
    }
}

impl Sender for InMemorySender {
    fn send(&mut self, batch: Vec<Span>) -> BoxFuture<'static, TraceResult<()>> {
        let result = self
            .batches
            .lock()
            .map(|mut batches| batches.push(batch))
            .map_err(TraceError::from);
        Box::pin(std::future::ready(result))
    }
}
