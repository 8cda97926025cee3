use crate::error::{TraceError, TraceResult};
use crate::sender::model;
use crate::sender::Sender;
use crate::span::Span;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};

/// Writes each batch to stdout as one JSON array per line.
///
/// Intended for local development; a collector is not required.
#[derive(Debug, Default)]
pub struct ConsoleSender {
    is_shutdown: AtomicBool,
}

impl ConsoleSender {
    pub fn new() -> Self {
        ConsoleSender::default()
    }
}

impl Sender for ConsoleSender {
    fn send(&mut self, batch: Vec<Span>) -> BoxFuture<'static, TraceResult<()>> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(std::future::ready(Err(TraceError::AlreadyShutdown)));
        }
        let result = serde_json::to_string(
            &batch
                .iter()
                .map(|span| model::into_wire(span, None))
                .collect::<Vec<_>>(),
        )
        .map(|line| println!("{line}"))
        .map_err(|err| TraceError::SenderFailure(Box::new(err)));
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}
