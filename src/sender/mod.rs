//! # Sender
//!
//! The boundary between span collection and span transport. A [`Sender`]
//! takes ownership of finished span batches and moves them to a backend;
//! everything upstream of it is transport-agnostic.

use crate::error::TraceResult;
use crate::span::Span;
use futures_util::future::BoxFuture;
use std::fmt;

mod console;
mod in_memory;
pub(crate) mod model;

#[cfg(feature = "reqwest-blocking-client")]
mod http;

pub use console::ConsoleSender;
pub use in_memory::InMemorySender;

#[cfg(feature = "reqwest-blocking-client")]
pub use http::{HttpSender, HttpSenderBuilder};

/// Transports batches of finished spans to a backend.
///
/// Implementations must be `Send`; the reporter invokes `send` from its
/// worker thread, one batch at a time, and never concurrently.
pub trait Sender: Send + fmt::Debug {
    /// Deliver one batch. An empty batch must not be submitted.
    ///
    /// Errors are reported back to the caller; the batch is consumed either
    /// way and is never retried.
    fn send(&mut self, batch: Vec<Span>) -> BoxFuture<'static, TraceResult<()>>;

    /// Release any transport resources. Called at most once, after the
    /// final `send`.
    fn shutdown(&mut self) {}
}

impl Sender for Box<dyn Sender> {
    fn send(&mut self, batch: Vec<Span>) -> BoxFuture<'static, TraceResult<()>> {
        (**self).send(batch)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
