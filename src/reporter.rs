//! # Async reporter
//!
//! Decouples request threads from span transport. [`AsyncReporter::report`]
//! enqueues a finished span without blocking; a dedicated worker thread
//! drains the queue into batches and drives the [`Sender`]. When the queue
//! is full the reporter sheds load according to its [`OverflowPolicy`]
//! instead of stalling the caller.

use crate::error::{TraceError, TraceResult};
use crate::sender::Sender;
use crate::span::Span;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// What to do with an incoming span when the queue is at capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued span to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the incoming span and keep the queue as is.
    DropNewest,
}

#[derive(Debug)]
struct QueueState {
    spans: VecDeque<Span>,
    flush_requests: Vec<SyncSender<TraceResult<()>>>,
    shutdown_requested: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    signal: Condvar,
    dropped_spans: AtomicUsize,
    failed_batches: AtomicUsize,
}

/// Buffers finished spans and ships them in batches from a worker thread.
///
/// `report` never blocks and never fails; overload is absorbed by dropping
/// spans and counting them. `flush` and `shutdown` are the synchronous
/// control points and carry sender errors back to the caller.
#[derive(Debug)]
pub struct AsyncReporter {
    shared: Arc<Shared>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    batch_size: usize,
    queue_capacity: usize,
    overflow_policy: OverflowPolicy,
    wait_timeout: Duration,
}

impl AsyncReporter {
    /// Builder with the default batching parameters.
    pub fn builder() -> AsyncReporterBuilder {
        AsyncReporterBuilder::default()
    }

    /// Enqueue one finished span. Non-blocking; silently drops (and counts)
    /// when the queue is full or the reporter is shut down.
    pub fn report(&self, span: Span) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            self.note_dropped(1);
            return;
        }
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if state.shutdown_requested {
            drop(state);
            self.note_dropped(1);
            return;
        }
        if state.spans.len() >= self.queue_capacity {
            match self.overflow_policy {
                OverflowPolicy::DropOldest => {
                    state.spans.pop_front();
                    state.spans.push_back(span);
                }
                OverflowPolicy::DropNewest => {}
            }
            let notify = state.spans.len() >= self.batch_size;
            drop(state);
            self.note_dropped(1);
            if notify {
                self.shared.signal.notify_one();
            }
            return;
        }
        state.spans.push_back(span);
        let notify = state.spans.len() >= self.batch_size;
        drop(state);
        if notify {
            self.shared.signal.notify_one();
        }
    }

    /// Drain everything queued right now and wait for the sender to accept
    /// it. Returns the first sender error of the drain, if any.
    pub fn flush(&self) -> TraceResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TraceError::AlreadyShutdown);
        }
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        {
            let mut state = self.shared.state.lock()?;
            if state.shutdown_requested {
                return Err(TraceError::AlreadyShutdown);
            }
            state.flush_requests.push(ack_tx);
        }
        self.shared.signal.notify_one();
        ack_rx
            .recv_timeout(self.wait_timeout)
            .map_err(|_| TraceError::FlushTimedOut(self.wait_timeout))?
    }

    /// Flush the remaining spans, stop the worker, and release the sender.
    ///
    /// Idempotent; the second and later calls return `Ok(())` without doing
    /// anything. If the sender wedges past the timeout the worker thread is
    /// abandoned rather than joined.
    pub fn shutdown(&self) -> TraceResult<()> {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(
            name: "AsyncReporter.ShutdownStarted",
            message = "draining the span queue and stopping the worker"
        );
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        {
            let mut state = self.shared.state.lock()?;
            state.shutdown_requested = true;
            state.flush_requests.push(ack_tx);
        }
        self.shared.signal.notify_all();
        match ack_rx.recv_timeout(self.wait_timeout) {
            Ok(send_result) => {
                let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
                if let Some(handle) = handle {
                    let _ = handle.join();
                }
                send_result
            }
            Err(_) => Err(TraceError::FlushTimedOut(self.wait_timeout)),
        }
    }

    /// Spans discarded so far, by overflow or by arriving after shutdown.
    pub fn dropped_spans(&self) -> usize {
        self.shared.dropped_spans.load(Ordering::Relaxed)
    }

    /// Batches the sender rejected so far.
    pub fn failed_batches(&self) -> usize {
        self.shared.failed_batches.load(Ordering::Relaxed)
    }

    fn note_dropped(&self, count: usize) {
        let previous = self.shared.dropped_spans.fetch_add(count, Ordering::Relaxed);
        if previous == 0 {
            tracing::warn!(
                name: "AsyncReporter.SpansDropped",
                message = "spans are being dropped; the queue is full or the reporter is shut down"
            );
        }
    }
}

impl Drop for AsyncReporter {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                tracing::warn!(
                    name: "AsyncReporter.ShutdownFailed",
                    error = %err,
                    message = "reporter shutdown on drop failed"
                );
            }
        }
    }
}

/// Configures and spawns an [`AsyncReporter`].
#[derive(Clone, Debug)]
pub struct AsyncReporterBuilder {
    batch_size: usize,
    queue_capacity: usize,
    flush_interval: Duration,
    overflow_policy: OverflowPolicy,
    shutdown_timeout: Duration,
}

impl Default for AsyncReporterBuilder {
    fn default() -> Self {
        AsyncReporterBuilder {
            batch_size: 512,
            queue_capacity: 2048,
            flush_interval: Duration::from_secs(1),
            overflow_policy: OverflowPolicy::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl AsyncReporterBuilder {
    /// Maximum spans per sender call. Clamped to the queue capacity.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Maximum spans buffered before the overflow policy applies.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// How long the worker idles before shipping a partial batch.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Upper bound on how long `flush` and `shutdown` wait for the worker.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Spawn the worker thread and hand it the sender.
    pub fn build<S>(self, sender: S) -> AsyncReporter
    where
        S: Sender + 'static,
    {
        let batch_size = self.batch_size.min(self.queue_capacity);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                spans: VecDeque::with_capacity(self.queue_capacity.min(4096)),
                flush_requests: Vec::new(),
                shutdown_requested: false,
            }),
            signal: Condvar::new(),
            dropped_spans: AtomicUsize::new(0),
            failed_batches: AtomicUsize::new(0),
        });
        let worker_shared = Arc::clone(&shared);
        let flush_interval = self.flush_interval;
        let handle = std::thread::Builder::new()
            .name("cloudtrace-reporter".to_owned())
            .spawn(move || {
                run_worker(worker_shared, Box::new(sender), batch_size, flush_interval)
            })
            .expect("failed to spawn reporter thread");
        AsyncReporter {
            shared,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
            batch_size,
            queue_capacity: self.queue_capacity,
            overflow_policy: self.overflow_policy,
            wait_timeout: self.shutdown_timeout,
        }
    }
}

struct Cycle {
    spans: Vec<Span>,
    acks: Vec<SyncSender<TraceResult<()>>>,
    shutting_down: bool,
}

fn run_worker(
    shared: Arc<Shared>,
    mut sender: Box<dyn Sender>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut last_export = Instant::now();
    loop {
        let cycle = {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if state.shutdown_requested
                    || !state.flush_requests.is_empty()
                    || state.spans.len() >= batch_size
                {
                    break;
                }
                let elapsed = last_export.elapsed();
                if elapsed >= flush_interval {
                    break;
                }
                let Ok((next, wait)) = shared
                    .signal
                    .wait_timeout(state, flush_interval - elapsed)
                else {
                    return;
                };
                state = next;
                if wait.timed_out() {
                    break;
                }
            }
            let drain_all = state.shutdown_requested || !state.flush_requests.is_empty();
            let take = if drain_all {
                state.spans.len()
            } else {
                state.spans.len().min(batch_size)
            };
            Cycle {
                spans: state.spans.drain(..take).collect(),
                acks: std::mem::take(&mut state.flush_requests),
                shutting_down: state.shutdown_requested,
            }
        };

        // Sends run outside the lock; reports keep flowing meanwhile.
        let mut failure: Option<String> = None;
        let mut remaining = cycle.spans;
        while !remaining.is_empty() {
            let chunk: Vec<Span> = remaining
                .drain(..remaining.len().min(batch_size))
                .collect();
            if let Err(err) = futures_executor::block_on(sender.send(chunk)) {
                shared.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    name: "AsyncReporter.SendFailed",
                    error = %err,
                    message = "sender rejected a span batch"
                );
                if failure.is_none() {
                    failure = Some(err.to_string());
                }
            }
        }
        last_export = Instant::now();

        if cycle.shutting_down {
            sender.shutdown();
        }
        for ack in cycle.acks {
            let result = match &failure {
                Some(message) => Err(TraceError::from(message.clone())),
                None => Ok(()),
            };
            let _ = ack.send(result);
        }
        if cycle.shutting_down {
            return;
        }
    }
}
