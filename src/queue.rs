//! Serialized access to an append-only playback buffer.
//!
//! The buffer accepts one operation at a time and reports the outcome through
//! events. [`BufferQueue`] orders operations FIFO, submits the next one only
//! after the previous one settled, and hands each caller a [`CompletionHandle`].

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::sync::oneshot;

/// Failure reported by the playback buffer, synchronously or via an event.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer is full")]
    QuotaExceeded,
    #[error("buffer is in an invalid state: {0}")]
    InvalidState(String),
    #[error("buffer error: {0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// The queue was disposed before the operation settled.
    #[error("operation abandoned by a disposed queue")]
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    /// The outstanding operation finished.
    UpdateEnd,
    /// The outstanding operation failed.
    Error(BufferError),
    /// Nothing is outstanding on the buffer any more, whoever started it.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub type Listener = Arc<dyn Fn(BufferEvent) + Send + Sync>;

/// The external playback buffer.
///
/// Primitives may return an error immediately, or return `Ok` and report the
/// outcome later through exactly one `UpdateEnd` or `Error` event. A listener
/// may be invoked from inside a primitive call.
pub trait SourceBuffer: Send {
    type Stream: Send;

    /// Whether an operation is in progress, including ones not issued by us.
    fn is_updating(&self) -> bool;
    fn append_buffer(&mut self, data: Bytes) -> Result<(), BufferError>;
    fn append_stream(&mut self, stream: Self::Stream) -> Result<(), BufferError>;
    fn remove(&mut self, range: Range<Duration>) -> Result<(), BufferError>;

    fn subscribe(&mut self, listener: Listener) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Append,
    AppendStream,
    Remove,
}

/// Successful outcome of one queued operation.
///
/// Stands in for the buffer's completion event: `BufferEvent::UpdateEnd`
/// carries no payload, so the operation kind is all there is to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub kind: OperationKind,
}

type Outcome = Result<Completion, QueueError>;

/// Resolves exactly once: success, the buffer's error, or
/// [`QueueError::Abandoned`] when the queue is disposed first.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<Outcome>,
    outcome: Option<Outcome>,
}

impl CompletionHandle {
    fn new(rx: oneshot::Receiver<Outcome>) -> Self {
        Self { rx, outcome: None }
    }

    /// Non-blocking check. `None` while the operation is still pending.
    pub fn try_result(&mut self) -> Option<Outcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(Err(QueueError::Abandoned)),
            };
        }
        self.outcome.clone()
    }
}

impl Future for CompletionHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.outcome.clone() {
            return Poll::Ready(outcome);
        }
        let outcome = ready!(Pin::new(&mut self.rx).poll(cx)).unwrap_or(Err(QueueError::Abandoned));
        self.outcome = Some(outcome.clone());
        Poll::Ready(outcome)
    }
}

enum Payload<S> {
    Bytes(Bytes),
    Stream(S),
    Remove(Range<Duration>),
}

impl<S> Payload<S> {
    fn kind(&self) -> OperationKind {
        match self {
            Payload::Bytes(_) => OperationKind::Append,
            Payload::Stream(_) => OperationKind::AppendStream,
            Payload::Remove(_) => OperationKind::Remove,
        }
    }
}

struct Entry<S> {
    payload: Payload<S>,
    tx: oneshot::Sender<Outcome>,
}

struct InFlight {
    kind: OperationKind,
    tx: oneshot::Sender<Outcome>,
}

struct State<S> {
    pending: VecDeque<Entry<S>>,
    current: Option<InFlight>,
    subscription: Option<SubscriptionId>,
    /// Set by a flush that found the buffer locked; the holder re-checks.
    flush_requested: bool,
    disposed: bool,
}

struct Shared<B: SourceBuffer> {
    state: Mutex<State<B::Stream>>,
    buffer: Mutex<B>,
}

/// FIFO of operations against a [`SourceBuffer`], dispatched one at a time.
///
/// Dropping the queue disposes it.
pub struct BufferQueue<B: SourceBuffer + 'static> {
    shared: Arc<Shared<B>>,
}

impl<B: SourceBuffer + 'static> BufferQueue<B> {
    pub fn new(buffer: B) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                current: None,
                subscription: None,
                flush_requested: false,
                disposed: false,
            }),
            buffer: Mutex::new(buffer),
        });

        let weak: Weak<Shared<B>> = Arc::downgrade(&shared);
        let listener: Listener = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_event(event);
            }
        });
        let id = shared.buffer.lock().subscribe(listener);
        shared.state.lock().subscription = Some(id);

        Self { shared }
    }

    pub fn append(&self, data: impl Into<Bytes>) -> CompletionHandle {
        self.enqueue(Payload::Bytes(data.into()))
    }

    pub fn append_stream(&self, stream: B::Stream) -> CompletionHandle {
        self.enqueue(Payload::Stream(stream))
    }

    pub fn remove(&self, range: Range<Duration>) -> CompletionHandle {
        self.enqueue(Payload::Remove(range))
    }

    /// Operations waiting to be dispatched.
    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dispatching(&self) -> bool {
        self.shared.state.lock().current.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Stop listening to the buffer and abandon every pending and in-flight
    /// operation. Their handles resolve to [`QueueError::Abandoned`].
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    fn enqueue(&self, payload: Payload<B::Stream>) -> CompletionHandle {
        let (tx, rx) = oneshot::channel();
        let was_empty = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                // tx dropped here: the handle reports Abandoned
                return CompletionHandle::new(rx);
            }
            let was_empty = state.pending.is_empty();
            state.pending.push_back(Entry { payload, tx });
            was_empty
        };
        if was_empty {
            self.shared.flush();
        }
        CompletionHandle::new(rx)
    }
}

impl<B: SourceBuffer + 'static> Drop for BufferQueue<B> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl<B: SourceBuffer> Shared<B> {
    /// Submit pending operations until one stays in flight or none remain.
    fn flush(&self) {
        self.state.lock().flush_requested = true;
        loop {
            // Held while the primitive runs. A flush from an event fired
            // inside the call finds it locked and leaves the request flag
            // for this loop.
            let Some(mut buffer) = self.buffer.try_lock() else {
                return;
            };

            let entry = {
                let mut state = self.state.lock();
                state.flush_requested = false;
                if state.disposed || state.current.is_some() || state.pending.is_empty() {
                    None
                } else if buffer.is_updating() {
                    tracing::trace!("buffer busy, deferring dispatch");
                    None
                } else {
                    state.pending.pop_front().map(|entry| {
                        let kind = entry.payload.kind();
                        state.current = Some(InFlight { kind, tx: entry.tx });
                        tracing::debug!(?kind, remaining = state.pending.len(), "dispatching");
                        entry.payload
                    })
                }
            };

            let Some(payload) = entry else {
                drop(buffer);
                let state = self.state.lock();
                if state.disposed {
                    drop(state);
                    self.detach();
                    return;
                }
                if state.flush_requested {
                    continue;
                }
                return;
            };

            let result = match payload {
                Payload::Bytes(data) => buffer.append_buffer(data),
                Payload::Stream(stream) => buffer.append_stream(stream),
                Payload::Remove(range) => buffer.remove(range),
            };
            drop(buffer);

            if let Err(e) = result {
                self.settle(Err(e));
            }
        }
    }

    fn on_event(&self, event: BufferEvent) {
        if self.state.lock().disposed {
            return;
        }
        match event {
            BufferEvent::UpdateEnd => self.settle(Ok(())),
            BufferEvent::Error(e) => self.settle(Err(e)),
            BufferEvent::Idle => {}
        }
        self.flush();
    }

    /// Resolve the in-flight operation, if any.
    fn settle(&self, result: Result<(), BufferError>) {
        let Some(InFlight { kind, tx }) = self.state.lock().current.take() else {
            return;
        };
        let outcome = match result {
            Ok(()) => {
                tracing::debug!(?kind, "operation completed");
                Ok(Completion { kind })
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "operation failed");
                Err(QueueError::Buffer(e))
            }
        };
        // Receiver may be gone; the caller stopped caring.
        let _ = tx.send(outcome);
    }

    fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if !state.disposed {
                tracing::debug!(
                    pending = state.pending.len(),
                    in_flight = state.current.is_some(),
                    "disposing buffer queue"
                );
            }
            state.disposed = true;
            state.pending.clear();
            state.current = None;
        }
        self.detach();
    }

    /// Unsubscribe from the buffer. If the buffer is busy inside a primitive
    /// on this or another thread, the dispatching loop calls this again.
    fn detach(&self) {
        let Some(mut buffer) = self.buffer.try_lock() else {
            return;
        };
        let id = self.state.lock().subscription.take();
        if let Some(id) = id {
            buffer.unsubscribe(id);
        }
    }
}
