//! Shared, reference-counted event streams.
//!
//! Every [`EventStream`] for the same event name is a consumer of one
//! shared stream. The first consumer registers a single listener on the
//! transport; the listener fans each payload out to all live consumers.
//! Dropping the last consumer removes the listener and forgets the shared
//! stream, so the next subscription starts fresh.
//!
//! ```text
//!                       ┌──────────────┐
//! transport ──on(e)───► │ SharedStream │ ──► EventStream #1
//!   (one listener)      │   fan-out    │ ──► EventStream #2
//!                       └──────────────┘ ──► EventStream #3
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::{FutureExt, Stream};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::transport::{Args, Listener, Transport};

// ============================================================================
// Types
// ============================================================================

/// Senders of the live consumers of one shared stream, by consumer ID.
type ConsumerMap = FxHashMap<u64, mpsc::UnboundedSender<Args>>;

/// One shared stream: the transport listener and its consumers.
struct SharedStream {
    /// Listener registered on the transport.
    listener: Listener,
    /// Live consumers. Only the delivery callback and subscribe/release touch it.
    consumers: Arc<Mutex<ConsumerMap>>,
}

/// Per-socket subscription bookkeeping.
#[derive(Default)]
struct MultiplexerState {
    /// Subscriber count by event name. Never holds a zero.
    subscribers: FxHashMap<String, usize>,
    /// Shared stream by event name. Present exactly when the count is non-zero.
    streams: FxHashMap<String, SharedStream>,
}

/// State shared between the multiplexer and its outstanding streams.
struct MultiplexerShared {
    transport: Arc<dyn Transport>,
    state: Mutex<MultiplexerState>,
    next_consumer_id: AtomicU64,
}

// ============================================================================
// EventStreamMultiplexer
// ============================================================================

/// Turns repeated subscriptions to one event into one transport listener.
///
/// Each [`Socket`](crate::Socket) owns exactly one; reach it through
/// [`Socket::events`](crate::Socket::events). It cannot be built over a
/// borrowed transport:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use socketio_facade::{EventStreamMultiplexer, MemoryTransport, SocketConfig, Transport};
///
/// let transport: Arc<dyn Transport> =
///     Arc::new(MemoryTransport::new(&SocketConfig::new("http://host")).unwrap());
/// let _second = EventStreamMultiplexer::new(transport);
/// ```
pub struct EventStreamMultiplexer {
    shared: Arc<MultiplexerShared>,
}

impl fmt::Debug for EventStreamMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("EventStreamMultiplexer")
            .field("subscribers", &state.subscribers)
            .finish_non_exhaustive()
    }
}

impl EventStreamMultiplexer {
    /// Creates a multiplexer over `transport`.
    ///
    /// The owning socket must be the only multiplexer over `transport`.
    #[must_use]
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(MultiplexerShared {
                transport,
                state: Mutex::new(MultiplexerState::default()),
                next_consumer_id: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes to `event`.
    ///
    /// Registers a transport listener only if no shared stream exists for
    /// `event` yet. The listener is registered before this returns, so no
    /// payload delivered afterwards is missed even if the stream has not
    /// been polled.
    #[must_use]
    pub fn subscribe(&self, event: &str) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let consumer_id = self.shared.next_consumer_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        let count = state.subscribers.entry(event.to_string()).or_insert(0);
        *count += 1;
        let subscribers = *count;

        let stream = state
            .streams
            .entry(event.to_string())
            .or_insert_with(|| Self::start(&self.shared.transport, event));
        stream.consumers.lock().insert(consumer_id, sender);

        trace!(event, subscribers, "Subscribed to shared stream");

        EventStream {
            event: event.to_string(),
            consumer_id,
            receiver,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Waits for the next occurrence of `event`.
    ///
    /// Bypasses the shared streams: a one-shot listener is registered on the
    /// transport directly and removes itself when it fires. The returned
    /// future never resolves if the event never fires.
    #[must_use]
    pub fn once(&self, event: &str) -> OnceEvent {
        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));

        self.shared.transport.once(
            event,
            Listener::new(move |args| {
                if let Some(sender) = sender.lock().take() {
                    let _ = sender.send(args.to_vec());
                }
            }),
        );

        OnceEvent {
            receiver: Some(receiver),
        }
    }

    /// Returns the number of live subscribers for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.shared
            .state
            .lock()
            .subscribers
            .get(event)
            .copied()
            .unwrap_or(0)
    }

    /// Returns `true` if a shared stream exists for `event`.
    #[must_use]
    pub fn is_streaming(&self, event: &str) -> bool {
        self.shared.state.lock().streams.contains_key(event)
    }

    /// Returns the events that currently have a shared stream, sorted.
    #[must_use]
    pub fn streaming_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.shared.state.lock().streams.keys().cloned().collect();
        events.sort_unstable();
        events
    }

    /// Registers the single fan-out listener for `event`.
    fn start(transport: &Arc<dyn Transport>, event: &str) -> SharedStream {
        let consumers: Arc<Mutex<ConsumerMap>> = Arc::new(Mutex::new(ConsumerMap::default()));
        let fanout = Arc::clone(&consumers);
        let name = event.to_string();

        let listener = Listener::new(move |args| {
            let consumers = fanout.lock();
            trace!(event = %name, consumers = consumers.len(), "Fanning out event");
            for sender in consumers.values() {
                let _ = sender.send(args.to_vec());
            }
        });

        transport.on(event, listener.clone());
        debug!(event, "Shared stream started");

        SharedStream {
            listener,
            consumers,
        }
    }
}

// ============================================================================
// MultiplexerShared - Release
// ============================================================================

impl MultiplexerShared {
    /// Removes one consumer of `event`.
    ///
    /// Unknown consumers are ignored, so the count never goes below zero.
    /// When the last consumer leaves, the transport listener is removed.
    fn release(&self, event: &str, consumer_id: u64) {
        let mut state = self.state.lock();

        let removed = state
            .streams
            .get(event)
            .is_some_and(|stream| stream.consumers.lock().remove(&consumer_id).is_some());
        if !removed {
            return;
        }

        let remaining = match state.subscribers.get_mut(event) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        trace!(event, subscribers = remaining, "Unsubscribed from shared stream");

        if remaining == 0 {
            state.subscribers.remove(event);
            if let Some(stream) = state.streams.remove(event) {
                self.transport.off(Some(event), Some(&stream.listener));
                debug!(event, "Shared stream stopped");
            }
        }
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// A consumer of a shared event stream.
///
/// Yields the arguments of every occurrence of the event delivered while
/// the stream is alive. Dropping it unsubscribes.
pub struct EventStream {
    event: String,
    consumer_id: u64,
    receiver: mpsc::UnboundedReceiver<Args>,
    shared: Arc<MultiplexerShared>,
}

impl EventStream {
    /// Returns the event this stream is subscribed to.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Unsubscribes. Equivalent to dropping the stream.
    #[inline]
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("event", &self.event)
            .field("consumer_id", &self.consumer_id)
            .finish_non_exhaustive()
    }
}

impl Stream for EventStream {
    type Item = Args;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Args>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.shared.release(&self.event, self.consumer_id);
    }
}

// ============================================================================
// OnceEvent
// ============================================================================

/// Future resolving with the arguments of the next occurrence of an event.
#[derive(Debug)]
pub struct OnceEvent {
    /// `None` once the listener was dropped without firing.
    receiver: Option<oneshot::Receiver<Args>>,
}

impl Future for OnceEvent {
    type Output = Args;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Args> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Pending;
        };

        match receiver.poll_unpin(cx) {
            Poll::Ready(Ok(args)) => Poll::Ready(args),
            Poll::Ready(Err(_)) => {
                // Listener removed without firing: the event can no longer arrive.
                self.receiver = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures_util::StreamExt;
    use serde_json::json;
    use tokio::time::timeout;
    use tokio_test::{assert_pending, assert_ready_eq};

    use crate::config::SocketConfig;
    use crate::transport::{AnyListener, MemoryTransport};

    fn setup() -> (Arc<MemoryTransport>, EventStreamMultiplexer) {
        let transport =
            Arc::new(MemoryTransport::new(&SocketConfig::new("http://localhost:3000")).unwrap());
        let mux = EventStreamMultiplexer::new(Arc::clone(&transport) as Arc<dyn Transport>);
        (transport, mux)
    }

    #[test]
    fn test_many_subscribers_one_registration() {
        let (transport, mux) = setup();

        let streams: Vec<EventStream> = (0..5).map(|_| mux.subscribe("price")).collect();

        assert_eq!(transport.registrations("price"), 1);
        assert_eq!(transport.listeners("price").len(), 1);
        assert_eq!(mux.subscriber_count("price"), 5);
        assert!(mux.is_streaming("price"));
        drop(streams);
    }

    #[test]
    fn test_last_unsubscribe_removes_listener_and_rearms() {
        let (transport, mux) = setup();

        let mut streams: Vec<EventStream> = (0..3).map(|_| mux.subscribe("price")).collect();
        streams.pop();
        streams.pop();

        assert!(transport.has_listeners("price"));
        assert_eq!(mux.subscriber_count("price"), 1);

        streams.pop().unwrap().unsubscribe();

        assert!(!transport.has_listeners("price"));
        assert!(!mux.is_streaming("price"));
        assert_eq!(mux.subscriber_count("price"), 0);

        let _again = mux.subscribe("price");
        assert_eq!(transport.registrations("price"), 2);
        assert!(transport.has_listeners("price"));
    }

    #[test]
    fn test_release_of_unknown_consumer_is_noop() {
        let (transport, mux) = setup();
        let stream = mux.subscribe("price");

        mux.shared.release("price", u64::MAX);
        mux.shared.release("missing", 0);

        assert_eq!(mux.subscriber_count("price"), 1);
        assert!(transport.has_listeners("price"));
        drop(stream);
    }

    #[test]
    fn test_double_release_does_not_underflow() {
        let (transport, mux) = setup();
        let first = mux.subscribe("price");
        let consumer_id = first.consumer_id;
        let _second = mux.subscribe("price");

        mux.shared.release("price", consumer_id);
        mux.shared.release("price", consumer_id);

        assert_eq!(mux.subscriber_count("price"), 1);
        assert!(transport.has_listeners("price"));

        // Dropping the already-released handle is a no-op as well.
        drop(first);
        assert_eq!(mux.subscriber_count("price"), 1);
    }

    #[test]
    fn test_event_names_match_exactly() {
        let (_transport, mux) = setup();
        let _a = mux.subscribe("chat");
        let _b = mux.subscribe("chat:*");

        assert_eq!(mux.streaming_events(), vec!["chat", "chat:*"]);
        assert_eq!(mux.subscriber_count("chat"), 1);
    }

    #[test]
    fn test_concurrent_churn_keeps_one_listener() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 500;

        let (transport, mux) = setup();
        let peak = Arc::new(AtomicUsize::new(0));
        let observer = Arc::downgrade(&transport);
        let peak_clone = Arc::clone(&peak);
        transport.on_any(AnyListener::new(move |event, _| {
            if let Some(transport) = observer.upgrade() {
                peak_clone.fetch_max(transport.listeners(event).len(), Ordering::SeqCst);
            }
        }));

        std::thread::scope(|scope| {
            for worker in 0..THREADS {
                let (transport, mux) = (&transport, &mux);
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let stream = mux.subscribe("price");
                        if (worker + round) % 2 == 0 {
                            transport.deliver("price", vec![json!(round)]);
                        }
                        drop(stream);
                    }
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 1);
        assert!(transport.listeners("price").is_empty());
        assert!(!mux.is_streaming("price"));
        assert_eq!(mux.subscriber_count("price"), 0);
    }

    #[tokio::test]
    async fn test_payload_fans_out_to_all_consumers() {
        let (transport, mux) = setup();
        let mut first = mux.subscribe("price");
        let mut second = mux.subscribe("price");

        transport.deliver("price", vec![json!(42)]);

        assert_eq!(first.next().await, Some(vec![json!(42)]));
        assert_eq!(second.next().await, Some(vec![json!(42)]));
    }

    #[tokio::test]
    async fn test_late_consumer_sees_only_later_payloads() {
        let (transport, mux) = setup();
        let mut early = mux.subscribe("price");

        transport.deliver("price", vec![json!(1)]);
        let mut late = mux.subscribe("price");
        transport.deliver("price", vec![json!(2)]);

        assert_eq!(early.next().await, Some(vec![json!(1)]));
        assert_eq!(early.next().await, Some(vec![json!(2)]));
        assert_eq!(late.next().await, Some(vec![json!(2)]));
    }

    #[tokio::test]
    async fn test_once_resolves_once() {
        let (transport, mux) = setup();
        let once = mux.once("ready");

        transport.deliver("ready", vec![json!("first")]);
        transport.deliver("ready", vec![json!("second")]);

        assert_eq!(once.await, vec![json!("first")]);
        assert!(!transport.has_listeners("ready"));
    }

    #[tokio::test]
    async fn test_independent_once_calls() {
        let (transport, mux) = setup();
        let first = mux.once("ready");
        transport.deliver("ready", vec![json!(1)]);
        let second = mux.once("ready");
        transport.deliver("ready", vec![json!(2)]);

        assert_eq!(first.await, vec![json!(1)]);
        assert_eq!(second.await, vec![json!(2)]);
        assert_eq!(transport.registrations("ready"), 2);
    }

    #[tokio::test]
    async fn test_once_never_resolves_without_event() {
        let (_transport, mux) = setup();
        let once = mux.once("never");

        assert!(timeout(Duration::from_millis(20), once).await.is_err());
    }

    #[test]
    fn test_once_stays_pending_when_listener_removed() {
        let (transport, mux) = setup();
        let mut removed = tokio_test::task::spawn(mux.once("removed"));

        assert_pending!(removed.poll());
        transport.remove_all_listeners(Some("removed"));
        assert_pending!(removed.poll());
        assert_pending!(removed.poll());
    }

    #[test]
    fn test_stream_pending_until_delivery() {
        let (transport, mux) = setup();
        let mut stream = tokio_test::task::spawn(mux.subscribe("price"));

        assert_pending!(stream.poll_next());
        transport.deliver("price", vec![json!(1)]);
        assert!(stream.is_woken());
        assert_ready_eq!(stream.poll_next(), Some(vec![json!(1)]));
    }
}
