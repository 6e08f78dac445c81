//! The socket facade.
//!
//! [`Socket`] owns exactly one transport, built at construction from the
//! application's [`TransportFactory`]. Every operation is delegated: plain
//! commands and accessors go straight to the transport, shared streams go
//! through the socket's [`EventStreamMultiplexer`], and namespaces through
//! its [`NamespaceRegistry`]. Command-style operations return the socket
//! for chaining.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::SocketConfig;
use crate::error::Result;
use crate::identifiers::SocketId;
use crate::transport::{AnyListener, Args, Listener, Transport, TransportFactory};

use super::multiplexer::{EventStream, EventStreamMultiplexer, OnceEvent};
use super::namespace::NamespaceRegistry;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a socket.
pub(crate) struct SocketInner {
    /// Config the transport was built from.
    config: SocketConfig,
    /// The one transport of this socket.
    transport: Arc<dyn Transport>,
    /// Factory reused for namespace sockets.
    factory: Arc<dyn TransportFactory>,
    /// Shared event streams.
    events: EventStreamMultiplexer,
    /// Namespace sockets derived from this one.
    namespaces: NamespaceRegistry,
}

// ============================================================================
// Socket
// ============================================================================

/// Chainable facade over a socket transport.
///
/// Cloning is cheap and yields a handle to the same socket; use
/// [`Socket::ptr_eq`] to compare identity.
///
/// # Example
///
/// ```
/// use futures_util::StreamExt;
/// use serde_json::json;
/// use socketio_facade::{MemoryFactory, Socket, SocketConfig};
///
/// # async fn example() -> socketio_facade::Result<()> {
/// let factory = MemoryFactory::new();
/// let socket = Socket::new(SocketConfig::new("http://localhost:3000"), factory.clone())?;
///
/// let mut prices = socket.subscribe_event("price");
/// socket.emit("watch", vec![json!("BTC")]).compress(false);
///
/// let transport = factory.transport("http://localhost:3000").unwrap();
/// transport.deliver("price", vec![json!(64000)]);
/// assert_eq!(prices.next().await, Some(vec![json!(64000)]));
///
/// let chat = socket.of("chat")?;
/// assert_eq!(chat.config().url(), "http://localhost:3000/chat");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Socket {
    /// Shared inner state.
    pub(crate) inner: Arc<SocketInner>,
}

// ============================================================================
// Socket - Display
// ============================================================================

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("url", &self.inner.config.url())
            .field("id", &self.inner.transport.id())
            .field("connected", &self.inner.transport.connected())
            .field("namespaces", &self.inner.namespaces)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Socket - Constructor
// ============================================================================

impl Socket {
    /// Creates a socket, building its transport with `factory`.
    ///
    /// Whether the transport connects immediately is up to the factory
    /// (conventionally the `autoConnect` option).
    ///
    /// # Errors
    ///
    /// Propagates the factory's error unchanged.
    pub fn new(config: SocketConfig, factory: impl TransportFactory + 'static) -> Result<Self> {
        Self::with_factory(config, Arc::new(factory))
    }

    /// Creates a socket from a shared factory.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error unchanged.
    pub fn with_factory(config: SocketConfig, factory: Arc<dyn TransportFactory>) -> Result<Self> {
        let transport = factory.create(&config)?;
        debug!(url = %config.url(), "Socket created");

        Ok(Self {
            inner: Arc::new(SocketInner {
                events: EventStreamMultiplexer::new(Arc::clone(&transport)),
                namespaces: NamespaceRegistry::new(),
                config,
                transport,
                factory,
            }),
        })
    }
}

// ============================================================================
// Socket - Accessors
// ============================================================================

impl Socket {
    /// Returns the config this socket was built from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Returns the shared event streams of this socket.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventStreamMultiplexer {
        &self.inner.events
    }

    /// Returns the namespace sockets derived from this socket.
    #[inline]
    #[must_use]
    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.inner.namespaces
    }

    /// Returns `true` if both handles refer to the same socket.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Socket) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the session ID, if connected.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<SocketId> {
        self.inner.transport.id()
    }

    /// Returns `true` if the socket is connected.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.inner.transport.connected()
    }

    /// Returns `true` if the socket is disconnected.
    #[inline]
    #[must_use]
    pub fn disconnected(&self) -> bool {
        self.inner.transport.disconnected()
    }

    /// Returns `true` if the socket will try to (re)connect.
    #[inline]
    #[must_use]
    pub fn active(&self) -> bool {
        self.inner.transport.active()
    }

    /// Returns `true` if the last reconnection restored the session state.
    #[inline]
    #[must_use]
    pub fn recovered(&self) -> bool {
        self.inner.transport.recovered()
    }

    /// Returns the auth payload.
    #[inline]
    #[must_use]
    pub fn auth(&self) -> Option<Value> {
        self.inner.transport.auth()
    }

    /// Replaces the auth payload used by the next handshake.
    #[inline]
    pub fn set_auth(&self, auth: Option<Value>) -> &Self {
        self.inner.transport.set_auth(auth);
        self
    }

    /// Returns the factory used for namespace sockets.
    #[inline]
    pub(crate) fn factory(&self) -> &Arc<dyn TransportFactory> {
        &self.inner.factory
    }
}

// ============================================================================
// Socket - Connection
// ============================================================================

impl Socket {
    /// Opens the connection.
    #[inline]
    pub fn connect(&self) -> &Self {
        self.inner.transport.connect();
        self
    }

    /// Alias of [`Socket::connect`].
    #[inline]
    pub fn open(&self) -> &Self {
        self.connect()
    }

    /// Closes the connection.
    #[inline]
    pub fn disconnect(&self) -> &Self {
        self.inner.transport.disconnect();
        self
    }

    /// Alias of [`Socket::disconnect`].
    #[inline]
    pub fn close(&self) -> &Self {
        self.disconnect()
    }
}

// ============================================================================
// Socket - Emission
// ============================================================================

impl Socket {
    /// Emits an event.
    #[inline]
    pub fn emit(&self, event: &str, args: Args) -> &Self {
        self.inner.transport.emit(event, args);
        self
    }

    /// Emits a `message` event.
    #[inline]
    pub fn send(&self, args: Args) -> &Self {
        self.inner.transport.send(args);
        self
    }

    /// Emits an event and waits for the server's acknowledgement.
    ///
    /// # Errors
    ///
    /// Fails exactly as the transport's acknowledgement fails, e.g.
    /// [`Error::AckTimeout`](crate::Error::AckTimeout) after [`Socket::timeout`].
    pub async fn emit_with_ack(&self, event: &str, args: Args) -> Result<Value> {
        self.inner.transport.emit_with_ack(event, args).await
    }

    /// Sets the acknowledgement timeout for the next emission.
    #[inline]
    pub fn timeout(&self, timeout: Duration) -> &Self {
        self.inner.transport.timeout(timeout);
        self
    }

    /// Sets the compression flag for the next emission.
    #[inline]
    pub fn compress(&self, compress: bool) -> &Self {
        self.inner.transport.compress(compress);
        self
    }

    /// Marks the next emission as volatile.
    ///
    /// A volatile packet may be dropped if it cannot be sent right away.
    /// The flag is consumed by the next emission.
    #[inline]
    pub fn volatile(&self) -> &Self {
        self.inner.transport.volatile();
        self
    }
}

// ============================================================================
// Socket - Listeners
// ============================================================================

impl Socket {
    /// Registers a listener for `event` directly on the transport.
    ///
    /// Each call adds a registration; use [`Socket::subscribe_event`] to share one.
    #[inline]
    pub fn on(&self, event: &str, listener: Listener) -> &Self {
        self.inner.transport.on(event, listener);
        self
    }

    /// Registers a one-shot listener for `event` directly on the transport.
    #[inline]
    pub fn once(&self, event: &str, listener: Listener) -> &Self {
        self.inner.transport.once(event, listener);
        self
    }

    /// Removes listeners; see [`Transport::off`].
    ///
    /// Removing all listeners of an event also removes the listener behind
    /// its shared streams. Live [`EventStream`]s for that event stay open but
    /// receive nothing, and new ones join the same silent stream, until every
    /// stream for the event has been dropped.
    #[inline]
    pub fn off(&self, event: Option<&str>, listener: Option<&Listener>) -> &Self {
        self.inner.transport.off(event, listener);
        self
    }

    /// Alias of [`Socket::off`].
    #[inline]
    pub fn remove_listener(&self, event: Option<&str>, listener: Option<&Listener>) -> &Self {
        self.off(event, listener)
    }

    /// Removes every listener for `event`, or for all events.
    ///
    /// Silences shared streams the same way as [`Socket::off`].
    #[inline]
    pub fn remove_all_listeners(&self, event: Option<&str>) -> &Self {
        self.inner.transport.remove_all_listeners(event);
        self
    }

    /// Returns the listeners registered for `event`.
    #[inline]
    #[must_use]
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.inner.transport.listeners(event)
    }

    /// Returns `true` if at least one listener is registered for `event`.
    #[inline]
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.inner.transport.has_listeners(event)
    }
}

// ============================================================================
// Socket - Catch-all Listeners
// ============================================================================

impl Socket {
    /// Registers a catch-all listener for incoming events.
    #[inline]
    pub fn on_any(&self, listener: AnyListener) -> &Self {
        self.inner.transport.on_any(listener);
        self
    }

    /// Registers an incoming catch-all listener ahead of existing ones.
    #[inline]
    pub fn prepend_any(&self, listener: AnyListener) -> &Self {
        self.inner.transport.prepend_any(listener);
        self
    }

    /// Removes an incoming catch-all listener, or all of them.
    #[inline]
    pub fn off_any(&self, listener: Option<&AnyListener>) -> &Self {
        self.inner.transport.off_any(listener);
        self
    }

    /// Registers a catch-all listener for outgoing packets.
    #[inline]
    pub fn on_any_outgoing(&self, listener: AnyListener) -> &Self {
        self.inner.transport.on_any_outgoing(listener);
        self
    }

    /// Registers an outgoing catch-all listener ahead of existing ones.
    #[inline]
    pub fn prepend_any_outgoing(&self, listener: AnyListener) -> &Self {
        self.inner.transport.prepend_any_outgoing(listener);
        self
    }

    /// Removes an outgoing catch-all listener, or all of them.
    #[inline]
    pub fn off_any_outgoing(&self, listener: Option<&AnyListener>) -> &Self {
        self.inner.transport.off_any_outgoing(listener);
        self
    }

    /// Returns the incoming catch-all listeners.
    #[inline]
    #[must_use]
    pub fn listeners_any(&self) -> Vec<AnyListener> {
        self.inner.transport.listeners_any()
    }

    /// Returns the outgoing catch-all listeners.
    #[inline]
    #[must_use]
    pub fn listeners_any_outgoing(&self) -> Vec<AnyListener> {
        self.inner.transport.listeners_any_outgoing()
    }
}

// ============================================================================
// Socket - Streams
// ============================================================================

impl Socket {
    /// Returns a shared stream of `event` payloads.
    ///
    /// All streams for the same event share one transport listener, which
    /// is removed when the last stream is dropped.
    #[inline]
    #[must_use]
    pub fn subscribe_event(&self, event: &str) -> EventStream {
        self.inner.events.subscribe(event)
    }

    /// Returns a future resolving with the next `event` payload.
    ///
    /// Not shared and not cancellable once registered.
    #[inline]
    #[must_use]
    pub fn once_event(&self, event: &str) -> OnceEvent {
        self.inner.events.once(event)
    }
}

// ============================================================================
// Socket - Namespaces
// ============================================================================

impl Socket {
    /// Returns the socket bound to `namespace`.
    ///
    /// `""` and `"/"` return this socket. Other namespaces are built on
    /// first use with their own transport and reused afterwards.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error when a new namespace socket is built.
    pub fn of(&self, namespace: &str) -> Result<Socket> {
        self.inner.namespaces.resolve(self, namespace)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::{FutureExt, StreamExt};
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::transport::{MemoryFactory, MemoryTransport};

    const URL: &str = "http://localhost:3000";

    fn setup() -> (Arc<MemoryTransport>, Socket) {
        setup_with(SocketConfig::new(URL))
    }

    fn setup_with(config: SocketConfig) -> (Arc<MemoryTransport>, Socket) {
        let factory = MemoryFactory::new();
        let socket = Socket::new(config, factory.clone()).unwrap();
        let transport = factory.created().pop().unwrap();
        (transport, socket)
    }

    #[test]
    fn test_new_builds_exactly_one_transport() {
        let factory = MemoryFactory::new();
        let socket = Socket::new(SocketConfig::new(URL), factory.clone()).unwrap();

        assert_eq!(factory.created_count(), 1);
        assert_eq!(socket.config().url(), URL);
        assert!(socket.connected());
    }

    #[test]
    fn test_new_propagates_factory_error() {
        let err = Socket::new(SocketConfig::new(""), MemoryFactory::new()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_chainable_operations_return_same_socket() {
        let (_transport, socket) = setup();

        let chained = socket
            .connect()
            .emit("a", vec![])
            .timeout(Duration::from_secs(1))
            .compress(false)
            .send(vec![])
            .disconnect();

        assert!(ptr::eq(chained, &socket));
        assert!(ptr::eq(socket.volatile(), &socket));
        assert!(ptr::eq(socket.open().close(), &socket));
    }

    #[test]
    fn test_clone_shares_identity() {
        let (_transport, socket) = setup();
        let other = setup().1;

        assert!(socket.ptr_eq(&socket.clone()));
        assert!(!socket.ptr_eq(&other));
    }

    #[test]
    fn test_emit_reaches_transport() {
        let (transport, socket) = setup();

        socket
            .compress(false)
            .emit("chat", vec![json!("hi")])
            .send(vec![json!("raw")]);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].event, "chat");
        assert_eq!(sent[0].args, vec![json!("hi")]);
        assert!(!sent[0].compress);
        assert_eq!(sent[1].event, "message");
    }

    #[test]
    fn test_volatile_marks_only_next_emission() {
        let (transport, socket) = setup();

        socket.volatile().emit("tick", vec![]).emit("tock", vec![]);

        let sent = transport.sent();
        assert!(sent[0].volatile);
        assert!(!sent[1].volatile);
    }

    #[test]
    fn test_volatile_emission_dropped_while_disconnected() {
        let (transport, socket) = setup_with(SocketConfig::new(URL).with_auto_connect(false));

        socket.volatile().emit("tick", vec![]).emit("kept", vec![]);
        socket.connect();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, "kept");
    }

    #[test]
    fn test_state_accessors_pass_through() {
        let (transport, socket) = setup_with(SocketConfig::new(URL).with_auto_connect(false));

        assert!(socket.disconnected());
        assert!(!socket.active());
        assert!(socket.id().is_none());

        socket.connect();
        assert!(socket.connected());
        assert!(socket.active());
        assert_eq!(socket.id(), transport.id());

        transport.reconnect(true);
        assert!(socket.recovered());
    }

    #[test]
    fn test_auth_read_write() {
        let (_transport, socket) = setup_with(
            SocketConfig::new(URL).with_auth(json!({ "token": "a" })),
        );

        assert_eq!(socket.auth(), Some(json!({ "token": "a" })));
        socket.set_auth(Some(json!({ "token": "b" })));
        assert_eq!(socket.auth(), Some(json!({ "token": "b" })));
    }

    #[test]
    fn test_on_registers_directly_each_call() {
        let (transport, socket) = setup();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            socket.on("chat", Listener::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        transport.deliver("chat", vec![]);

        assert_eq!(transport.registrations("chat"), 2);
        assert_eq!(socket.listeners("chat").len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_and_off() {
        let (transport, socket) = setup();
        let listener = Listener::new(|_| {});

        socket.once("ready", Listener::new(|_| {}));
        socket.on("chat", listener.clone());
        assert!(socket.has_listeners("ready"));

        transport.deliver("ready", vec![]);
        assert!(!socket.has_listeners("ready"));

        socket.off(Some("chat"), Some(&listener));
        assert!(!socket.has_listeners("chat"));

        socket.on("a", Listener::new(|_| {})).on("b", Listener::new(|_| {}));
        socket.remove_listener(Some("a"), None);
        assert!(!socket.has_listeners("a"));
        socket.remove_all_listeners(None);
        assert!(!socket.has_listeners("b"));
    }

    #[test]
    fn test_any_listeners() {
        let (transport, socket) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_in = Arc::clone(&seen);
        let incoming = AnyListener::new(move |event, _| seen_in.lock().push(format!("in:{event}")));
        let seen_out = Arc::clone(&seen);
        let outgoing = AnyListener::new(move |event, _| seen_out.lock().push(format!("out:{event}")));

        socket
            .on_any(incoming.clone())
            .on_any_outgoing(outgoing.clone())
            .prepend_any(AnyListener::new(|_, _| {}))
            .prepend_any_outgoing(AnyListener::new(|_, _| {}));

        transport.deliver("news", vec![]);
        socket.emit("reply", vec![]);

        assert_eq!(*seen.lock(), vec!["in:news", "out:reply"]);
        assert_eq!(socket.listeners_any().len(), 2);
        assert_eq!(socket.listeners_any_outgoing().len(), 2);

        socket.off_any(Some(&incoming)).off_any_outgoing(None);
        assert_eq!(socket.listeners_any().len(), 1);
        assert!(socket.listeners_any_outgoing().is_empty());
    }

    #[tokio::test]
    async fn test_emit_with_ack_delegates() {
        let (transport, socket) = setup();
        transport.set_ack_responder(|_, args| json!(args.len()));

        let reply = socket
            .emit_with_ack("count", vec![json!(1), json!(2), json!(3)])
            .await
            .unwrap();

        assert_eq!(reply, json!(3));
    }

    #[tokio::test]
    async fn test_emit_with_ack_timeout_propagates() {
        let (_transport, socket) = setup();

        let err = socket
            .timeout(Duration::from_millis(10))
            .emit_with_ack("slow", vec![])
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_subscribe_event_shares_one_registration() {
        let (transport, socket) = setup();

        let mut first = socket.subscribe_event("price");
        let mut second = socket.subscribe_event("price");
        transport.deliver("price", vec![json!(7)]);

        assert_eq!(transport.registrations("price"), 1);
        assert_eq!(first.next().await, Some(vec![json!(7)]));
        assert_eq!(second.next().await, Some(vec![json!(7)]));

        drop(first);
        assert!(transport.has_listeners("price"));
        drop(second);
        assert!(!transport.has_listeners("price"));

        let _third = socket.subscribe_event("price");
        assert_eq!(transport.registrations("price"), 2);
    }

    #[tokio::test]
    async fn test_subscribe_event_coexists_with_direct_listeners() {
        let (transport, socket) = setup();
        let direct = Listener::new(|_| {});
        socket.on("price", direct.clone());

        let stream = socket.subscribe_event("price");
        assert_eq!(socket.listeners("price").len(), 2);

        drop(stream);
        assert_eq!(socket.listeners("price"), vec![direct]);
        assert_eq!(socket.events().subscriber_count("price"), 0);
        drop(transport);
    }

    #[test]
    fn test_off_all_silences_shared_stream_until_released() {
        let (transport, socket) = setup();
        let mut first = socket.subscribe_event("price");

        socket.off(Some("price"), None);
        let mut second = socket.subscribe_event("price");
        transport.deliver("price", vec![json!(1)]);

        assert!(!transport.has_listeners("price"));
        assert!(socket.events().is_streaming("price"));
        assert_eq!(transport.registrations("price"), 1);
        assert_eq!(first.next().now_or_never(), None);
        assert_eq!(second.next().now_or_never(), None);

        drop(first);
        drop(second);
        assert!(!socket.events().is_streaming("price"));

        let mut fresh = socket.subscribe_event("price");
        transport.deliver("price", vec![json!(2)]);
        assert_eq!(transport.registrations("price"), 2);
        assert_eq!(fresh.next().now_or_never(), Some(Some(vec![json!(2)])));
    }

    #[test]
    fn test_remove_all_listeners_silences_shared_stream() {
        let (transport, socket) = setup();
        let mut stream = socket.subscribe_event("price");

        socket.remove_all_listeners(None);
        transport.deliver("price", vec![json!(1)]);

        assert!(socket.events().is_streaming("price"));
        assert_eq!(stream.next().now_or_never(), None);
    }

    #[tokio::test]
    async fn test_transport_errors_arrive_as_events() {
        let (transport, socket) = setup_with(SocketConfig::new(URL).with_auto_connect(false));
        let mut errors = socket.subscribe_event("connect_error");
        let mut disconnects = socket.subscribe_event("disconnect");

        transport.reject_connect("refused");
        socket.connect().disconnect();

        assert_eq!(errors.next().await, Some(vec![json!({ "message": "refused" })]));
        assert_eq!(disconnects.next().await, Some(vec![json!("io client disconnect")]));
    }

    #[tokio::test]
    async fn test_once_event() {
        let (transport, socket) = setup();
        let ready = socket.once_event("ready");

        transport.deliver("ready", vec![json!("now")]);
        transport.deliver("ready", vec![json!("later")]);

        assert_eq!(ready.await, vec![json!("now")]);
    }

    #[test]
    fn test_debug_output() {
        let (_transport, socket) = setup();
        let output = format!("{socket:?}");
        assert!(output.contains("Socket"));
        assert!(output.contains(URL));
    }
}
