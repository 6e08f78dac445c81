//! In-process loopback transport.
//!
//! [`MemoryTransport`] implements the whole [`Transport`] capability set
//! without a network. Outgoing packets are recorded, incoming packets are
//! injected with [`MemoryTransport::deliver`], and acknowledgements are
//! answered with [`MemoryTransport::acknowledge`] or an ack responder.
//!
//! # Connection Lifecycle
//!
//! 1. `MemoryTransport::new` - Validate the URL, connect unless `autoConnect` is `false`
//! 2. `connect` - Assign an ID, flush buffered packets, deliver `connect`
//! 3. `emit` - Record the packet (or buffer it while disconnected)
//! 4. `disconnect` - Fail pending acks, deliver `disconnect`
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use socketio_facade::{MemoryFactory, Socket, SocketConfig};
//!
//! # fn example() -> socketio_facade::Result<()> {
//! let factory = MemoryFactory::new();
//! let socket = Socket::new(SocketConfig::new("http://localhost:3000"), factory.clone())?;
//!
//! socket.emit("hello", vec![json!("world")]);
//!
//! let transport = factory.transport("http://localhost:3000").unwrap();
//! assert_eq!(transport.sent()[0].event, "hello");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

use crate::config::SocketConfig;
use crate::error::{Error, Result};
use crate::identifiers::SocketId;

use super::listener::{AnyListener, Args, Listener};
use super::{Transport, TransportFactory};

// ============================================================================
// Constants
// ============================================================================

/// Event emitted by `send`.
const MESSAGE_EVENT: &str = "message";

/// Reserved event delivered after a successful connection.
const CONNECT_EVENT: &str = "connect";

/// Reserved event delivered when the connection fails.
const CONNECT_ERROR_EVENT: &str = "connect_error";

/// Reserved event delivered after the connection is closed.
const DISCONNECT_EVENT: &str = "disconnect";

/// Disconnect reason when the client closed the connection.
const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// Disconnect reason when the underlying connection dropped.
const TRANSPORT_CLOSE_REASON: &str = "transport close";

// ============================================================================
// Types
// ============================================================================

/// Pending acknowledgement channels by ack ID.
type AckMap = FxHashMap<u64, PendingAck>;

/// Computes the server's answer for an acknowledged emission.
type AckResponder = Arc<dyn Fn(&str, &[Value]) -> Value + Send + Sync>;

/// A waiting `emit_with_ack` call.
struct PendingAck {
    event: String,
    reply_tx: oneshot::Sender<Result<Value>>,
}

/// A listener registration.
struct Registration {
    listener: Listener,
    once: bool,
}

/// Per-emission flags, reset after every emission.
#[derive(Debug, Clone, Copy)]
struct EmitFlags {
    volatile: bool,
    compress: bool,
    timeout: Option<Duration>,
}

impl Default for EmitFlags {
    fn default() -> Self {
        Self {
            volatile: false,
            compress: true,
            timeout: None,
        }
    }
}

/// Result of dispatching one packet.
struct Dispatch {
    sent: Option<OutgoingPacket>,
    timeout: Option<Duration>,
}

// ============================================================================
// OutgoingPacket
// ============================================================================

/// A packet emitted through the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingPacket {
    /// Event name.
    pub event: String,
    /// Event arguments.
    pub args: Args,
    /// Whether the packet was marked volatile.
    pub volatile: bool,
    /// Whether compression was requested.
    pub compress: bool,
    /// Acknowledgement ID, for `emit_with_ack`.
    pub ack_id: Option<u64>,
}

// ============================================================================
// MemoryState
// ============================================================================

/// Mutable state of a memory transport.
struct MemoryState {
    connected: bool,
    active: bool,
    recovered: bool,
    id: Option<SocketId>,
    auth: Option<Value>,
    flags: EmitFlags,
    listeners: FxHashMap<String, Vec<Registration>>,
    registrations: FxHashMap<String, usize>,
    any: Vec<AnyListener>,
    any_outgoing: Vec<AnyListener>,
    sent: Vec<OutgoingPacket>,
    send_buffer: Vec<OutgoingPacket>,
    acks: AckMap,
    next_ack_id: u64,
    ack_responder: Option<AckResponder>,
}

impl MemoryState {
    fn new(auth: Option<Value>) -> Self {
        Self {
            connected: false,
            active: false,
            recovered: false,
            id: None,
            auth,
            flags: EmitFlags::default(),
            listeners: FxHashMap::default(),
            registrations: FxHashMap::default(),
            any: Vec::new(),
            any_outgoing: Vec::new(),
            sent: Vec::new(),
            send_buffer: Vec::new(),
            acks: AckMap::default(),
            next_ack_id: 0,
            ack_responder: None,
        }
    }

    fn register(&mut self, event: &str, listener: Listener, once: bool) {
        *self.registrations.entry(event.to_string()).or_default() += 1;
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(Registration { listener, once });
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport that keeps every packet in memory.
///
/// # Thread Safety
///
/// `MemoryTransport` is `Send + Sync`. Callbacks are invoked after the
/// internal lock is released, so a listener may call back into the
/// transport.
pub struct MemoryTransport {
    /// Config this transport was built from.
    config: SocketConfig,
    /// Shared mutable state.
    state: Mutex<MemoryState>,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTransport")
            .field("url", &self.config.url())
            .field("connected", &state.connected)
            .field("id", &state.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// MemoryTransport - Constructor
// ============================================================================

impl MemoryTransport {
    /// Creates a transport for `config`.
    ///
    /// Connects immediately unless the `autoConnect` option is `false`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is empty
    /// - [`Error::Url`] if the URL cannot be parsed
    pub fn new(config: &SocketConfig) -> Result<Self> {
        if config.url().is_empty() {
            return Err(Error::config("url must not be empty"));
        }
        Url::parse(config.url())?;

        let transport = Self {
            config: config.clone(),
            state: Mutex::new(MemoryState::new(config.option("auth").cloned())),
        };

        debug!(url = %config.url(), "Memory transport created");

        if config.auto_connect() {
            transport.connect();
        }

        Ok(transport)
    }

    /// Returns the config this transport was built from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }
}

// ============================================================================
// MemoryTransport - Simulation API
// ============================================================================

impl MemoryTransport {
    /// Delivers an incoming event as if it arrived from the server.
    ///
    /// Catch-all listeners run first, then event listeners. One-shot
    /// listeners are removed before they run.
    pub fn deliver(&self, event: &str, args: Args) {
        let (any, listeners) = {
            let mut state = self.state.lock();
            let any = state.any.clone();
            let listeners: Vec<Listener> = match state.listeners.get_mut(event) {
                Some(registrations) => {
                    let fired = registrations.iter().map(|r| r.listener.clone()).collect();
                    registrations.retain(|r| !r.once);
                    if registrations.is_empty() {
                        state.listeners.remove(event);
                    }
                    fired
                }
                None => Vec::new(),
            };
            (any, listeners)
        };

        trace!(event, listeners = listeners.len(), "Delivering event");

        for listener in &any {
            listener.call(event, &args);
        }
        for listener in &listeners {
            listener.call(&args);
        }
    }

    /// Simulates a failed connection attempt.
    ///
    /// Delivers `connect_error` with `{ "message": message }`.
    pub fn reject_connect(&self, message: &str) {
        {
            let mut state = self.state.lock();
            state.connected = false;
            state.id = None;
        }
        self.deliver(CONNECT_ERROR_EVENT, vec![json!({ "message": message })]);
    }

    /// Simulates a dropped connection followed by a reconnection.
    ///
    /// With `recovered`, the session ID survives and
    /// [`Transport::recovered`] reports `true`.
    pub fn reconnect(&self, recovered: bool) {
        let was_connected = {
            let mut state = self.state.lock();
            let was_connected = state.connected;
            state.connected = false;
            was_connected
        };
        if was_connected {
            self.deliver(DISCONNECT_EVENT, vec![json!(TRANSPORT_CLOSE_REASON)]);
        }
        self.open(recovered);
    }

    /// Answers a pending acknowledgement.
    ///
    /// Returns `false` if no acknowledgement with this ID is pending.
    pub fn acknowledge(&self, ack_id: u64, reply: Value) -> bool {
        let pending = self.state.lock().acks.remove(&ack_id);
        match pending {
            Some(pending) => {
                trace!(ack_id, event = %pending.event, "Acknowledging");
                let _ = pending.reply_tx.send(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Installs a callback that answers every acknowledged emission.
    pub fn set_ack_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.state.lock().ack_responder = Some(Arc::new(responder));
    }

    /// Returns the IDs of acknowledgements still waiting for an answer.
    #[must_use]
    pub fn pending_acks(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state.lock().acks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns every packet sent so far.
    ///
    /// Sent packets are kept until [`MemoryTransport::take_sent`] drains
    /// them. Long-running loopback users should drain periodically.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingPacket> {
        self.state.lock().sent.clone()
    }

    /// Returns and clears the sent packets.
    pub fn take_sent(&self) -> Vec<OutgoingPacket> {
        mem::take(&mut self.state.lock().sent)
    }

    /// Returns packets waiting for a connection.
    #[must_use]
    pub fn buffered(&self) -> Vec<OutgoingPacket> {
        self.state.lock().send_buffer.clone()
    }

    /// Returns how many times a listener was registered for `event`.
    ///
    /// Counts every `on`/`once` call, including ones since removed. One
    /// counter per distinct event name is kept until
    /// [`MemoryTransport::reset_registrations`] is called.
    #[must_use]
    pub fn registrations(&self, event: &str) -> usize {
        self.state
            .lock()
            .registrations
            .get(event)
            .copied()
            .unwrap_or(0)
    }

    /// Clears every registration counter. Live listeners are unaffected.
    pub fn reset_registrations(&self) {
        self.state.lock().registrations.clear();
    }
}

/// Converts `duration` to whole milliseconds, saturating at `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// MemoryTransport - Internal
// ============================================================================

impl MemoryTransport {
    /// Marks the transport connected and flushes the send buffer.
    fn open(&self, recovered: bool) {
        let flushed = {
            let mut state = self.state.lock();
            if state.connected {
                return;
            }
            state.connected = true;
            state.active = true;
            state.recovered = recovered && state.id.is_some();
            if !state.recovered {
                state.id = Some(SocketId::new(Uuid::new_v4().to_string()));
            }
            let flushed = mem::take(&mut state.send_buffer);
            state.sent.extend(flushed.iter().cloned());
            flushed
        };

        debug!(url = %self.config.url(), flushed = flushed.len(), "Memory transport connected");

        self.after_send(flushed);
        self.deliver(CONNECT_EVENT, Vec::new());
    }

    /// Records or buffers one packet, consuming the emission flags.
    fn dispatch(&self, event: &str, args: Args, ack_id: Option<u64>) -> Dispatch {
        let mut state = self.state.lock();
        let flags = mem::take(&mut state.flags);
        let packet = OutgoingPacket {
            event: event.to_string(),
            args,
            volatile: flags.volatile,
            compress: flags.compress,
            ack_id,
        };

        let sent = if state.connected {
            state.sent.push(packet.clone());
            Some(packet)
        } else if flags.volatile {
            trace!(event, "Dropping volatile packet while disconnected");
            None
        } else {
            trace!(event, "Buffering packet while disconnected");
            state.send_buffer.push(packet);
            None
        };

        Dispatch {
            sent,
            timeout: flags.timeout,
        }
    }

    /// Notifies outgoing listeners and runs the ack responder.
    fn after_send(&self, packets: Vec<OutgoingPacket>) {
        if packets.is_empty() {
            return;
        }

        let (outgoing, responder) = {
            let state = self.state.lock();
            (state.any_outgoing.clone(), state.ack_responder.clone())
        };

        for packet in packets {
            for listener in &outgoing {
                listener.call(&packet.event, &packet.args);
            }
            if let (Some(ack_id), Some(responder)) = (packet.ack_id, &responder) {
                let reply = responder(&packet.event, &packet.args);
                self.acknowledge(ack_id, reply);
            }
        }
    }

    /// Fails every pending acknowledgement.
    fn fail_pending_acks(acks: AckMap) {
        let count = acks.len();
        for (_, pending) in acks {
            let _ = pending.reply_tx.send(Err(Error::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "Failed pending acknowledgements on disconnect");
        }
    }
}

// ============================================================================
// MemoryTransport - Transport
// ============================================================================

#[async_trait]
impl Transport for MemoryTransport {
    fn connect(&self) {
        self.open(false);
    }

    fn disconnect(&self) {
        let acks = {
            let mut state = self.state.lock();
            state.active = false;
            if !state.connected {
                return;
            }
            state.connected = false;
            state.recovered = false;
            state.id = None;
            mem::take(&mut state.acks)
        };

        debug!(url = %self.config.url(), "Memory transport disconnected");

        Self::fail_pending_acks(acks);
        self.deliver(DISCONNECT_EVENT, vec![json!(CLIENT_DISCONNECT_REASON)]);
    }

    fn emit(&self, event: &str, args: Args) {
        let dispatch = self.dispatch(event, args, None);
        self.after_send(dispatch.sent.into_iter().collect());
    }

    fn send(&self, args: Args) {
        self.emit(MESSAGE_EVENT, args);
    }

    async fn emit_with_ack(&self, event: &str, args: Args) -> Result<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let ack_id = {
            let mut state = self.state.lock();
            let ack_id = state.next_ack_id;
            state.next_ack_id += 1;
            state.acks.insert(
                ack_id,
                PendingAck {
                    event: event.to_string(),
                    reply_tx,
                },
            );
            ack_id
        };

        let dispatch = self.dispatch(event, args, Some(ack_id));
        self.after_send(dispatch.sent.into_iter().collect());

        let reply = match dispatch.timeout {
            Some(limit) => match timeout(limit, reply_rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.state.lock().acks.remove(&ack_id);
                    return Err(Error::ack_timeout(event, saturating_millis(limit)));
                }
            },
            None => reply_rx.await,
        };

        reply.map_err(|_| Error::ack_dropped(event))?
    }

    fn on(&self, event: &str, listener: Listener) {
        self.state.lock().register(event, listener, false);
    }

    fn once(&self, event: &str, listener: Listener) {
        self.state.lock().register(event, listener, true);
    }

    fn off(&self, event: Option<&str>, listener: Option<&Listener>) {
        let mut state = self.state.lock();
        match (event, listener) {
            (Some(event), Some(listener)) => {
                if let Some(registrations) = state.listeners.get_mut(event) {
                    registrations.retain(|r| r.listener != *listener);
                    if registrations.is_empty() {
                        state.listeners.remove(event);
                    }
                }
            }
            (Some(event), None) => {
                state.listeners.remove(event);
            }
            (None, Some(listener)) => {
                for registrations in state.listeners.values_mut() {
                    registrations.retain(|r| r.listener != *listener);
                }
                state.listeners.retain(|_, registrations| !registrations.is_empty());
            }
            (None, None) => state.listeners.clear(),
        }
    }

    fn remove_all_listeners(&self, event: Option<&str>) {
        self.off(event, None);
    }

    fn on_any(&self, listener: AnyListener) {
        self.state.lock().any.push(listener);
    }

    fn prepend_any(&self, listener: AnyListener) {
        self.state.lock().any.insert(0, listener);
    }

    fn off_any(&self, listener: Option<&AnyListener>) {
        let mut state = self.state.lock();
        match listener {
            Some(listener) => state.any.retain(|l| l != listener),
            None => state.any.clear(),
        }
    }

    fn on_any_outgoing(&self, listener: AnyListener) {
        self.state.lock().any_outgoing.push(listener);
    }

    fn prepend_any_outgoing(&self, listener: AnyListener) {
        self.state.lock().any_outgoing.insert(0, listener);
    }

    fn off_any_outgoing(&self, listener: Option<&AnyListener>) {
        let mut state = self.state.lock();
        match listener {
            Some(listener) => state.any_outgoing.retain(|l| l != listener),
            None => state.any_outgoing.clear(),
        }
    }

    fn listeners(&self, event: &str) -> Vec<Listener> {
        self.state
            .lock()
            .listeners
            .get(event)
            .map(|registrations| registrations.iter().map(|r| r.listener.clone()).collect())
            .unwrap_or_default()
    }

    fn has_listeners(&self, event: &str) -> bool {
        self.state
            .lock()
            .listeners
            .get(event)
            .is_some_and(|registrations| !registrations.is_empty())
    }

    fn listeners_any(&self) -> Vec<AnyListener> {
        self.state.lock().any.clone()
    }

    fn listeners_any_outgoing(&self) -> Vec<AnyListener> {
        self.state.lock().any_outgoing.clone()
    }

    fn timeout(&self, timeout: Duration) {
        self.state.lock().flags.timeout = Some(timeout);
    }

    fn compress(&self, compress: bool) {
        self.state.lock().flags.compress = compress;
    }

    fn volatile(&self) {
        self.state.lock().flags.volatile = true;
    }

    fn auth(&self) -> Option<Value> {
        self.state.lock().auth.clone()
    }

    fn set_auth(&self, auth: Option<Value>) {
        self.state.lock().auth = auth;
    }

    fn id(&self) -> Option<SocketId> {
        self.state.lock().id.clone()
    }

    fn connected(&self) -> bool {
        self.state.lock().connected
    }

    fn disconnected(&self) -> bool {
        !self.state.lock().connected
    }

    fn active(&self) -> bool {
        self.state.lock().active
    }

    fn recovered(&self) -> bool {
        self.state.lock().recovered
    }
}

// ============================================================================
// MemoryFactory
// ============================================================================

/// Factory producing [`MemoryTransport`]s.
///
/// Keeps every transport it created so tests and demos can drive them.
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    created: Arc<Mutex<Vec<Arc<MemoryTransport>>>>,
}

impl MemoryFactory {
    /// Creates a factory with no transports.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every transport created so far, oldest first.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<MemoryTransport>> {
        self.created.lock().clone()
    }

    /// Returns the number of transports created so far.
    #[inline]
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// Returns the most recent transport created for `url`.
    #[must_use]
    pub fn transport(&self, url: &str) -> Option<Arc<MemoryTransport>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|t| t.config().url() == url)
            .cloned()
    }
}

impl TransportFactory for MemoryFactory {
    fn create(&self, config: &SocketConfig) -> Result<Arc<dyn Transport>> {
        let transport = Arc::new(MemoryTransport::new(config)?);
        self.created.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

// ============================================================================
// Tests
// ============================================================================
