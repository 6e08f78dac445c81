//! Transport capability set.
//!
//! The facade never performs network I/O itself. It consumes a transport
//! through the [`Transport`] trait and obtains one per socket from a
//! [`TransportFactory`] chosen by the application.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   create(config)   ┌──────────────────┐
//! │     Socket      │───────────────────►│ TransportFactory │
//! │   (facade)      │                    └──────────────────┘
//! │                 │   on/off/emit/...  ┌──────────────────┐
//! │                 │───────────────────►│    Transport     │──► network
//! └─────────────────┘                    └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `listener` | Listener callbacks with stable identity |
//! | `memory` | In-process transport without network I/O |

// ============================================================================
// Submodules
// ============================================================================

/// Listener callbacks with stable identity.
pub mod listener;

/// In-process loopback transport.
pub mod memory;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SocketConfig;
use crate::error::Result;
use crate::identifiers::SocketId;

// ============================================================================
// Re-exports
// ============================================================================

pub use listener::{AnyListener, Args, Listener};
pub use memory::{MemoryFactory, MemoryTransport, OutgoingPacket};

// ============================================================================
// Transport
// ============================================================================

/// The capability set a socket transport must expose.
///
/// Event and outgoing-packet semantics (buffering, reconnection,
/// serialization) belong to the implementation. Delivery callbacks must
/// not be invoked while the implementation holds an internal lock that
/// `on`/`off` also take.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the connection.
    fn connect(&self);

    /// Closes the connection.
    fn disconnect(&self);

    /// Emits an event to the server.
    fn emit(&self, event: &str, args: Args);

    /// Emits a `message` event.
    fn send(&self, args: Args);

    /// Emits an event and waits for the server's acknowledgement.
    async fn emit_with_ack(&self, event: &str, args: Args) -> Result<Value>;

    /// Registers a listener for an event.
    fn on(&self, event: &str, listener: Listener);

    /// Registers a listener that is removed after its first invocation.
    fn once(&self, event: &str, listener: Listener);

    /// Removes listeners.
    ///
    /// With an event and a listener, removes that listener. With only an
    /// event, removes every listener for it. With neither, removes all.
    fn off(&self, event: Option<&str>, listener: Option<&Listener>);

    /// Removes every listener for `event`, or for all events.
    fn remove_all_listeners(&self, event: Option<&str>);

    /// Registers a catch-all listener for incoming events.
    fn on_any(&self, listener: AnyListener);

    /// Registers a catch-all listener ahead of existing ones.
    fn prepend_any(&self, listener: AnyListener);

    /// Removes a catch-all listener, or all of them.
    fn off_any(&self, listener: Option<&AnyListener>);

    /// Registers a catch-all listener for outgoing packets.
    fn on_any_outgoing(&self, listener: AnyListener);

    /// Registers an outgoing catch-all listener ahead of existing ones.
    fn prepend_any_outgoing(&self, listener: AnyListener);

    /// Removes an outgoing catch-all listener, or all of them.
    fn off_any_outgoing(&self, listener: Option<&AnyListener>);

    /// Returns the listeners registered for an event.
    fn listeners(&self, event: &str) -> Vec<Listener>;

    /// Returns `true` if at least one listener is registered for an event.
    fn has_listeners(&self, event: &str) -> bool;

    /// Returns the incoming catch-all listeners.
    fn listeners_any(&self) -> Vec<AnyListener>;

    /// Returns the outgoing catch-all listeners.
    fn listeners_any_outgoing(&self) -> Vec<AnyListener>;

    /// Sets the acknowledgement timeout for the next emission.
    fn timeout(&self, timeout: Duration);

    /// Sets the compression flag for the next emission.
    fn compress(&self, compress: bool);

    /// Marks the next emission as droppable if it cannot be sent now.
    fn volatile(&self);

    /// Returns the auth payload.
    fn auth(&self) -> Option<Value>;

    /// Replaces the auth payload.
    fn set_auth(&self, auth: Option<Value>);

    /// Returns the session ID, if connected.
    fn id(&self) -> Option<SocketId>;

    /// Returns `true` if the socket is connected.
    fn connected(&self) -> bool;

    /// Returns `true` if the socket is disconnected.
    fn disconnected(&self) -> bool;

    /// Returns `true` if the socket will try to (re)connect.
    fn active(&self) -> bool;

    /// Returns `true` if the last reconnection restored the session state.
    fn recovered(&self) -> bool;
}

// ============================================================================
// TransportFactory
// ============================================================================

/// Builds one transport per socket from a resolved config.
///
/// Configuration errors (missing or malformed URL) surface here.
/// Any `Fn(&SocketConfig) -> Result<Arc<dyn Transport>>` closure is a
/// factory.
pub trait TransportFactory: Send + Sync {
    /// Creates a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns whatever the implementation fails with, typically
    /// [`Error::Config`](crate::Error::Config).
    fn create(&self, config: &SocketConfig) -> Result<Arc<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&SocketConfig) -> Result<Arc<dyn Transport>> + Send + Sync,
{
    fn create(&self, config: &SocketConfig) -> Result<Arc<dyn Transport>> {
        self(config)
    }
}
