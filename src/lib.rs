//! Socket.IO client facade with shared event streams and cached namespaces.
//!
//! This library puts one small, chainable surface in front of a real-time
//! socket transport. Application code consumes events through shared,
//! reference-counted streams instead of one raw listener per consumer, and
//! addresses namespaces of a connection without duplicating config.
//!
//! # Architecture
//!
//! - **Socket**: the facade; owns exactly one transport
//! - **Transport**: the external connection, consumed through a trait
//! - **Multiplexer**: N consumers of an event share 1 transport listener
//! - **Namespace registry**: one cached child socket per namespace
//!
//! The transport is chosen by the application: a [`TransportFactory`] is
//! passed once to [`Socket::new`] and reused for every namespace.
//!
//! # Quick Start
//!
//! ```
//! use futures_util::StreamExt;
//! use serde_json::json;
//! use socketio_facade::{MemoryFactory, Result, Socket, SocketConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let factory = MemoryFactory::new();
//!     let socket = Socket::new(SocketConfig::new("http://localhost:3000"), factory.clone())?;
//!
//!     // Two consumers, one listener on the transport
//!     let mut a = socket.subscribe_event("message");
//!     let mut b = socket.subscribe_event("message");
//!
//!     let transport = factory.transport("http://localhost:3000").unwrap();
//!     transport.deliver("message", vec![json!("hello")]);
//!
//!     assert_eq!(a.next().await, Some(vec![json!("hello")]));
//!     assert_eq!(b.next().await, Some(vec![json!("hello")]));
//!     assert_eq!(transport.registrations("message"), 1);
//!
//!     // Namespaces are derived from the root config and cached
//!     let chat = socket.of("chat")?;
//!     chat.emit("join", vec![json!("lobby")]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`socket`] | [`Socket`] facade, multiplexer, namespace registry |
//! | [`transport`] | [`Transport`] trait, listeners, memory transport |
//! | [`config`] | [`SocketConfig`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Connection configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// The socket facade.
///
/// - [`Socket`] - Chainable facade
/// - [`EventStream`] - Consumer of a shared event stream
/// - [`OnceEvent`] - Future for the next occurrence of an event
pub mod socket;

/// Transport capability set.
///
/// The facade performs no network I/O itself; see [`Transport`].
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Config
pub use config::SocketConfig;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ListenerId, SocketId};

// Socket types
pub use socket::{
    EventStream, EventStreamMultiplexer, NamespaceRegistry, OnceEvent, ROOT_NAMESPACE, Socket,
};

// Transport types
pub use transport::{
    AnyListener, Args, Listener, MemoryFactory, MemoryTransport, OutgoingPacket, Transport,
    TransportFactory,
};
