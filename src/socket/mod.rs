//! Socket facade module.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Socket`] | Chainable facade (owns one transport) |
//! | [`EventStreamMultiplexer`] | Shared, reference-counted event streams |
//! | [`NamespaceRegistry`] | Cached namespace sockets |
//!
//! # Example
//!
//! ```
//! use socketio_facade::{MemoryFactory, Socket, SocketConfig};
//!
//! # fn example() -> socketio_facade::Result<()> {
//! let socket = Socket::new(SocketConfig::new("http://localhost:3000"), MemoryFactory::new())?;
//!
//! let news = socket.subscribe_event("news");
//! let admin = socket.of("/admin")?;
//! assert!(admin.ptr_eq(&socket.of("/admin")?));
//! # drop(news);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// The facade itself.
pub mod core;

/// Shared event streams.
pub mod multiplexer;

/// Namespace cache.
pub mod namespace;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Socket;
pub use multiplexer::{EventStream, EventStreamMultiplexer, OnceEvent};
pub use namespace::{NamespaceRegistry, ROOT_NAMESPACE};
