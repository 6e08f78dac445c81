//! Error types for the socket facade.
//!
//! The facade itself introduces no error taxonomy: every delegated call
//! fails exactly as the transport fails. This module defines the error type
//! transports use for the few fallible seams of the capability set.
//!
//! # Usage
//!
//! ```ignore
//! use socketio_facade::{Result, Socket};
//!
//! async fn example(socket: &Socket) -> Result<()> {
//!     let reply = socket.emit_with_ack("ping", vec![]).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectionClosed`], [`Error::Transport`] |
//! | Acknowledgement | [`Error::AckTimeout`], [`Error::AckDropped`] |
//! | External | [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by a transport constructor when the config it was handed
    /// cannot be used (for example an empty `url`).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport failure.
    ///
    /// Generic failure raised by a transport implementation.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Acknowledgement Errors
    // ========================================================================
    /// Acknowledgement not received in time.
    ///
    /// Returned by `emit_with_ack` when a `timeout` was configured and the
    /// remote end did not answer.
    #[error("Acknowledgement for '{event}' timed out after {timeout_ms}ms")]
    AckTimeout {
        /// Event whose acknowledgement timed out.
        event: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Acknowledgement dropped without an answer.
    #[error("Acknowledgement for '{event}' was dropped")]
    AckDropped {
        /// Event whose acknowledgement was dropped.
        event: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an acknowledgement timeout error.
    #[inline]
    pub fn ack_timeout(event: impl Into<String>, timeout_ms: u64) -> Self {
        Self::AckTimeout {
            event: event.into(),
            timeout_ms,
        }
    }

    /// Creates an acknowledgement dropped error.
    #[inline]
    pub fn ack_dropped(event: impl Into<String>) -> Self {
        Self::AckDropped {
            event: event.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ConnectionClosed)
    }

    /// Returns `true` if this error came from an unusable configuration.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Url(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
