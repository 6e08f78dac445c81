//! Listener callbacks with stable identity.
//!
//! Closures cannot be compared, so every callback is wrapped together with
//! a [`ListenerId`]. Clones share the same identity, which is what the
//! transport matches on when a listener is removed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Arguments carried by one event, in order.
pub type Args = Vec<Value>;

/// Callback signature for a named event.
type EventFn = dyn Fn(&[Value]) + Send + Sync;

/// Callback signature for catch-all listeners.
type AnyFn = dyn Fn(&str, &[Value]) + Send + Sync;

// ============================================================================
// Listener
// ============================================================================

/// A callback registered for one event name.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: Arc<EventFn>,
}

impl Listener {
    /// Wraps a callback with a fresh identity.
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::next(),
            callback: Arc::new(callback),
        }
    }

    /// Returns the listener's identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Invokes the callback.
    #[inline]
    pub fn call(&self, args: &[Value]) {
        (self.callback)(args);
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

// ============================================================================
// AnyListener
// ============================================================================

/// A catch-all callback receiving the event name and its arguments.
#[derive(Clone)]
pub struct AnyListener {
    id: ListenerId,
    callback: Arc<AnyFn>,
}

impl AnyListener {
    /// Wraps a callback with a fresh identity.
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::next(),
            callback: Arc::new(callback),
        }
    }

    /// Returns the listener's identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Invokes the callback.
    #[inline]
    pub fn call(&self, event: &str, args: &[Value]) {
        (self.callback)(event, args);
    }
}

impl PartialEq for AnyListener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyListener {}

impl fmt::Debug for AnyListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyListener").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
