//! Per-namespace socket cache.
//!
//! A namespace is a logical sub-channel of a connection, addressed by a
//! path-like string and backed by its own transport. The registry derives
//! the namespace's config from its parent, builds the socket on first use,
//! and hands out the same socket for every later lookup. Entries live as
//! long as the parent socket.

// ============================================================================
// Imports
// ============================================================================

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::Result;

use super::core::Socket;

// ============================================================================
// Constants
// ============================================================================

/// Marker for the root namespace.
pub const ROOT_NAMESPACE: &str = "/";

// ============================================================================
// NamespaceRegistry
// ============================================================================

/// Cache of child sockets by namespace string.
#[derive(Default)]
pub struct NamespaceRegistry {
    namespaces: Mutex<FxHashMap<String, Socket>>,
}

impl fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.namespaces.lock().keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("NamespaceRegistry")
            .field("namespaces", &names)
            .finish()
    }
}

impl NamespaceRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the socket for `namespace` relative to `parent`.
    ///
    /// `""` and `"/"` resolve to `parent` itself. Any other string is
    /// looked up in the cache; on a miss the child config is derived from
    /// `parent`'s config and a new socket is built with `parent`'s factory.
    ///
    /// The factory runs without the registry lock held, so it may block or
    /// resolve other namespaces of `parent`. If two callers race on the same
    /// namespace, the first socket inserted wins and the other is dropped.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error. Nothing is cached in that case.
    pub fn resolve(&self, parent: &Socket, namespace: &str) -> Result<Socket> {
        if is_root(namespace) {
            return Ok(parent.clone());
        }

        if let Some(existing) = self.namespaces.lock().get(namespace) {
            return Ok(existing.clone());
        }

        let config = parent.config().for_namespace(namespace);
        let url = config.url().to_string();
        let built = Socket::with_factory(config, Arc::clone(parent.factory()))?;

        let socket = match self.namespaces.lock().entry(namespace.to_string()) {
            Entry::Occupied(entry) => {
                trace!(namespace, "Namespace socket built concurrently, discarding");
                return Ok(entry.get().clone());
            }
            Entry::Vacant(entry) => entry.insert(built).clone(),
        };

        debug!(namespace, url = %url, "Namespace socket created");

        Ok(socket)
    }

    /// Returns the number of cached namespaces.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaces.lock().len()
    }

    /// Returns `true` if no namespace has been resolved yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.lock().is_empty()
    }

    /// Returns `true` if `namespace` is cached.
    #[inline]
    #[must_use]
    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.lock().contains_key(namespace)
    }
}

/// Returns `true` for the strings that address the calling socket itself.
#[inline]
fn is_root(namespace: &str) -> bool {
    namespace.is_empty() || namespace == ROOT_NAMESPACE
}

// ============================================================================
// Tests
// ============================================================================
