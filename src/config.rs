//! Connection configuration.
//!
//! A [`SocketConfig`] is a base URL plus an open map of transport-level
//! settings (path, reconnection policy, query parameters, auth, transport
//! selection, ...). The facade never interprets the options; they are
//! handed verbatim to the [`TransportFactory`](crate::transport::TransportFactory).
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use socketio_facade::SocketConfig;
//!
//! let config = SocketConfig::new("http://localhost:3000")
//!     .with_path("/socket.io")
//!     .with_auth(json!({ "token": "secret" }))
//!     .with_option("reconnectionAttempts", 5);
//!
//! let chat = config.for_namespace("chat");
//! assert_eq!(chat.url(), "http://localhost:3000/chat");
//! assert_eq!(chat.options(), config.options());
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Separator between the base URL and a namespace.
const NAMESPACE_SEPARATOR: char = '/';

/// Option key controlling whether a transport connects on construction.
pub const AUTO_CONNECT_OPTION: &str = "autoConnect";

// ============================================================================
// SocketConfig
// ============================================================================

/// Immutable connection configuration.
///
/// Options are an open, string-keyed map of JSON values and are passed
/// through to the transport unexamined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Base address of the server (may include a namespace path).
    url: String,

    /// Transport-level settings.
    #[serde(default)]
    options: Map<String, Value>,
}

// ============================================================================
// SocketConfig - Constructors
// ============================================================================

impl SocketConfig {
    /// Creates a config with the given URL and no options.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: Map::new(),
        }
    }

    /// Creates a config with the given URL and options map.
    #[inline]
    #[must_use]
    pub fn with_options(url: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    /// Parses a config from JSON of the form `{ "url": ..., "options": { ... } }`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// SocketConfig - Builder Methods
// ============================================================================

impl SocketConfig {
    /// Sets an arbitrary transport option.
    #[inline]
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets the HTTP path of the endpoint (`path` option).
    #[inline]
    #[must_use]
    pub fn with_path(self, path: impl Into<String>) -> Self {
        self.with_option("path", path.into())
    }

    /// Sets the auth payload sent with the handshake (`auth` option).
    #[inline]
    #[must_use]
    pub fn with_auth(self, auth: Value) -> Self {
        self.with_option("auth", auth)
    }

    /// Adds a query parameter (`query` option).
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let query = self
            .options
            .entry("query")
            .or_insert_with(|| Value::Object(Map::new()));
        if !query.is_object() {
            *query = Value::Object(Map::new());
        }
        if let Value::Object(map) = query {
            map.insert(key.into(), Value::String(value.into()));
        }
        self
    }

    /// Sets whether the transport connects on construction (`autoConnect` option).
    #[inline]
    #[must_use]
    pub fn with_auto_connect(self, auto_connect: bool) -> Self {
        self.with_option(AUTO_CONNECT_OPTION, auto_connect)
    }
}

// ============================================================================
// SocketConfig - Accessors
// ============================================================================

impl SocketConfig {
    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the options map.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Returns a single option by key.
    #[inline]
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Returns the `autoConnect` option, defaulting to `true`.
    #[inline]
    #[must_use]
    pub fn auto_connect(&self) -> bool {
        self.option(AUTO_CONNECT_OPTION)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

// ============================================================================
// SocketConfig - Namespace Derivation
// ============================================================================

impl SocketConfig {
    /// Derives the config for a namespace of this connection.
    ///
    /// The URL is the base URL and the namespace joined by exactly one
    /// `/`. All options are copied unchanged. `self` is not modified.
    #[must_use]
    pub fn for_namespace(&self, namespace: &str) -> Self {
        Self {
            url: join_namespace(&self.url, namespace),
            options: self.options.clone(),
        }
    }
}

/// Joins a base URL and a namespace with exactly one separator.
///
/// A separator is inserted only if neither side already contributes one.
fn join_namespace(base: &str, namespace: &str) -> String {
    let base_has = base.ends_with(NAMESPACE_SEPARATOR);
    let namespace_has = namespace.starts_with(NAMESPACE_SEPARATOR);

    match (base_has, namespace_has) {
        (false, false) => format!("{base}{NAMESPACE_SEPARATOR}{namespace}"),
        (true, true) => format!("{base}{}", &namespace[NAMESPACE_SEPARATOR.len_utf8()..]),
        _ => format!("{base}{namespace}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_join_inserts_missing_separator() {
        assert_eq!(join_namespace("http://host", "chat"), "http://host/chat");
    }

    #[test]
    fn test_join_uses_base_separator() {
        assert_eq!(join_namespace("http://host/", "chat"), "http://host/chat");
    }

    #[test]
    fn test_join_uses_namespace_separator() {
        assert_eq!(join_namespace("http://host", "/chat"), "http://host/chat");
    }

    #[test]
    fn test_join_never_doubles_separator() {
        assert_eq!(join_namespace("http://host/", "/chat"), "http://host/chat");
    }

    #[test]
    fn test_for_namespace_copies_options() {
        let config = SocketConfig::new("http://host")
            .with_path("/ws")
            .with_option("reconnection", false);
        let derived = config.for_namespace("admin");

        assert_eq!(derived.url(), "http://host/admin");
        assert_eq!(derived.options(), config.options());
        assert_eq!(config.url(), "http://host");
    }

    #[test]
    fn test_from_json() {
        let config = SocketConfig::from_json(
            r#"{ "url": "http://localhost:8988", "options": { "transports": ["websocket"] } }"#,
        )
        .unwrap();

        assert_eq!(config.url(), "http://localhost:8988");
        assert_eq!(config.option("transports"), Some(&json!(["websocket"])));
    }

    #[test]
    fn test_from_json_without_options() {
        let config = SocketConfig::from_json(r#"{ "url": "http://h" }"#).unwrap();
        assert!(config.options().is_empty());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(SocketConfig::from_json("{ url: ").is_err());
    }

    #[test]
    fn test_with_query_accumulates() {
        let config = SocketConfig::new("http://h")
            .with_query("room", "lobby")
            .with_query("lang", "en");

        assert_eq!(
            config.option("query"),
            Some(&json!({ "room": "lobby", "lang": "en" }))
        );
    }

    #[test]
    fn test_auto_connect_defaults_to_true() {
        assert!(SocketConfig::new("http://h").auto_connect());
        assert!(!SocketConfig::new("http://h").with_auto_connect(false).auto_connect());
    }

    proptest! {
        #[test]
        fn prop_join_has_exactly_one_separator(
            base in "[a-z]{1,8}://[a-z]{1,8}/?",
            namespace in "/?[a-z]{1,8}",
        ) {
            let joined = join_namespace(&base, &namespace);
            let host_end = base.trim_end_matches('/').len();
            let tail = &joined[host_end..];
            let name = namespace.trim_start_matches('/');

            prop_assert_eq!(tail, format!("/{name}"));
        }
    }
}
