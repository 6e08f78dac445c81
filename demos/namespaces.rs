//! Namespace demonstration.
//!
//! Demonstrates:
//! - of() deriving namespace sockets from the root config
//! - reuse of cached namespace sockets
//! - chainable commands and acknowledgements
//!
//! Usage:
//!   cargo run --example namespaces
//!   cargo run --example namespaces -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::json;

use common::{Args, SERVER_URL, init_logging};
use socketio_facade::{AnyListener, MemoryFactory, Result, Socket, SocketConfig};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let factory = MemoryFactory::new();
    let config = SocketConfig::new(SERVER_URL)
        .with_path("/socket.io")
        .with_auth(json!({ "token": "demo" }));
    let socket = Socket::new(config, factory.clone())?;

    println!("=== Namespaces ===\n");

    let chat = socket.of("chat")?;
    let admin = socket.of("/admin")?;
    let chat_again = socket.of("chat")?;
    let root = socket.of("/")?;

    println!("[1] chat  -> {}", chat.config().url());
    println!("[2] admin -> {}", admin.config().url());
    println!("[3] chat reused: {}", chat.ptr_eq(&chat_again));
    println!("[4] '/' is root: {}", root.ptr_eq(&socket));
    println!("[5] transports built: {}", factory.created_count());

    chat.on_any_outgoing(AnyListener::new(|event, args| {
        println!("    outgoing {event} {args:?}");
    }))
    .emit("join", vec![json!("lobby")])
    .compress(false)
    .emit("say", vec![json!("hello")]);

    if let Some(transport) = factory.transport(chat.config().url()) {
        transport.set_ack_responder(|event, _| json!({ "ok": true, "event": event }));
    }
    let reply = chat
        .timeout(Duration::from_secs(1))
        .emit_with_ack("history", vec![json!(10)])
        .await?;
    println!("[6] ack: {reply}");

    socket.disconnect();
    println!(
        "[7] root connected={}, chat connected={}",
        socket.connected(),
        chat.connected()
    );

    println!("\n=== Done ===");
    Ok(())
}
