//! Shared event stream demonstration.
//!
//! Demonstrates:
//! - subscribe_event (many consumers, one transport listener)
//! - once_event (one-shot future)
//! - listener teardown when the last consumer leaves
//!
//! Usage:
//!   cargo run --example shared_streams
//!   cargo run --example shared_streams -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use futures_util::StreamExt;
use serde_json::json;

use common::{Args, SERVER_URL, init_logging};
use socketio_facade::{MemoryFactory, Result, Socket, SocketConfig};

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
    let socket = Socket::new(SocketConfig::new(SERVER_URL), factory.clone())?;
    let Some(transport) = factory.transport(SERVER_URL) else {
        eprintln!("transport was not recorded");
        return Ok(());
    };

    println!("=== Shared streams ===\n");

    let mut ticker = socket.subscribe_event("price");
    let mut chart = socket.subscribe_event("price");
    let ready = socket.once_event("ready");

    println!(
        "[1] Subscribers: {}, transport listeners: {}",
        socket.events().subscriber_count("price"),
        socket.listeners("price").len()
    );

    for price in [101, 102, 103] {
        transport.deliver("price", vec![json!(price)]);
    }
    transport.deliver("ready", vec![json!("warm")]);
    transport.deliver("ready", vec![json!("ignored")]);

    for _ in 0..3 {
        let (a, b) = (ticker.next().await, chart.next().await);
        println!("[2] ticker={a:?} chart={b:?}");
    }
    println!("[3] ready resolved with {:?}", ready.await);

    drop(ticker);
    println!(
        "[4] After one consumer left: listeners={}",
        socket.listeners("price").len()
    );

    chart.unsubscribe();
    println!(
        "[5] After last consumer left: listeners={}, streaming={}",
        socket.listeners("price").len(),
        socket.events().is_streaming("price")
    );

    println!("\n=== Done ===");
    Ok(())
}
