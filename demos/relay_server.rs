//! Group chat relay server example
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                    # binds to 0.0.0.0:8080
//!   cargo run --example relay_server localhost          # binds to 127.0.0.1:8080
//!   cargo run --example relay_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Chatting
//!
//! Open two WebSocket clients in the same group, e.g. with websocat:
//!   websocat "ws://localhost:8080/ws?group_id=room1&client_id=alice"
//!   websocat "ws://localhost:8080/ws?group_id=room1&client_id=bob"
//!
//! Lines typed by alice show up for bob as "alice: <line>" and vice versa.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use group_relay::registry::Frame;
use group_relay::stats::SessionStats;
use group_relay::{RelayHandler, RelayServer, ServerConfig, SessionContext};

/// Handler that prints lifecycle events and counts traffic
struct ChatHandler {
    connections: AtomicU64,
    messages: AtomicU64,
}

impl ChatHandler {
    fn new() -> Self {
        Self {
            connections: AtomicU64::new(0),
            messages: AtomicU64::new(0),
        }
    }
}

impl RelayHandler for ChatHandler {
    async fn on_connection(&self, ctx: &SessionContext) -> bool {
        let n = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "[{}] {} connected to {} from {} ({} connections so far)",
            ctx.session_id, ctx.member, ctx.group, ctx.peer_addr, n
        );
        true
    }

    async fn on_message(&self, _ctx: &SessionContext, _frame: &Frame) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_disconnect(&self, ctx: &SessionContext, stats: &SessionStats) {
        println!(
            "[{}] {} left {} after {:?}: sent={} delivered={} (total messages relayed: {})",
            ctx.session_id,
            ctx.member,
            ctx.group,
            ctx.connected_at.elapsed(),
            stats.messages_received,
            stats.deliveries,
            self.messages.load(Ordering::Relaxed)
        );
    }
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::with_addr(bind_addr);

    println!("Starting relay server on ws://{}{}", config.bind_addr, config.path);
    println!("Connect with: ws://HOST:PORT/ws?group_id=<group>&client_id=<name>");
    println!();

    let server = RelayServer::new(config, ChatHandler::new());

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    let stats = server.stats().await;
    println!(
        "Served {} connections in {:?}",
        stats.total_connections, stats.uptime
    );

    Ok(())
}
