//! Hello Server - JSON request/response example.
//!
//! This example demonstrates:
//! - Loading a `ServerConfig` from an optional JSON file
//! - Registering a typed JSON handler for one message identifier
//! - Replying on the same session from the logic worker
//!
//! # Running
//!
//! ```text
//! RUST_LOG=debug cargo run --example hello_server [config.json]
//! ```
//!
//! Then send a frame whose body is the identifier `1001` (big-endian)
//! followed by `{"id":1001,"data":"hello world"}`.

use serde::{Deserialize, Serialize};
use sessionwire::{Server, ServerConfig};
use tracing_subscriber::EnvFilter;

const MSG_HELLO_WORLD: u16 = 1001;

/// Request and reply body for the hello message.
#[derive(Serialize, Deserialize, Debug)]
struct HelloWorld {
    id: u16,
    data: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };

    let server = Server::builder()
        .config(config)
        .handle_json(MSG_HELLO_WORLD, |session, hello: HelloWorld| {
            tracing::info!("Session {} says: {}", session.id(), hello.data);
            let reply = HelloWorld {
                id: hello.id,
                data: format!("server has received msg, msg data is {}", hello.data),
            };
            session.send_json(MSG_HELLO_WORLD, &reply)
        })
        .start()
        .await?;

    tracing::info!("Hello server listening on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    let stats = server.shutdown().await;
    tracing::info!(
        "Shut down after {} messages ({} unhandled, {} failed)",
        stats.processed,
        stats.unhandled,
        stats.failed
    );

    Ok(())
}
