//! Keeps a notification connection warm with periodic pings and logs the matching pongs.
//!
//! Run with:
//! ```sh
//! NOTIFY_ENDPOINT=ws://127.0.0.1:8080/ws RUST_LOG=debug \
//!     cargo run --example keepalive --features heartbeats,tracing
//! ```

use std::env;
use std::time::Duration;

use notify_client_sdk::notify::{Client, KeepAlive, Message, MessageType};
use notify_client_sdk::ws::ConnectionOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let endpoint = env::var("NOTIFY_ENDPOINT").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_owned());
    let client = Client::new(ConnectionOptions::builder().endpoint(endpoint).build())?;

    let _pongs = client.on(MessageType::Pong, |message: &Message| {
        info!(id = ?message.meta().id, "Pong received");
    });

    client.connect().await?;
    let keepalive = KeepAlive::spawn(&client, Duration::from_secs(15));

    tokio::time::sleep(Duration::from_secs(90)).await;

    keepalive.stop().await;
    client.disconnect();

    Ok(())
}
