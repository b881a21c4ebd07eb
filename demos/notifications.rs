//! Notification channel walkthrough.
//!
//! Connects to a notification endpoint, subscribes to one job and one repository, and logs every
//! message, state change and undecodable frame until interrupted or the timeout expires.
//!
//! Run with tracing enabled:
//! ```sh
//! NOTIFY_ENDPOINT=wss://notify.example.com/ws NOTIFY_TOKEN=... \
//!     RUST_LOG=info cargo run --example notifications --features tracing
//! ```

use std::env;
use std::time::Duration;

use notify_client_sdk::auth::{SecretString, TokenSource};
use notify_client_sdk::notify::{Client, Message, MessageType};
use notify_client_sdk::ws::{ConnectionOptions, ReconnectConfig, Selector};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let endpoint = env::var("NOTIFY_ENDPOINT").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_owned());
    let job_id = env::var("NOTIFY_JOB").unwrap_or_else(|_| "job-1".to_owned());
    let repo_id = env::var("NOTIFY_REPO").unwrap_or_else(|_| "repo-1".to_owned());

    // The provider is consulted on every attempt, so a rotated token is picked up on reconnect.
    let token = TokenSource::provider(|| async {
        let token = env::var("NOTIFY_TOKEN").unwrap_or_default();
        Ok::<_, notify_client_sdk::error::Error>(SecretString::from(token))
    });

    let options = ConnectionOptions::builder()
        .endpoint(endpoint)
        .maybe_scope(env::var("NOTIFY_SCOPE").ok())
        .token(token)
        .reconnect(
            ReconnectConfig::builder()
                .max_attempts(10)
                .stop_on_auth_failure(true)
                .build(),
        )
        .build();
    let client = Client::new(options)?;

    let _state = client.on_connection_state_change(|state| info!(%state, "Connection state"));
    let _errors = client.on_decode_error(|error| warn!(reason = %error.reason, raw = %error.raw));
    let _progress = client.on(MessageType::JobProgress, |message: &Message| {
        if let Message::JobProgress(job) = message {
            info!(
                job_id = %job.job_id,
                status = ?job.status,
                progress = %job.progress,
                files = ?job.files_processed,
                total = ?job.total_files
            );
        }
    });
    let _everything = client.on(Selector::Wildcard, |message: &Message| {
        info!(kind = %message.message_type(), id = ?message.meta().id);
    });

    client.connect().await?;
    client.subscribe_to_job(&job_id)?;
    client.subscribe_to_repo(&repo_id)?;
    info!(subscriptions = client.subscription_count());

    let id = client.ping()?;
    info!(%id, "Ping sent");

    tokio::time::sleep(Duration::from_secs(60)).await;

    client.unsubscribe_from_job(&job_id)?;
    client.disconnect();
    info!(state = %client.state(), "Done");

    Ok(())
}
