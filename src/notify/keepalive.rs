use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::client::Client;
use crate::ws::Transport;

/// Caller-owned task sending a `ping` at a fixed interval while the client is connected.
///
/// The connection itself never schedules pings. Ticks that fall while the client is not
/// connected are skipped. The task holds a handle to the client, so the connection stays
/// alive until the keep-alive is stopped or dropped.
#[derive(Debug)]
pub struct KeepAlive {
    token: CancellationToken,
    done: Option<oneshot::Receiver<()>>,
}

impl KeepAlive {
    /// Start pinging through `client` every `interval`. The first ping is sent one interval
    /// after starting.
    #[must_use = "dropping the keep-alive stops it immediately"]
    pub fn spawn<T: Transport>(client: &Client<T>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel::<()>();

        let token_clone = token.clone();
        let client = client.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token_clone.cancelled() => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Keep-alive cancellation requested, terminating...");
                        break
                    },
                    _ = ticker.tick() => {
                        if !client.is_connected() {
                            continue;
                        }
                        match client.ping() {
                            Ok(id) => {
                                #[cfg(feature = "tracing")]
                                tracing::trace!(%id, "Keep-alive ping sent");
                                #[cfg(not(feature = "tracing"))]
                                let _ = &id;
                            }
                            Err(e) => {
                                #[cfg(feature = "tracing")]
                                tracing::warn!(error = %e, "Unable to send keep-alive ping");
                                #[cfg(not(feature = "tracing"))]
                                let _ = &e;
                            }
                        }
                    }
                }
            }

            _ = tx.send(());
        });

        Self {
            token,
            done: Some(rx),
        }
    }

    /// Whether the task has not been asked to stop yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel the task and wait until it has terminated.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(done) = self.done.take() {
            _ = done.await;
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
