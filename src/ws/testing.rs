//! In-memory [`Transport`] driven by a script of connection outcomes.

#![allow(
    clippy::unwrap_used,
    reason = "Poisoned test locks should fail the test loudly"
)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc as channel;
use futures::{SinkExt as _, future};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as TungsteniteError;
use url::Url;

use super::error::WsError;
use super::traits::{Frame, FrameSink, FrameStream, Transport};
use crate::Result;
use crate::error::Error;

/// Outcome of one `open` call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// The connection is refused
    Refuse,
    /// The handshake is rejected with the given HTTP status
    Reject(u16),
    /// The open never completes
    Hang,
    /// The open succeeds and the server end is handed to the test
    Accept,
}

/// Test-side half of an accepted connection.
///
/// Dropping `inbound` ends the client's stream, which the client sees as a lost connection.
pub(crate) struct ServerEnd {
    pub(crate) inbound: channel::UnboundedSender<Result<Frame>>,
    pub(crate) outbound: channel::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub(crate) fn push_text(&self, text: &str) {
        _ = self.inbound.unbounded_send(Ok(Frame::Text(text.to_owned())));
    }
}

struct Shared {
    script: Mutex<VecDeque<Script>>,
    urls: Mutex<Vec<Url>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

/// Cloneable so a test can keep inspecting the transport it handed to a manager.
#[derive(Clone)]
pub(crate) struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    /// Once the script runs out every further open is refused.
    pub(crate) fn new<I: IntoIterator<Item = Script>>(
        script: I,
    ) -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let transport = Self {
            shared: Arc::new(Shared {
                script: Mutex::new(script.into_iter().collect()),
                urls: Mutex::new(Vec::new()),
                servers,
            }),
        };
        (transport, accepted)
    }

    pub(crate) fn opened(&self) -> usize {
        self.shared.urls.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<Url> {
        self.shared.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
        self.shared.urls.lock().unwrap().push(url.clone());
        let next = self
            .shared
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse);

        match next {
            Script::Refuse => Err(WsError::Connection(TungsteniteError::Io(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            )))
            .into()),
            Script::Reject(status) => Err(WsError::AuthenticationFailed { status }.into()),
            Script::Hang => future::pending().await,
            Script::Accept => {
                let (inbound, stream) = channel::unbounded();
                let (sink, outbound) = channel::unbounded::<String>();
                _ = self.shared.servers.send(ServerEnd { inbound, outbound });

                let sink = sink.sink_map_err(|_e| Error::from(WsError::ConnectionClosed));
                Ok((Box::pin(sink), Box::pin(stream)))
            }
        }
    }
}
