use async_trait::async_trait;
use futures::{SinkExt as _, StreamExt as _, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::traits::{Frame, FrameSink, FrameStream, Transport};
use crate::Result;
use crate::error::Error;

/// [`Transport`] backed by `tokio-tungstenite`.
///
/// TLS is handled by rustls with the platform's native roots. Binary, ping and pong frames are
/// dropped: the notification protocol is text-only and tungstenite answers pings on its own.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<(FrameSink, FrameStream)> {
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(Error::from)
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text.into()))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Close(frame)) => Some(Ok(Frame::Close(
                    frame.map(|frame| frame.reason.as_str().to_owned()),
                ))),
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
