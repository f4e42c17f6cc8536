//! WebSocket Transport
//!
//! Production `Connector`: a `tokio-tungstenite` WebSocket over rustls,
//! narrowed to text frames. Ping/pong is answered by tungstenite while
//! the stream is polled; binary frames are ignored.

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{Connector, FrameSink, FrameStream, TransportError};

/// Opens venue WebSockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        tracing::debug!(url = %url, "Opening WebSocket");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::Send(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::info!(frame = ?frame, "Server sent close frame");
                    Some(Err(TransportError::Closed))
                }
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
