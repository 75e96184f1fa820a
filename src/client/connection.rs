//! WebSocket link to the controller peer.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::ClientError;

/// One open text channel to the peer
pub struct PeerLink {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PeerLink {
    /// Open a WebSocket to `url`. No timeout and no retry.
    pub async fn open(url: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let (stream, response) =
            connect_async(parsed.as_str())
                .await
                .map_err(|source| ClientError::Connect {
                    url: url.to_string(),
                    source: Box::new(source),
                })?;

        debug!("WebSocket handshake with {} ({})", url, response.status());

        Ok(Self {
            url: url.to_string(),
            stream,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| ClientError::Send(Box::new(e)))
    }

    /// Next text frame from the peer, or `None` once the channel is gone.
    ///
    /// Control frames are skipped; binary frames are accepted if they are
    /// valid UTF-8.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(text),
                    Err(_) => {
                        warn!("Dropping non-UTF-8 binary frame from {}", self.url);
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("Peer {} closed the channel: {:?}", self.url, frame);
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket read error from {}: {}", self.url, e);
                    return None;
                }
                None => {
                    info!("Peer {} stream ended", self.url);
                    return None;
                }
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Close handshake with {} failed: {}", self.url, e);
        }
    }
}
