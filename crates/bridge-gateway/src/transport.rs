use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::GatewayError;

/// One inbound message from the transport. `Closed` signals a clean or
/// unclean transport shutdown; the caller decides whether to reconnect.
#[derive(Debug)]
pub enum TransportMessage {
    Text(String),
    Closed,
}

/// Abstraction over the underlying full-duplex byte stream, so the
/// connection lifecycle state machine can be exercised against a fake in
/// tests without opening a real socket.
#[async_trait]
pub trait GatewayTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), GatewayError>;
    async fn recv(&mut self) -> Result<TransportMessage, GatewayError>;
    async fn close(&mut self);
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketTransport {
    stream: WsStream,
}

impl WebSocketTransport {
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl GatewayTransport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<(), GatewayError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))
    }

    async fn recv(&mut self) -> Result<TransportMessage, GatewayError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(TransportMessage::Text(text.to_string())),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.stream.send(Message::Pong(payload)).await;
                    continue;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(TransportMessage::Closed),
                Some(Ok(Message::Binary(_) | Message::Frame(_))) => continue,
                Some(Err(err)) => return Err(GatewayError::Transport(err.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
