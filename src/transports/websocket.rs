//! WebSocket duel transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries one duel protocol message per text frame.
//! [`WebSocketConnector`] is the [`Connector`] the controller uses to dial the
//! `wsUrl` handed out by the lobby.
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), guess_duel_client::DuelClientError> {
//! use guess_duel_client::{Transport, WebSocketTransport};
//!
//! let mut duel = WebSocketTransport::connect("ws://localhost:8081/game").await?;
//! if let Some(Ok(frame)) = duel.recv().await {
//!     println!("server: {frame}");
//! }
//! duel.send(r#"{"type":"guess","number":50}"#.to_string()).await?;
//! duel.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::DuelClientError;
use crate::transport::{Connector, Transport};

/// The underlying client WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection to a duel server.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: a dropped `recv` future never
/// consumes a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DuelClientError::Io`] if the URL is invalid or the handshake
    /// fails. An underlying I/O error keeps its [`ErrorKind`](std::io::ErrorKind);
    /// protocol errors map to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, DuelClientError> {
        tracing::debug!(url = %url, "dialing duel server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            DuelClientError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "duel connection established");

        Ok(Self {
            stream,
            closed: false,
        })
    }

    /// Like [`connect`](Self::connect), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DuelClientError::Timeout`] when the deadline passes, otherwise
    /// whatever [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, DuelClientError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| DuelClientError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), DuelClientError> {
        if self.closed {
            return Err(DuelClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| DuelClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, DuelClientError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(DuelClientError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "duel server sent close frame");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(bytes) => {
                    tracing::warn!(len = bytes.len(), "skipping binary frame on duel connection");
                }
                Message::Frame(_) => {
                    tracing::debug!("skipping raw WebSocket frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), DuelClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| DuelClientError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] that dials duel addresses as WebSocket URLs.
///
/// An optional timeout guards against a duel server that accepts the TCP
/// connection but never completes the handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector {
    timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail connection attempts that take longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn Transport>, DuelClientError> {
        let transport = match self.timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(address, timeout).await?,
            None => WebSocketTransport::connect(address).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, DuelMessage};
    use tokio::net::TcpListener;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Accept one WebSocket connection on a local port and hand it to
    /// `duel_server`. Returns the `ws://` URL to dial.
    async fn spawn_duel_server<F, Fut>(duel_server: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            duel_server(ws).await;
        });

        format!("ws://{addr}/game")
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, DuelClientError::Io(_)));
    }

    #[tokio::test]
    async fn connect_reports_refused_connection() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/game")
            .await
            .unwrap_err();
        assert!(matches!(err, DuelClientError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_gives_up() {
        // TEST-NET-1 is never routable.
        let err =
            WebSocketTransport::connect_with_timeout("ws://192.0.2.1:1", Duration::from_millis(50))
                .await
                .unwrap_err();
        assert!(matches!(err, DuelClientError::Timeout));
    }

    #[tokio::test]
    async fn receives_duel_frames_in_order() {
        let url = spawn_duel_server(|mut ws| async move {
            ws.send(Message::Text(
                r#"{"type":"waiting","message":"Waiting for another player..."}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text(
                r#"{"type":"start","message":"Game started! It's your turn","isEven":-1,"sum":9,"isPrime":-1}"#
                    .into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut duel = WebSocketTransport::connect(&url).await.unwrap();

        let first = DuelMessage::parse(&duel.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.kind(), "waiting");
        let second = DuelMessage::parse(&duel.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(second.kind(), "start");
        assert!(duel.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_socket_after_end_is_a_receive_error() {
        let url = spawn_duel_server(|mut ws| async move {
            ws.send(Message::Text(
                r#"{"type":"end","message":"Game over! Number was: 42. You win!"}"#.into(),
            ))
            .await
            .unwrap();
            // No close frame, the TCP stream just goes away.
            drop(ws);
        })
        .await;

        let mut duel = WebSocketTransport::connect(&url).await.unwrap();
        let end = DuelMessage::parse(&duel.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(end.kind(), "end");
        let err = duel.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, DuelClientError::TransportReceive(_)));
    }

    #[tokio::test]
    async fn guess_reaches_server_as_text_frame() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = spawn_duel_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut duel = WebSocketTransport::connect(&url).await.unwrap();
        let guess = serde_json::to_string(&ClientMessage::Guess { number: 42 }).unwrap();
        duel.send(guess).await.unwrap();

        let seen: ClientMessage = serde_json::from_str(&seen_rx.await.unwrap()).unwrap();
        assert_eq!(seen, ClientMessage::Guess { number: 42 });
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let url = spawn_duel_server(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"end","message":"bye"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut duel = WebSocketTransport::connect(&url).await.unwrap();
        let frame = duel.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"type":"end","message":"bye"}"#);
    }

    #[tokio::test]
    async fn send_after_close_fails_and_close_is_idempotent() {
        let url =
            spawn_duel_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut duel = WebSocketTransport::connect(&url).await.unwrap();
        duel.close().await.unwrap();
        duel.close().await.unwrap();

        let err = duel.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, DuelClientError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_opens_boxed_transport() {
        let url = spawn_duel_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"waiting","message":"hi"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new().with_timeout(Duration::from_secs(5));
        let mut duel = connector.connect(&url).await.unwrap();
        let frame = duel.recv().await.unwrap().unwrap();
        assert!(frame.contains("waiting"));
    }
}
