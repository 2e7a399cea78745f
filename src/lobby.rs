//! The lobby seam: opening a streamed matchmaking response.
//!
//! A [`Lobby`] performs the `GET <server>/match` request and hands back the
//! response body as a stream of raw byte chunks. It does not interpret the
//! body; [`matchmaking`](crate::matchmaking) does. [`HttpLobby`] (feature
//! `lobby-http`) is the `reqwest`-backed implementation.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use crate::error::Result;

/// A streamed response body, one chunk at a time.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens matchmaking requests against a lobby server.
#[async_trait]
pub trait Lobby: Send + Sync + 'static {
    /// Request a match from the lobby at `server_address`.
    ///
    /// # Errors
    ///
    /// Returns [`DuelClientError::Http`](crate::DuelClientError::Http) if the
    /// request cannot be sent or the lobby answers with a non-success status.
    async fn open_match_stream(&self, server_address: &str) -> Result<ByteStream>;
}

/// Build the matchmaking URL for a lobby address.
///
/// ```
/// use guess_duel_client::lobby::match_url;
///
/// assert_eq!(match_url("http://localhost:8080"), "http://localhost:8080/match");
/// assert_eq!(match_url("http://localhost:8080/"), "http://localhost:8080/match");
/// ```
pub fn match_url(server_address: &str) -> String {
    format!("{}/match", server_address.trim_end_matches('/'))
}

#[cfg(feature = "lobby-http")]
pub use http_lobby::HttpLobby;

#[cfg(feature = "lobby-http")]
mod http_lobby {
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use tracing::debug;

    use super::{match_url, ByteStream, Lobby};
    use crate::error::{DuelClientError, Result};

    /// [`Lobby`] that talks HTTP with `reqwest` and streams the response body.
    #[derive(Debug, Clone)]
    pub struct HttpLobby {
        client: reqwest::Client,
    }

    impl HttpLobby {
        /// Create a lobby client with default `reqwest` settings.
        ///
        /// No overall request timeout is set: the lobby holds the response open
        /// while it looks for an opponent and ends it with its own `timeout`
        /// record.
        ///
        /// # Errors
        ///
        /// Returns [`DuelClientError::Http`] if the HTTP client cannot be built.
        pub fn new() -> Result<Self> {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| DuelClientError::Http(e.to_string()))?;
            Ok(Self { client })
        }

        /// Use a preconfigured `reqwest` client (proxies, headers, timeouts).
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Lobby for HttpLobby {
        async fn open_match_stream(&self, server_address: &str) -> Result<ByteStream> {
            let url = match_url(server_address);
            debug!(url = %url, "requesting match");

            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| DuelClientError::Http(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(DuelClientError::Http(format!(
                    "match request failed with status {}",
                    status.as_u16()
                )));
            }

            let body = resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| DuelClientError::Http(e.to_string())));
            Ok(Box::pin(body))
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
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve one HTTP/1.1 response on a local port, written verbatim in
        /// `parts` with a flush between each, and return the lobby address.
        async fn spawn_lobby(parts: Vec<&'static [u8]>) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            tokio::spawn(async move {
                let (mut tcp, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = tcp.read(&mut buf).await.unwrap();
                for part in parts {
                    tcp.write_all(part).await.unwrap();
                    tcp.flush().await.unwrap();
                }
            });

            format!("http://{addr}")
        }

        #[tokio::test]
        async fn streams_chunked_body() {
            let addr = spawn_lobby(vec![
                b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n",
                b"13\r\n{\"status\":\"waiting\"\r\n",
                b"2\r\n}\n\r\n",
                b"0\r\n\r\n",
            ])
            .await;

            let lobby = HttpLobby::new().unwrap();
            let mut body = lobby.open_match_stream(&addr).await.unwrap();

            let mut collected = Vec::new();
            while let Some(chunk) = body.next().await {
                collected.extend_from_slice(&chunk.unwrap());
            }
            assert_eq!(collected, b"{\"status\":\"waiting\"}\n");
        }

        #[tokio::test]
        async fn non_success_status_is_an_error() {
            let addr = spawn_lobby(vec![
                b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n",
            ])
            .await;

            let lobby = HttpLobby::new().unwrap();
            let err = lobby.open_match_stream(&addr).await.err().unwrap();
            assert!(matches!(err, DuelClientError::Http(ref m) if m.contains("503")));
        }

        #[tokio::test]
        async fn unreachable_lobby_is_an_error() {
            let lobby = HttpLobby::new().unwrap();
            let err = lobby
                .open_match_stream("http://127.0.0.1:1")
                .await
                .err()
                .unwrap();
            assert!(matches!(err, DuelClientError::Http(_)));
        }
    }
}
