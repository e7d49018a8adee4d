#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use notes_relay::config::Config;
use notes_relay::relay::{RelayDispatcher, SessionRegistry};
use notes_relay::routes::build_router;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start the relay server on a random port and return its address.
pub async fn start_test_server() -> SocketAddr {
    start_test_server_with_shutdown().await.0
}

/// Like [`start_test_server`], also returning the token that closes every
/// relay connection.
pub async fn start_test_server_with_shutdown() -> (SocketAddr, CancellationToken) {
    let static_dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(static_dir.path().join("index.html"), "<h1>Notes</h1>").unwrap();

    let config = Arc::new(Config {
        static_dir: static_dir.path().to_string_lossy().into_owned(),
        ..Config::default()
    });
    let shutdown = CancellationToken::new();
    let (relay, _dispatcher) = RelayDispatcher::spawn(SessionRegistry::new());
    let app = build_router(config, relay, shutdown.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = static_dir;
    });
    (addr, shutdown)
}

/// A raw relay peer speaking the wire protocol directly.
pub struct Peer {
    ws: WsStream,
}

impl Peer {
    pub async fn connect(addr: SocketAddr, note_id: &str) -> Self {
        Self::connect_to(addr, &format!("/ws?noteId={}", note_id)).await
    }

    /// Connect with a raw path and query, e.g. `/ws` or `/ws?noteId=1&noteId=2`.
    pub async fn connect_to(addr: SocketAddr, path: &str) -> Self {
        let url = format!("ws://{}{}", addr, path);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .expect("Failed to connect to relay");
        Self { ws }
    }

    pub async fn send_binary(&mut self, data: &[u8]) {
        self.ws.send(Message::binary(data.to_vec())).await.unwrap();
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::text(text.to_string())).await.unwrap();
    }

    pub async fn send_edit(&mut self, kind: &str, content: &str) {
        let frame = serde_json::json!({ "type": kind, "content": content }).to_string();
        self.send_text(&frame).await;
    }

    /// Next text frame as raw text, or `None` on timeout/close.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return Some(text.as_str().to_string()),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                _ => return None,
            }
        }
    }

    pub async fn next_json(&mut self) -> Value {
        let text = self.next_text().await.expect("Expected a frame from the relay");
        serde_json::from_str(&text).expect("Relay sent invalid JSON")
    }

    pub async fn expect_presence(&mut self, count: usize) {
        assert_eq!(
            self.next_json().await,
            serde_json::json!({ "type": "collaborators", "count": count })
        );
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        match tokio::time::timeout(Duration::from_millis(300), self.ws.next()).await {
            Err(_) => {}
            Ok(other) => panic!("Expected silence, got {:?}", other),
        }
    }

    /// Assert the relay ends the connection promptly.
    pub async fn expect_closed(&mut self) {
        loop {
            match tokio::time::timeout(Duration::from_secs(2), self.ws.next()).await {
                Err(_) => panic!("Connection still open"),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
                Ok(Some(Ok(Message::Text(text)))) => panic!("Unexpected frame {}", text.as_str()),
                Ok(_) => return,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
