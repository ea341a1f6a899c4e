use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use roomcast_core::envelope::Envelope;
use roomcast_core::protocol::decode_envelope;
use roomcast_server::build_app;
use roomcast_server::config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with default config.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn room_url(&self, room_id: &str) -> String {
        format!("ws://{}/rooms/{room_id}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given room.
pub async fn ws_connect_room(server: &TestServer, room_id: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(server.room_url(room_id))
        .await
        .unwrap();
    stream
}

/// Send a raw text message into a room.
pub async fn ws_send_text(stream: &mut WsStream, text: &str) {
    stream.send(Message::text(text)).await.unwrap();
}

/// Read the next broadcast envelope from a WebSocket stream (5s timeout).
pub async fn ws_read_envelope(stream: &mut WsStream) -> Envelope {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return decode_envelope(text.as_str()).unwrap(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for broadcast envelope")
}

/// Try to read an envelope, returning None on timeout.
pub async fn ws_try_read_envelope(stream: &mut WsStream, timeout_ms: u64) -> Option<Envelope> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return decode_envelope(text.as_str()).unwrap(),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Fetch (websocket connections, active rooms, total members) from /healthz.
pub async fn health_stats(server: &TestServer) -> (usize, usize, usize) {
    let body: serde_json::Value = reqwest::get(format!("{}/healthz", server.base_url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let connections = body["connections"]["websocket"].as_u64().unwrap() as usize;
    let active = body["rooms"]["active"].as_u64().unwrap() as usize;
    let members = body["rooms"]["members"].as_u64().unwrap() as usize;
    (connections, active, members)
}

/// Poll /healthz until the total member count reaches `expected` (2s cap).
/// Joins and leaves are applied by server tasks, so tests wait for the
/// registry to settle instead of assuming it is instantaneous.
pub async fn wait_for_members(server: &TestServer, expected: usize) {
    let deadline = Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            let (_, _, members) = health_stats(server).await;
            if members == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {expected} members"));
}

/// Poll /healthz until the live connection count reaches `expected` (2s cap).
pub async fn wait_for_connections(server: &TestServer, expected: usize) {
    let deadline = Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            let (connections, _, _) = health_stats(server).await;
            if connections == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {expected} connections"));
}
