//! Mock knob controller
//!
//! Accepts display sockets at `/`, records every text frame it receives and
//! pushes whatever the test hands it to all connected displays. It never
//! answers on its own.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Clone)]
enum Outgoing {
    Text(String),
    Close,
}

struct MockPeerState {
    received: Mutex<Vec<String>>,
    outgoing: broadcast::Sender<Outgoing>,
}

/// Mock peer on a random local port
pub struct MockPeer {
    addr: SocketAddr,
    state: Arc<MockPeerState>,
    handle: JoinHandle<()>,
}

impl MockPeer {
    pub async fn start() -> Self {
        let (outgoing, _) = broadcast::channel(64);
        let state = Arc::new(MockPeerState {
            received: Mutex::new(Vec::new()),
            outgoing,
        });

        let app = Router::new()
            .route("/", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of displays currently connected
    pub fn displays(&self) -> usize {
        self.state.outgoing.receiver_count()
    }

    /// Wait until `n` displays are connected
    pub async fn wait_for_displays(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.displays() < n {
            assert!(Instant::now() < deadline, "no display connected");
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Send a raw text frame to every connected display
    pub fn push(&self, raw: &str) {
        self.state
            .outgoing
            .send(Outgoing::Text(raw.to_string()))
            .expect("no display connected");
    }

    /// Close every display socket from the peer side
    pub fn disconnect_all(&self) {
        self.state
            .outgoing
            .send(Outgoing::Close)
            .expect("no display connected");
    }

    /// Frames received so far
    pub async fn received(&self) -> Vec<String> {
        self.state.received.lock().await.clone()
    }

    /// Wait until at least `n` frames have arrived and return them
    pub async fn wait_for_frames(&self, n: usize) -> Vec<String> {
        timeout(Duration::from_secs(2), async {
            loop {
                let frames = self.received().await;
                if frames.len() >= n {
                    return frames;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {} frames", n))
    }

    pub async fn stop(self) {
        self.handle.abort();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<MockPeerState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<MockPeerState>) {
    let mut outgoing = state.outgoing.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.received.lock().await.push(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            next = outgoing.recv() => match next {
                Ok(Outgoing::Text(raw)) => {
                    if sender.send(Message::Text(raw.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Outgoing::Close) => {
                    sender.close().await.ok();
                    break;
                }
                Err(_) => break,
            },
        }
    }
}
