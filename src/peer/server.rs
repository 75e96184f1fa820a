//! WebSocket server for displays
//!
//! `GET /` upgrades to the display protocol, `GET /status` reports the
//! current dial state. Every state reply from the control loop goes to every
//! connected display.

use anyhow::{anyhow, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::dial::DisplayState;
use crate::protocol::{ClientMessage, PROTOCOL_VERSION};

/// Shared state for the axum handlers
#[derive(Clone)]
pub struct PeerState {
    inbox: mpsc::Sender<ClientMessage>,
    bus: SharedBus,
    snapshot: Arc<RwLock<DisplayState>>,
    displays: Arc<AtomicUsize>,
    next_client_id: Arc<AtomicU64>,
    start_time: Instant,
}

impl PeerState {
    pub fn new(
        inbox: mpsc::Sender<ClientMessage>,
        bus: SharedBus,
        snapshot: Arc<RwLock<DisplayState>>,
    ) -> Self {
        Self {
            inbox,
            bus,
            snapshot,
            displays: Arc::new(AtomicUsize::new(0)),
            next_client_id: Arc::new(AtomicU64::new(1)),
            start_time: Instant::now(),
        }
    }

    /// Queue a command for the control loop
    pub async fn submit(&self, message: ClientMessage) -> Result<()> {
        self.inbox
            .send(message)
            .await
            .map_err(|_| anyhow!("control loop is not running"))
    }

    /// Last state published by the control loop
    pub async fn snapshot(&self) -> DisplayState {
        *self.snapshot.read().await
    }

    pub fn display_count(&self) -> usize {
        self.displays.load(Ordering::SeqCst)
    }
}

/// Response for GET /status
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    /// Wire protocol revision spoken on `/`
    pub protocol: u32,
    pub uptime_secs: u64,
    pub detents: u32,
    pub pos: f64,
    pub displays: usize,
}

pub fn router(state: PeerState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve displays on `listener` until `shutdown` fires.
pub async fn serve(listener: TcpListener, state: PeerState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Listening on ws://{}", addr);

    let bus = state.bus.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            // Upgraded sockets outlive the HTTP server; tell them to go
            bus.publish(BusEvent::ShuttingDown);
        })
        .await?;

    Ok(())
}

async fn status_handler(State(state): State<PeerState>) -> Json<StatusResponse> {
    let snapshot = state.snapshot().await;
    Json(StatusResponse {
        service: "virtual-detents".to_string(),
        version: env!("DETENTS_VERSION").to_string(),
        protocol: PROTOCOL_VERSION,
        uptime_secs: state.start_time.elapsed().as_secs(),
        detents: snapshot.detents.get(),
        pos: snapshot.pos,
        displays: state.display_count(),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<PeerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: PeerState) {
    let client_id = state.next_client_id.fetch_add(1, Ordering::SeqCst);
    state.displays.fetch_add(1, Ordering::SeqCst);
    info!("++ display {} connected", client_id);
    state.bus.publish(BusEvent::DisplayJoined { client_id });

    // Subscribe before reading so the reply to this display's get_state
    // can't slip past
    let mut events = state.bus.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let forward = async {
        loop {
            match events.recv().await {
                Ok(BusEvent::StateBroadcast { message }) => {
                    debug!("S > display {}: {}", client_id, message.kind());
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("{}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        warn!("failed to send to display {}: {}", client_id, e);
                        break;
                    }
                }
                Ok(BusEvent::ShuttingDown) => {
                    if let Err(e) = sender.close().await {
                        debug!("close to display {} failed: {}", client_id, e);
                    }
                    break;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("display {} lagged, skipped {} updates", client_id, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    let receive = async {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => handle_frame(&state, client_id, text.as_str()).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("display {} read error: {}", client_id, e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = receive => {}
    }

    state.displays.fetch_sub(1, Ordering::SeqCst);
    state.bus.publish(BusEvent::DisplayLeft { client_id });
    info!("-- display {} disconnected", client_id);
}

async fn handle_frame(state: &PeerState, client_id: u64, raw: &str) {
    debug!("R < {}", raw);
    match ClientMessage::decode(raw) {
        Ok(message) => {
            if let Err(e) = state.submit(message).await {
                warn!("dropping command from display {}: {}", client_id, e);
            }
        }
        Err(e) => warn!("display {}: {}", client_id, e),
    }
}
