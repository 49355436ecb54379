//! Telemetry WebSocket route.
//!
//! Each accepted connection is registered as a [`Subscriber`] for the
//! lifetime of the socket. Frames are pushed as JSON text messages; anything
//! the client sends is ignored apart from close and ping. A subscriber the
//! broadcaster evicts is disconnected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use telemetry_core::{EncodedFrame, SendError, Subscriber};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::server::AppState;

/// Upper bound for the closing handshake with a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Subscriber backed by the write half of a WebSocket.
pub struct WsSubscriber {
    sender: Mutex<SplitSink<WebSocket, Message>>,
    closed: CancellationToken,
    peer: SocketAddr,
}

impl WsSubscriber {
    pub fn new(sender: SplitSink<WebSocket, Message>, peer: SocketAddr) -> Self {
        Self {
            sender: Mutex::new(sender),
            closed: CancellationToken::new(),
            peer,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn mark_closed(&self) {
        self.closed.cancel();
    }

    async fn pong(&self, payload: axum::body::Bytes) -> Result<(), SendError> {
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Pong(payload))
            .await
            .map_err(SendError::transport)
    }

    async fn close(&self) {
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut sender = self.sender.lock().await;
            let _ = sender.close().await;
        })
        .await;
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send(&self, frame: EncodedFrame) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }

        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text((&*frame).into()))
            .await
            .map_err(|e| {
                self.mark_closed();
                SendError::transport(e)
            })
    }

    fn is_open(&self) -> bool {
        !self.closed.is_cancelled()
    }

    fn evict(&self) {
        self.mark_closed();
    }
}

/// Upgrade any request to a telemetry stream.
pub async fn telemetry_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (sender, mut receiver) = socket.split();
    let subscriber = Arc::new(WsSubscriber::new(sender, peer));
    let id = state.registry.register(subscriber.clone());
    info!(
        peer = %peer,
        subscriber = %id,
        clients = state.registry.len(),
        "Client connected"
    );

    loop {
        tokio::select! {
            _ = state.cancel_token.cancelled() => break,
            _ = subscriber.closed.cancelled() => {
                debug!(peer = %peer, "Dropping evicted client");
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if subscriber.pong(data).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(peer = %peer, error = %e, "WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    subscriber.mark_closed();
    state.registry.unregister(id);
    subscriber.close().await;
    info!(
        peer = %peer,
        subscriber = %id,
        clients = state.registry.len(),
        "Client disconnected"
    );
}
