use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use crate::game_loop::{GameBroadcast, GameCommand};
use crate::protocol::{ClientMsg, ServerMsg};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<GameBroadcast>,
    /// One permit per open connection
    pub connections: Arc<Semaphore>,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    let permit = match app_state.connections.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Connection refused, server full");
            return (StatusCode::SERVICE_UNAVAILABLE, "server full").into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, permit))
}

async fn handle_socket(socket: WebSocket, app_state: AppState, _permit: OwnedSemaphorePermit) {
    let (mut sink, mut stream) = socket.split();

    // Join the room
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::PlayerJoin { response: resp_tx })
        .await
        .is_err()
    {
        tracing::error!("Failed to send PlayerJoin command");
        return;
    }

    let (my_id, welcome) = match resp_rx.await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Failed to receive welcome");
            return;
        }
    };

    tracing::info!("Player {} connected", my_id);

    // Subscribe before sending the welcome so no event falls in between
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    match serde_json::to_string(&ServerMsg::Welcome(welcome)) {
        Ok(json) => {
            if sink.send(Message::Text(json.into())).await.is_err() {
                let _ = app_state
                    .game_tx
                    .send(GameCommand::PlayerLeave { id: my_id })
                    .await;
                return;
            }
        }
        Err(e) => tracing::error!("Failed to serialize welcome: {}", e),
    }

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(client_msg) => {
                                let _ = app_state
                                    .game_tx
                                    .send(GameCommand::Client { id: my_id, msg: client_msg })
                                    .await;
                            }
                            Err(e) => {
                                tracing::debug!("Player {} sent unparseable message: {}", my_id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Player {} socket error: {}", my_id, e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        let json = match broadcast {
                            GameBroadcast::Event(msg) => serde_json::to_string(&msg),
                            GameBroadcast::State(state) => {
                                serde_json::to_string(&ServerMsg::RoomState(state))
                            }
                        };

                        if let Ok(json) = json {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Player {} lagged by {} messages", my_id, n);
                        // The next room-state snapshot brings the client back in sync
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .game_tx
        .send(GameCommand::PlayerLeave { id: my_id })
        .await;
    tracing::info!("Player {} disconnected", my_id);
}
