//! Integration tests for the Blitz server.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use blitz_server::protocol::{ClientMsg, JoinTeamMsg, PlayerReadyMsg, ServerMsg, TeamId};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random available port and return the WebSocket URL.
async fn start_test_server_with(max_connections: usize) -> String {
    use blitz_server::config::ServerConfig;
    use blitz_server::game_loop::{run_game_loop, GameBroadcast, GameCommand};
    use blitz_server::profile::StatsDelta;
    use blitz_server::ws::AppState;
    use blitz_shared::config::BlitzConfig;

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // Release the port so the server can bind to it

    let config = ServerConfig {
        listen_addr: addr.to_string(),
        tick_rate_hz: 60,
        broadcast_rate_hz: 15,
        rng_seed: 12345,
        max_connections,
        persist_queue: 64,
    };

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);
    let (broadcast_tx, _) = broadcast::channel::<GameBroadcast>(256);
    let (persist_tx, mut persist_rx) = mpsc::channel::<StatsDelta>(config.persist_queue);

    // Drain persisted stats so the queue never fills
    tokio::spawn(async move { while persist_rx.recv().await.is_some() {} });

    let app_state = AppState {
        game_tx,
        broadcast_tx: broadcast_tx.clone(),
        connections: Arc::new(Semaphore::new(config.max_connections)),
    };

    // Start game loop
    let game_config = config.clone();
    tokio::spawn(async move {
        run_game_loop(
            game_rx,
            broadcast_tx,
            game_config,
            BlitzConfig::default(),
            persist_tx,
        )
        .await;
    });

    // Start HTTP/WebSocket server
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(blitz_server::ws::ws_handler))
        .with_state(app_state);

    tokio::spawn(async move {
        let listener = TcpListener::bind(&config.listen_addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("ws://{}/ws", addr)
}

async fn start_test_server() -> String {
    start_test_server_with(100).await
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut Ws) -> ServerMsg {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).expect("Failed to parse server message");
            }
            Some(Ok(_)) => continue, // Skip ping/pong
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

async fn recv_msg_timeout(ws: &mut Ws, timeout: Duration) -> Option<ServerMsg> {
    tokio::time::timeout(timeout, recv_msg(ws)).await.ok()
}

async fn send(ws: &mut Ws, msg: &ClientMsg) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn welcome_id(ws: &mut Ws) -> u32 {
    match recv_msg(ws).await {
        ServerMsg::Welcome(w) => w.self_id,
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_and_receive_welcome() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;

    match recv_msg(&mut ws).await {
        ServerMsg::Welcome(w) => {
            assert_eq!(w.protocol_version, 1);
            assert!(w.self_id > 0, "self_id should be positive");
            assert!(
                w.state.players.iter().any(|p| p.id == w.self_id),
                "room state should include self"
            );
            assert_eq!(w.config.team_capacity, 5);
        }
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_multiple_clients_get_unique_ids() {
    let url = start_test_server().await;

    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;

    let id1 = welcome_id(&mut ws1).await;
    let id2 = welcome_id(&mut ws2).await;

    assert_ne!(id1, id2, "Each client should get a unique ID");
}

#[tokio::test]
async fn test_join_team_shows_in_room_state() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;
    let self_id = welcome_id(&mut ws).await;

    send(
        &mut ws,
        &ClientMsg::JoinTeam(JoinTeamMsg {
            team_id: TeamId::Blue,
        }),
    )
    .await;

    let mut joined = false;
    for _ in 0..20 {
        if let Some(ServerMsg::RoomState(state)) =
            recv_msg_timeout(&mut ws, Duration::from_millis(200)).await
        {
            let me = state.players.iter().find(|p| p.id == self_id);
            let blue = state.teams.iter().find(|t| t.id == TeamId::Blue);
            if me.and_then(|p| p.team_id) == Some(TeamId::Blue)
                && blue.map(|t| t.player_count) == Some(1)
            {
                joined = true;
                break;
            }
        }
    }
    assert!(joined, "Player should appear on the blue team after join-team");
}

#[tokio::test]
async fn test_both_teams_ready_starts_countdown() {
    let url = start_test_server().await;
    let mut red = connect(&url).await;
    let mut blue = connect(&url).await;
    let _ = welcome_id(&mut red).await;
    let _ = welcome_id(&mut blue).await;

    for (ws, team) in [(&mut red, TeamId::Red), (&mut blue, TeamId::Blue)] {
        send(ws, &ClientMsg::JoinTeam(JoinTeamMsg { team_id: team })).await;
        send(ws, &ClientMsg::PlayerReady(PlayerReadyMsg { is_ready: true })).await;
    }

    let mut starting = false;
    for _ in 0..40 {
        if let Some(ServerMsg::MatchPhase(m)) =
            recv_msg_timeout(&mut red, Duration::from_millis(200)).await
        {
            if m.phase == blitz_server::protocol::MatchPhase::Starting {
                assert_eq!(m.seconds, 10);
                starting = true;
                break;
            }
        }
    }
    assert!(starting, "Room should enter the starting phase");
}

#[tokio::test]
async fn test_unparseable_message_is_ignored() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;
    let _ = welcome_id(&mut ws).await;

    ws.send(Message::Text("not valid json".into())).await.unwrap();

    // Connection stays up and keeps receiving snapshots
    let mut got_state = false;
    for _ in 0..10 {
        if let Some(ServerMsg::RoomState(_)) =
            recv_msg_timeout(&mut ws, Duration::from_millis(200)).await
        {
            got_state = true;
            break;
        }
    }
    assert!(got_state, "Client should still receive room state");
}

#[tokio::test]
async fn test_player_disconnect_removes_from_room_state() {
    let url = start_test_server().await;

    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;

    let id1 = welcome_id(&mut ws1).await;
    let _id2 = welcome_id(&mut ws2).await;

    ws1.close(None).await.unwrap();

    let mut player1_removed = false;
    for _ in 0..10 {
        if let Some(ServerMsg::RoomState(state)) =
            recv_msg_timeout(&mut ws2, Duration::from_millis(200)).await
        {
            if !state.players.iter().any(|p| p.id == id1) {
                player1_removed = true;
                break;
            }
        }
    }
    assert!(
        player1_removed,
        "Disconnected player should be removed from room state"
    );
}

#[tokio::test]
async fn test_connection_limit_refuses_extra_clients() {
    let url = start_test_server_with(1).await;
    let mut ws1 = connect(&url).await;
    let _ = welcome_id(&mut ws1).await;

    assert!(
        connect_async(&url).await.is_err(),
        "Second client should be refused when the server is full"
    );
}
