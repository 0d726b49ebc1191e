use crate::config::ServerConfig;
use crate::profile::StatsDelta;
use crate::protocol::{ClientMsg, RoomStateMsg, ServerMsg, WelcomeMsg};
use crate::room::{Outbound, Room};
use blitz_shared::config::BlitzConfig;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Longest frame the room is advanced by in one tick (seconds)
const MAX_FRAME_DT: f64 = 0.1;

/// Commands from client connections to the game loop
pub enum GameCommand {
    PlayerJoin {
        response: oneshot::Sender<(u32, WelcomeMsg)>,
    },
    PlayerLeave {
        id: u32,
    },
    Client {
        id: u32,
        msg: ClientMsg,
    },
}

/// Broadcasts from game loop to all clients
#[derive(Debug, Clone)]
pub enum GameBroadcast {
    /// Discrete game event
    Event(ServerMsg),
    /// Periodic replicated snapshot
    State(RoomStateMsg),
}

/// Run the main game loop. Owns the room.
pub async fn run_game_loop(
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
    server_config: ServerConfig,
    blitz_config: BlitzConfig,
    persist_tx: mpsc::Sender<StatsDelta>,
) {
    let mut room = Room::new(blitz_config, server_config.rng_seed);

    let tick_duration = Duration::from_secs_f64(1.0 / server_config.tick_rate_hz as f64);
    let broadcast_every_n = server_config.broadcast_every_n();
    let mut tick_count: u64 = 0;

    let mut tick_interval = tokio::time::interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                // Skipped ticks are folded into the next frame, up to a cap
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f64().min(MAX_FRAME_DT);
                last_tick = now;
                room.tick(dt);

                tick_count += 1;
                if tick_count % broadcast_every_n == 0 {
                    let _ = broadcast_tx.send(GameBroadcast::State(room.snapshot()));
                }
            }

            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    GameCommand::PlayerJoin { response } => {
                        let player_id = room.add_player();
                        let _ = response.send((player_id, room.welcome(player_id)));
                        let _ = broadcast_tx.send(GameBroadcast::State(room.snapshot()));
                    }
                    GameCommand::PlayerLeave { id } => {
                        room.remove_player(id);
                        let _ = broadcast_tx.send(GameBroadcast::State(room.snapshot()));
                    }
                    GameCommand::Client { id, msg } => {
                        if let Err(e) = room.handle_message(id, msg) {
                            tracing::debug!("Rejected message from player {}: {}", id, e);
                        }
                    }
                }
            }

            else => break,
        }

        flush(&mut room, &broadcast_tx, &persist_tx);
    }

    room.dispose();
    tracing::info!("Game loop ended");
}

fn flush(
    room: &mut Room,
    broadcast_tx: &broadcast::Sender<GameBroadcast>,
    persist_tx: &mpsc::Sender<StatsDelta>,
) {
    for out in room.take_outbound() {
        match out {
            Outbound::Broadcast(msg) => {
                let _ = broadcast_tx.send(GameBroadcast::Event(msg));
            }
            Outbound::Persist(delta) => {
                if let Err(e) = persist_tx.try_send(delta) {
                    tracing::warn!("Dropping stats delta: {}", e);
                }
            }
        }
    }
}
