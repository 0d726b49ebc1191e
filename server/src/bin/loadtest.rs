//! Load test for the Blitz server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the server and join alternating teams
//! - Ready up and stream player-move messages
//! - Receive and count room-state broadcasts and goals
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 10)
//!   --duration S     Test duration in seconds (default: 30)
//!   --move-rate R    Player moves per second per client (default: 20)
//!   --url URL        Server URL (default: ws://127.0.0.1:9002/ws)

use blitz_server::protocol::{
    ClientMsg, JoinTeamMsg, PlayerMoveMsg, PlayerReadyMsg, ServerMsg, TeamId,
};
use blitz_shared::vec3::Vec3;
use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    messages_received: AtomicU64,
    room_states_received: AtomicU64,
    goals_received: AtomicU64,
    moves_sent: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    fn line(&self) -> String {
        format!(
            "connected={} msgs={} room_states={} goals={} moves={} errors={}",
            Self::get(&self.connected),
            Self::get(&self.messages_received),
            Self::get(&self.room_states_received),
            Self::get(&self.goals_received),
            Self::get(&self.moves_sent),
            Self::get(&self.errors),
        )
    }

    /// Room-state delivery is measured against the default 15 Hz snapshot rate.
    fn summary(&self, clients: u32, secs: u64) {
        let msgs = Self::get(&self.messages_received);
        let states = Self::get(&self.room_states_received);
        println!("--- results ---");
        println!("{}", self.line());
        let samples = Self::get(&self.latency_count);
        if samples > 0 {
            println!("connect latency avg: {}ms", Self::get(&self.latency_sum_ms) / samples);
        }
        println!("throughput: {:.0} msgs/s", msgs as f64 / secs.max(1) as f64);

        let per_client = states as f64 / clients.max(1) as f64;
        let expected = secs as f64 * 15.0;
        if expected > 0.0 {
            println!(
                "room-state per client: {:.1} of {:.1} expected ({:.1}%)",
                per_client,
                expected,
                per_client / expected * 100.0
            );
        }
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    move_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics
        .latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    // Wait for welcome message before doing anything else
    let welcome = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                    if let Ok(ServerMsg::Welcome(_)) = serde_json::from_str::<ServerMsg>(&text) {
                        return true;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return false,
                _ => {}
            }
        }
        false
    })
    .await;

    if !matches!(welcome, Ok(true)) {
        if client_id < 3 {
            eprintln!("Client {} did not get a welcome", client_id);
        }
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let team = if client_id % 2 == 0 {
        TeamId::Red
    } else {
        TeamId::Blue
    };
    for msg in [
        ClientMsg::JoinTeam(JoinTeamMsg { team_id: team }),
        ClientMsg::PlayerReady(PlayerReadyMsg { is_ready: true }),
    ] {
        if !send(&mut ws, &msg).await {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    }

    let move_interval = if move_rate > 0.0 {
        Duration::from_secs_f64(1.0 / move_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut move_timer = tokio::time::interval(move_interval);
    move_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;
    let mut rng = ChaCha8Rng::seed_from_u64(client_id as u64);
    // Small random walk around the team's half
    let side = if team == TeamId::Red { -1.0 } else { 1.0 };
    let mut pos = Vec3::new(0.0, 0.9, side * 10.0);

    while Instant::now() < test_end {
        tokio::select! {
            _ = move_timer.tick() => {
                pos.x = (pos.x + rng.gen_range(-0.3..0.3)).clamp(-10.0, 10.0);
                pos.z = (pos.z + rng.gen_range(-0.3..0.3)).clamp(-20.0, 20.0);
                let msg = ClientMsg::PlayerMove(PlayerMoveMsg { player_pos: pos });
                if send(&mut ws, &msg).await {
                    metrics.moves_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        match serde_json::from_str::<ServerMsg>(&text) {
                            Ok(ServerMsg::RoomState(_)) => {
                                metrics.room_states_received.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(ServerMsg::Goal(_)) => {
                                metrics.goals_received.fetch_add(1, Ordering::Relaxed);
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

async fn send<S>(ws: &mut S, msg: &ClientMsg) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => ws.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 10;
    let mut duration_secs: u64 = 30;
    let mut move_rate: f64 = 20.0;
    let mut url = "ws://127.0.0.1:9002/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--move-rate" => {
                i += 1;
                move_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Blitz Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Move rate: {}/s per client", move_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            run_client(client_id, url, move_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    let reporter = {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let mut every = tokio::time::interval(Duration::from_secs(5));
            let start = Instant::now();
            loop {
                every.tick().await;
                let elapsed = start.elapsed().as_secs();
                if elapsed >= duration_secs + 5 {
                    break;
                }
                println!("[{:3}s] {}", elapsed, metrics.line());
            }
        })
    };

    for handle in handles {
        let _ = handle.await;
    }
    reporter.abort();

    println!();
    metrics.summary(num_clients, duration_secs);
}
