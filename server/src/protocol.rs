//! Wire protocol as used by the server: the shared message types plus conversions from room
//! records into their replicated form.

pub use blitz_shared::protocol::*;

use crate::ball::Ball;
use crate::player::Player;
use crate::roster::Team;
use blitz_shared::vec3::Vec3;

/// Round to 4 decimal places (sub-millimetre, roughly halves the JSON size)
#[inline]
fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

fn vec_wire(v: Vec3) -> [f64; 3] {
    [round4(v.x), round4(v.y), round4(v.z)]
}

pub fn ball_wire(ball: &Ball) -> BallWire {
    let q = ball.orientation;
    BallWire {
        id: ball.id,
        kind: ball.kind,
        position: vec_wire(ball.position),
        orientation: [round4(q.w), round4(q.x), round4(q.y), round4(q.z)],
        velocity: vec_wire(ball.velocity),
    }
}

pub fn player_wire(player: &Player) -> PlayerWire {
    PlayerWire {
        id: player.id,
        color: player.color,
        team_id: player.team,
        ready: player.ready,
        spectating: player.spectating,
        immune: player.immune,
        score: player.score,
        position: vec_wire(player.position),
        effects: player.effects.kinds(),
    }
}

pub fn team_wire(team: &Team) -> TeamWire {
    TeamWire {
        id: team.id,
        name: team.name.clone(),
        player_count: team.player_count,
        score: team.score,
        ice_wall: team.ice_wall.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blitz_shared::config::BlitzConfig;
    use blitz_shared::vec3::vec3;

    #[test]
    fn ball_wire_rounds_floats() {
        let mut ball = Ball::new(4, BallKind::Bomb, vec3(1.234567, 0.5, -2.000049));
        ball.velocity = vec3(0.00001, 0.0, 3.0);
        let wire = ball_wire(&ball);
        assert_eq!(wire.position, [1.2346, 0.5, -2.0]);
        assert_eq!(wire.velocity, [0.0, 0.0, 3.0]);
        assert_eq!(wire.orientation, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(wire.kind, BallKind::Bomb);
    }

    #[test]
    fn player_wire_reports_team_and_effects() {
        let mut player = Player::new(2);
        player.team = Some(TeamId::Red);
        player.effects.apply(EffectKind::Ghost, 10.0, 1.0);
        let wire = player_wire(&player);
        assert_eq!(wire.team_id, Some(TeamId::Red));
        assert_eq!(wire.effects, vec![EffectKind::Ghost]);

        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"teamId\":\"red\""));
        assert!(json.contains("\"effects\":[\"ghost\"]"));
    }

    #[test]
    fn welcome_carries_protocol_version_and_config() {
        let msg = ServerMsg::Welcome(WelcomeMsg {
            protocol_version: PROTOCOL_VERSION,
            self_id: 7,
            state: RoomStateMsg {
                match_state: MatchWire {
                    phase: MatchPhase::Lobby,
                    seconds_remaining: 0,
                    is_game_starting: false,
                    is_game_active: false,
                    is_game_playing: false,
                },
                teams: vec![],
                players: vec![player_wire(&Player::new(7))],
                balls: vec![],
                powerups: vec![],
            },
            config: BlitzConfig::default(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"welcome\""));
        assert!(json.contains("\"protocolVersion\":1"));
        assert!(json.contains("\"match\":{\"phase\":\"lobby\""));
        let parsed: ServerMsg = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerMsg::Welcome(w) => {
                assert_eq!(w.self_id, 7);
                assert_eq!(w.state.players.len(), 1);
                assert_eq!(w.config.team_capacity, 5);
            }
            _ => panic!("Expected Welcome"),
        }
    }
}
