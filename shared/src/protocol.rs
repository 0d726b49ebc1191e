use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::BlitzConfig;
use crate::vec3::Vec3;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Shared enums ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TeamId {
    Red,
    Blue,
}

impl TeamId {
    pub const ALL: [TeamId; 2] = [TeamId::Red, TeamId::Blue];

    pub fn opposite(self) -> TeamId {
        match self {
            TeamId::Red => TeamId::Blue,
            TeamId::Blue => TeamId::Red,
        }
    }

    pub fn index(self) -> usize {
        match self {
            TeamId::Red => 0,
            TeamId::Blue => 1,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TeamId::Red => "Red Team",
            TeamId::Blue => "Blue Team",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPhase {
    Lobby,
    Starting,
    PreRound,
    Active,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum BallKind {
    Normal,
    Ice,
    Bomb,
    Light,
    Ghost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum PowerUpKind {
    DoublePoints,
    Immunity,
    IceGoal,
    Ghost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    DoublePoints,
    Frozen,
    Ghost,
    Immunity,
}

impl EffectKind {
    /// Effects an immune player is shielded from.
    pub fn is_negative(self) -> bool {
        matches!(self, EffectKind::Frozen | EffectKind::Ghost)
    }
}

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "room-state")]
    RoomState(RoomStateMsg),
    #[serde(rename = "match-phase")]
    MatchPhase(MatchPhaseMsg),
    #[serde(rename = "countdown")]
    Countdown(CountdownMsg),
    #[serde(rename = "start-cancelled")]
    StartCancelled,
    #[serde(rename = "spawn-player")]
    SpawnPlayer(SpawnPlayerMsg),
    #[serde(rename = "goal")]
    Goal(GoalMsg),
    #[serde(rename = "ball-collision")]
    BallCollision(BallCollisionMsg),
    #[serde(rename = "ball-effect")]
    BallEffect(BallEffectMsg),
    #[serde(rename = "powerup-spawned")]
    PowerUpSpawned(PowerUpWire),
    #[serde(rename = "powerup-removed")]
    PowerUpRemoved(PowerUpRemovedMsg),
    #[serde(rename = "powerup-effect")]
    PowerUpEffect(PowerUpEffectMsg),
    #[serde(rename = "player-ghosted")]
    PlayerGhosted(PlayerRefMsg),
    #[serde(rename = "player-visible")]
    PlayerVisible(PlayerRefMsg),
    #[serde(rename = "remove-effect")]
    RemoveEffect(RemoveEffectMsg),
    #[serde(rename = "ice-wall")]
    IceWall(IceWallMsg),
    #[serde(rename = "blitz-end-game")]
    EndGame(EndGameMsg),
    #[serde(rename = "reset-game")]
    ResetGame(ResetGameMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub self_id: u32,
    pub state: RoomStateMsg,
    pub config: BlitzConfig,
}

/// Replicated room state, flushed to every client at the broadcast rate.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateMsg {
    #[serde(rename = "match")]
    pub match_state: MatchWire,
    pub teams: Vec<TeamWire>,
    pub players: Vec<PlayerWire>,
    pub balls: Vec<BallWire>,
    pub powerups: Vec<PowerUpWire>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MatchWire {
    pub phase: MatchPhase,
    pub seconds_remaining: u32,
    pub is_game_starting: bool,
    pub is_game_active: bool,
    pub is_game_playing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TeamWire {
    pub id: TeamId,
    pub name: String,
    pub player_count: u32,
    pub score: u32,
    pub ice_wall: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWire {
    pub id: u32,
    pub color: u32,
    pub team_id: Option<TeamId>,
    pub ready: bool,
    pub spectating: bool,
    pub immune: bool,
    pub score: u32,
    pub position: [f64; 3],
    pub effects: Vec<EffectKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BallWire {
    pub id: u32,
    pub kind: BallKind,
    pub position: [f64; 3],
    pub orientation: [f64; 4],
    pub velocity: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpWire {
    pub id: u32,
    pub kind: PowerUpKind,
    pub position: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MatchPhaseMsg {
    pub phase: MatchPhase,
    pub seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CountdownMsg {
    pub phase: MatchPhase,
    pub seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SpawnPlayerMsg {
    pub position: Vec3,
    pub player: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GoalMsg {
    /// Last player to touch the ball, if any
    pub player_id: Option<u32>,
    /// Team credited with the goal
    pub team_id: TeamId,
    pub points: u32,
    pub own_goal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BallCollisionMsg {
    pub ball_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BallEffectMsg {
    pub effect: BallKind,
    /// Team on the receiving end of the effect
    pub team_id: TeamId,
    pub players: Vec<u32>,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpRemovedMsg {
    pub powerup_id: u32,
    pub player_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpEffectMsg {
    /// Power-up kind (the `type` key is taken by the message tag)
    pub effect: PowerUpKind,
    pub player_id: u32,
    pub team_id: TeamId,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRefMsg {
    pub player_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEffectMsg {
    pub player_id: u32,
    pub effect: EffectKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct IceWallMsg {
    /// Team whose goal the wall stands in front of
    pub team_id: TeamId,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EndGameMsg {
    pub winner: Option<TeamId>,
    pub tied: bool,
    pub forced: bool,
    pub top_scorer: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ResetGameMsg {
    pub freeze: bool,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "join-team")]
    JoinTeam(JoinTeamMsg),
    #[serde(rename = "cancel-join")]
    CancelJoin,
    #[serde(rename = "player-ready")]
    PlayerReady(PlayerReadyMsg),
    #[serde(rename = "player-move")]
    PlayerMove(PlayerMoveMsg),
    #[serde(rename = "powerup")]
    PowerUp(PowerUpMsg),
    #[serde(rename = "player-spectating")]
    PlayerSpectating(PlayerSpectatingMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct JoinTeamMsg {
    pub team_id: TeamId,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerReadyMsg {
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMoveMsg {
    pub player_pos: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpMsg {
    pub powerup_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSpectatingMsg {
    pub spectating: bool,
}
