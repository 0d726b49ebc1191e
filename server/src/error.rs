use blitz_shared::protocol::{MatchPhase, TeamId};
use thiserror::Error;

use crate::physics::PhysicsError;

/// Reasons a client message or room operation was not applied.
///
/// None of these reach the client: the room logs them and moves on.
#[derive(Debug, Error, PartialEq)]
pub enum RoomError {
    #[error("player {0} not found")]
    MissingPlayer(u32),

    #[error("ball {0} not found")]
    MissingBall(u32),

    #[error("power-up {0} not found or already redeemed")]
    MissingPowerUp(u32),

    #[error("message not accepted during {0:?}")]
    InvalidPhase(MatchPhase),

    #[error("team {0:?} is full")]
    TeamFull(TeamId),

    #[error("player {0} is already on team {1:?}")]
    AlreadyOnTeam(u32, TeamId),

    #[error("player {0} is ready and locked to their team")]
    PlayerLocked(u32),

    #[error("player {0} is not on a team")]
    NotOnTeam(u32),

    #[error("player {0} has no body")]
    NoBody(u32),

    #[error("player {0} is frozen")]
    Frozen(u32),

    #[error("player {player} tried to move {distance:.2}m in one update")]
    ImplausibleMove { player: u32, distance: f64 },

    #[error(transparent)]
    Physics(#[from] PhysicsError),
}
