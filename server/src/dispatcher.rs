//! Turns contact pairs from the physics step into game events.
//!
//! Only pairs with a ball on one side matter. Touching a player records the last toucher,
//! landing on the ground is reported as telemetry, and entering a goal sensor scores. A ball
//! scores at most once per life: the `scored` flag is set before anything else happens, so a
//! second contact with the same goal in the same tick is ignored.

use crate::physics::ContactPair;
use crate::registry::{EntityId, PhysicsRegistry, Role};
use crate::room::Room;
use blitz_shared::protocol::{
    BallCollisionMsg, BallEffectMsg, BallKind, EffectKind, GoalMsg, ServerMsg, TeamId,
};
use tracing::{debug, info, warn};

/// Length of the client-side stun shown after a bomb ball scores
pub const BOMB_STUN_SECS: f64 = 2.0;
/// Length of the client-side flash shown after a light ball scores
pub const LIGHT_FLASH_SECS: f64 = 5.0;

/// What a ball ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallContact {
    Player(u32),
    Ground,
    /// Goal sensor of the team that defends it
    Goal(TeamId),
    Other,
}

/// Resolve a contact pair to `(ball id, other side)`. Pairs without a ball, or with a side
/// that is no longer registered, resolve to `None`.
pub fn classify(registry: &PhysicsRegistry, pair: ContactPair) -> Option<(u32, BallContact)> {
    let a = registry.entity_for_body(pair.a)?;
    let b = registry.entity_for_body(pair.b)?;
    let ((ball, _), (other, role)) = match (a, b) {
        ((EntityId::Ball(_), _), _) => (a, b),
        (_, (EntityId::Ball(_), _)) => (b, a),
        _ => return None,
    };
    let EntityId::Ball(ball_id) = ball else {
        return None;
    };
    let contact = match (other, role) {
        (EntityId::Player(id), Role::Player) => BallContact::Player(id),
        (EntityId::Ground, _) => BallContact::Ground,
        (EntityId::Goal(team), Role::Goal) => BallContact::Goal(team),
        _ => BallContact::Other,
    };
    Some((ball_id, contact))
}

/// Who gets what for a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalOutcome {
    pub scoring_team: TeamId,
    pub toucher: Option<u32>,
    /// The toucher's own score goes up
    pub credited: bool,
    /// Points added to the scoring team (and to the toucher when credited)
    pub points: u32,
    pub own_goal: bool,
}

/// Last toucher as seen at goal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toucher {
    pub id: u32,
    pub team: Option<TeamId>,
    /// Points per goal; above 1 while double points is active
    pub multiplier: u32,
}

/// Attribute a goal scored into the net `goal_team` defends.
pub fn attribute_goal(goal_team: TeamId, toucher: Option<Toucher>) -> GoalOutcome {
    let scoring_team = goal_team.opposite();
    match toucher {
        Some(t) if t.team == Some(scoring_team) => GoalOutcome {
            scoring_team,
            toucher: Some(t.id),
            credited: true,
            points: t.multiplier.max(1),
            own_goal: false,
        },
        Some(t) if t.team == Some(goal_team) => GoalOutcome {
            scoring_team,
            toucher: Some(t.id),
            credited: false,
            points: 1,
            own_goal: true,
        },
        _ => GoalOutcome {
            scoring_team,
            toucher: None,
            credited: false,
            points: 1,
            own_goal: false,
        },
    }
}

impl Room {
    pub(crate) fn dispatch_contacts(&mut self, contacts: Vec<ContactPair>) {
        for pair in contacts {
            let Some((ball_id, contact)) = classify(&self.registry, pair) else {
                continue;
            };
            match contact {
                BallContact::Player(player_id) => {
                    if let Some(ball) = self.balls.get_mut(&ball_id) {
                        ball.last_touch = Some(player_id);
                    }
                }
                BallContact::Ground => {
                    self.broadcast(ServerMsg::BallCollision(BallCollisionMsg { ball_id }));
                }
                BallContact::Goal(team) => self.goal_contact(ball_id, team),
                BallContact::Other => {}
            }
        }
    }

    fn goal_contact(&mut self, ball_id: u32, goal_team: TeamId) {
        let Some(ball) = self.balls.get_mut(&ball_id) else {
            return;
        };
        if !ball.mark_scored() {
            return;
        }
        let kind = ball.kind;
        let last_touch = ball.last_touch;

        if !self.lifecycle.is_playing() {
            debug!("Discarding ball {} that reached a goal outside play", ball_id);
            if let Err(e) = self.remove_ball(ball_id) {
                warn!("Failed to remove ball {}: {}", ball_id, e);
            }
            // Pushed in before kickoff: the match still needs its ball
            if self.lifecycle.is_active() {
                self.spawn_ball();
            }
            return;
        }

        let toucher = last_touch.and_then(|id| {
            self.roster.players.get(&id).map(|p| Toucher {
                id,
                team: p.team,
                multiplier: p
                    .effects
                    .get(EffectKind::DoublePoints)
                    .map_or(1, |e| e.value as u32),
            })
        });
        let outcome = attribute_goal(goal_team, toucher);

        self.roster.team_mut(outcome.scoring_team).score += outcome.points;
        if let (true, Some(id)) = (outcome.credited, outcome.toucher) {
            if let Some(player) = self.roster.players.get_mut(&id) {
                player.score += outcome.points;
                player.stats.goals += 1;
            }
        }
        info!(
            "Goal for {:?} (ball {}, player {:?}, {} pts{})",
            outcome.scoring_team,
            ball_id,
            outcome.toucher,
            outcome.points,
            if outcome.own_goal { ", own goal" } else { "" }
        );
        self.broadcast(ServerMsg::Goal(GoalMsg {
            player_id: outcome.toucher,
            team_id: outcome.scoring_team,
            points: outcome.points,
            own_goal: outcome.own_goal,
        }));

        self.ball_side_effect(kind, goal_team);

        if let Err(e) = self.remove_ball(ball_id) {
            warn!("Failed to remove ball {}: {}", ball_id, e);
        }
        self.spawn_ball();
    }

    /// Punish the conceding team according to the kind of ball that went in.
    fn ball_side_effect(&mut self, kind: BallKind, team: TeamId) {
        let duration = match kind {
            BallKind::Normal => return,
            BallKind::Ice => self.config.freeze_secs,
            BallKind::Bomb => BOMB_STUN_SECS,
            BallKind::Light => LIGHT_FLASH_SECS,
            BallKind::Ghost => self.config.ghost_secs,
        };

        let targets: Vec<u32> = self
            .roster
            .active_on(team)
            .into_iter()
            .filter(|id| self.roster.players.get(id).is_some_and(|p| !p.immune))
            .collect();

        let mut affected = Vec::with_capacity(targets.len());
        for id in targets {
            if kind == BallKind::Ice {
                match self.apply_player_effect(id, EffectKind::Frozen, duration) {
                    Ok(true) => affected.push(id),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to freeze player {}: {}", id, e),
                }
            } else {
                affected.push(id);
            }
        }

        self.broadcast(ServerMsg::BallEffect(BallEffectMsg {
            effect: kind,
            team_id: team,
            players: affected,
            duration,
        }));
    }

    /// Replace balls that left the arena. They never score.
    pub(crate) fn recover_lost_balls(&mut self) {
        let kill_plane = self.config.kill_plane_y;
        let lost: Vec<u32> = self
            .balls
            .values()
            .filter(|b| !b.position.is_finite() || b.position.y < kill_plane)
            .map(|b| b.id)
            .collect();
        for ball_id in lost {
            debug!("Ball {} left the arena", ball_id);
            if let Err(e) = self.remove_ball(ball_id) {
                warn!("Failed to remove ball {}: {}", ball_id, e);
            }
            if self.lifecycle.is_active() {
                self.spawn_ball();
            }
        }
    }
}
