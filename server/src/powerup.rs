//! Power-up spawning and redemption.
//!
//! While the match is playing and fewer than `max_active_powerups` are on the pitch, exactly
//! one spawn timer is pending. Redemption takes the power-up out of the active set before
//! applying anything, so two players racing for the same one cannot both get it.

use crate::ball::weighted_pick;
use crate::error::RoomError;
use crate::field;
use crate::registry::{EntityId, Role};
use crate::roster::IceWall;
use crate::room::Room;
use crate::timer::{Scheduler, TimerHandle, TimerKind};
use blitz_shared::protocol::{
    EffectKind, IceWallMsg, PowerUpEffectMsg, PowerUpKind, PowerUpRemovedMsg, PowerUpWire,
    ServerMsg, TeamId,
};
use blitz_shared::vec3::Vec3;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const POWERUP_WEIGHTS: [(PowerUpKind, u32); 4] = [
    (PowerUpKind::DoublePoints, 35),
    (PowerUpKind::Immunity, 25),
    (PowerUpKind::IceGoal, 20),
    (PowerUpKind::Ghost, 20),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerUp {
    pub id: u32,
    pub kind: PowerUpKind,
    pub position: Vec3,
}

impl PowerUp {
    pub fn to_wire(&self) -> PowerUpWire {
        PowerUpWire {
            id: self.id,
            kind: self.kind,
            position: self.position,
        }
    }
}

#[derive(Debug, Default)]
pub struct PowerUps {
    active: BTreeMap<u32, PowerUp>,
    next_id: u32,
    spawn_timer: Option<TimerHandle>,
}

impl PowerUps {
    pub fn insert(&mut self, kind: PowerUpKind, position: Vec3) -> PowerUp {
        self.next_id += 1;
        let powerup = PowerUp {
            id: self.next_id,
            kind,
            position,
        };
        self.active.insert(powerup.id, powerup);
        powerup
    }

    /// Remove a power-up from the active set. Only the first caller gets it.
    pub fn take(&mut self, id: u32) -> Option<PowerUp> {
        self.active.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PowerUp> {
        self.active.values()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn spawn_pending(&self) -> bool {
        self.spawn_timer.is_some()
    }

    /// Drop every power-up and cancel the pending spawn.
    pub fn clear(&mut self, sched: &mut Scheduler) {
        if let Some(handle) = self.spawn_timer.take() {
            sched.cancel(handle);
        }
        self.active.clear();
    }
}

impl Room {
    /// Arm the spawn timer unless one is already pending or the pitch is full.
    pub(crate) fn schedule_powerup_spawn(&mut self) {
        let max = self.config.max_active_powerups as usize;
        if !self.lifecycle.is_playing() || self.powerups.spawn_pending() || self.powerups.len() >= max
        {
            return;
        }
        let delay = self
            .rng
            .gen_range(self.config.powerup_spawn_delay_min..=self.config.powerup_spawn_delay_max);
        let handle = self
            .scheduler
            .schedule(self.now, delay, TimerKind::PowerUpSpawn);
        self.powerups.spawn_timer = Some(handle);
    }

    pub(crate) fn on_powerup_timer(&mut self, handle: TimerHandle) {
        if self.powerups.spawn_timer != Some(handle) {
            return;
        }
        self.powerups.spawn_timer = None;

        let max = self.config.max_active_powerups as usize;
        if self.lifecycle.is_playing() && self.powerups.len() < max {
            let kind = weighted_pick(&mut self.rng, &POWERUP_WEIGHTS, PowerUpKind::DoublePoints);
            let position = field::random_point_in_bounds(&mut self.rng, &self.config);
            let powerup = self.powerups.insert(kind, position);
            debug!("Spawned {:?} power-up {}", kind, powerup.id);
            self.broadcast(ServerMsg::PowerUpSpawned(powerup.to_wire()));
        }
        self.schedule_powerup_spawn();
    }

    /// Redeem power-up `powerup_id` for `player_id`.
    pub(crate) fn redeem_powerup(
        &mut self,
        player_id: u32,
        powerup_id: u32,
    ) -> Result<PowerUpKind, RoomError> {
        let player = self
            .roster
            .players
            .get(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;
        let team = match player.team {
            Some(team) if !player.spectating => team,
            _ => return Err(RoomError::NotOnTeam(player_id)),
        };

        let powerup = self
            .powerups
            .take(powerup_id)
            .ok_or(RoomError::MissingPowerUp(powerup_id))?;
        self.broadcast(ServerMsg::PowerUpRemoved(PowerUpRemovedMsg {
            powerup_id,
            player_id: Some(player_id),
        }));

        let duration = match powerup.kind {
            PowerUpKind::DoublePoints => {
                let secs = self.config.double_points_secs;
                self.apply_player_effect(player_id, EffectKind::DoublePoints, secs)?;
                secs
            }
            PowerUpKind::Immunity => {
                let secs = self.config.immunity_secs;
                self.apply_player_effect(player_id, EffectKind::Immunity, secs)?;
                secs
            }
            PowerUpKind::IceGoal => {
                self.raise_ice_wall(team.opposite());
                self.config.ice_wall_secs
            }
            PowerUpKind::Ghost => {
                let ghosted = self.ghost_team(team.opposite());
                debug!("Ghosted {:?} players {:?}", team.opposite(), ghosted);
                self.config.ghost_secs
            }
        };

        info!(
            "Player {} redeemed {:?} power-up {}",
            player_id, powerup.kind, powerup_id
        );
        self.broadcast(ServerMsg::PowerUpEffect(PowerUpEffectMsg {
            effect: powerup.kind,
            player_id,
            team_id: team,
            duration,
        }));
        self.schedule_powerup_spawn();
        Ok(powerup.kind)
    }

    /// Put a wall in front of `team`'s goal, or push back the expiry of the one already up.
    pub(crate) fn raise_ice_wall(&mut self, team: TeamId) {
        let secs = self.config.ice_wall_secs;
        let timer = self
            .scheduler
            .schedule(self.now, secs, TimerKind::IceWall(team));
        let wall = IceWall {
            timer,
            expires_at: self.now + secs,
        };

        if let Some(previous) = self.roster.team_mut(team).ice_wall.replace(wall) {
            self.scheduler.cancel(previous.timer);
            return;
        }

        let body = self.world.add_body(field::ice_wall_desc(team, &self.config));
        self.registry
            .register(EntityId::IceWall(team), body, Role::Wall);
        self.broadcast(ServerMsg::IceWall(IceWallMsg {
            team_id: team,
            active: true,
        }));
    }

    /// Remove the wall in front of `team`'s goal.
    ///
    /// `fired` is the timer that triggered the removal; a timer that no longer belongs to the
    /// current wall is ignored. Pass `None` to remove unconditionally.
    pub(crate) fn lower_ice_wall(&mut self, team: TeamId, fired: Option<TimerHandle>) {
        let current = self.roster.team(team).ice_wall;
        let Some(wall) = current else {
            return;
        };
        match fired {
            Some(handle) if handle != wall.timer => return,
            Some(_) => {}
            None => {
                self.scheduler.cancel(wall.timer);
            }
        }
        self.roster.team_mut(team).ice_wall = None;

        if let Err(e) = self
            .registry
            .despawn(self.world.as_mut(), EntityId::IceWall(team))
        {
            warn!("Failed to remove ice wall for {:?}: {}", team, e);
        }
        self.broadcast(ServerMsg::IceWall(IceWallMsg {
            team_id: team,
            active: false,
        }));
    }

    /// Ghost every non-immune active player of `team` that has a body.
    fn ghost_team(&mut self, team: TeamId) -> Vec<u32> {
        let secs = self.config.ghost_secs;
        let targets: Vec<u32> = self
            .roster
            .active_on(team)
            .into_iter()
            .filter(|id| self.registry.lookup(EntityId::Player(*id)).is_some())
            .collect();

        let mut ghosted = Vec::new();
        for id in targets {
            match self.apply_player_effect(id, EffectKind::Ghost, secs) {
                Ok(true) => ghosted.push(id),
                Ok(false) => {}
                Err(e) => warn!("Failed to ghost player {}: {}", id, e),
            }
        }
        ghosted
    }
}
