//! The room: one authoritative match and everything it owns.
//!
//! `Room` is the context object every subsystem works on. The physics world, registry, roster,
//! balls, power-ups, lifecycle, scheduler and RNG all live here and are only touched from the
//! game-loop task, either inside [`Room::tick`] or inside a single [`Room::handle_message`].
//! Outgoing traffic is queued in an outbox the loop drains after each call.

use crate::ball::{random_ball_kind, Ball};
use crate::error::RoomError;
use crate::field;
use crate::lifecycle::Lifecycle;
use crate::mirror;
use crate::physics::{PhysicsWorld, RapierWorld};
use crate::player::Player;
use crate::powerup::PowerUps;
use crate::profile::StatsDelta;
use crate::protocol::{
    ball_wire, player_wire, team_wire, ClientMsg, MatchPhase, RoomStateMsg, ServerMsg, TeamId,
    WelcomeMsg, PROTOCOL_VERSION,
};
use crate::registry::{EntityId, PhysicsRegistry, Role};
use crate::roster::Roster;
use crate::timer::{Scheduler, TimerKind};
use blitz_shared::config::BlitzConfig;
use blitz_shared::protocol::EffectKind;
use blitz_shared::vec3::{distance, vec3, Vec3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Something the room wants delivered once the current call returns.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// To every connected client
    Broadcast(ServerMsg),
    /// To the persistence task
    Persist(StatsDelta),
}

pub struct Room {
    pub(crate) config: BlitzConfig,
    pub(crate) world: Box<dyn PhysicsWorld>,
    pub(crate) registry: PhysicsRegistry,
    pub(crate) roster: Roster,
    pub(crate) balls: BTreeMap<u32, Ball>,
    pub(crate) powerups: PowerUps,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) scheduler: Scheduler,
    pub(crate) rng: ChaCha8Rng,
    /// Room clock in seconds, advanced by `tick`
    pub(crate) now: f64,
    pub(crate) outbox: Vec<Outbound>,
    next_player_id: u32,
    next_ball_id: u32,
}

impl Room {
    pub fn new(config: BlitzConfig, seed: u64) -> Self {
        Self::with_world(config, seed, Box::new(RapierWorld::new()))
    }

    /// Build a room on top of any physics world. The arena is added to it immediately.
    pub fn with_world(config: BlitzConfig, seed: u64, mut world: Box<dyn PhysicsWorld>) -> Self {
        let mut registry = PhysicsRegistry::new();
        field::build(world.as_mut(), &mut registry, &config);
        Self {
            config,
            world,
            registry,
            roster: Roster::new(config.team_capacity),
            balls: BTreeMap::new(),
            powerups: PowerUps::default(),
            lifecycle: Lifecycle::default(),
            scheduler: Scheduler::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            now: 0.0,
            outbox: Vec::new(),
            next_player_id: 1,
            next_ball_id: 1,
        }
    }

    pub fn config(&self) -> &BlitzConfig {
        &self.config
    }

    pub fn phase(&self) -> MatchPhase {
        self.lifecycle.phase()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.roster.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.roster.players.len()
    }

    pub fn ball_count(&self) -> usize {
        self.balls.len()
    }

    pub fn team_score(&self, team: TeamId) -> u32 {
        self.roster.team(team).score
    }

    pub fn has_body(&self, player_id: u32) -> bool {
        self.registry.lookup(EntityId::Player(player_id)).is_some()
    }

    pub(crate) fn broadcast(&mut self, msg: ServerMsg) {
        self.outbox.push(Outbound::Broadcast(msg));
    }

    /// Everything queued since the last call, in order.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn add_player(&mut self) -> u32 {
        let id = self.next_player_id;
        self.next_player_id += 1;
        self.roster.add(Player::new(id));
        info!("Player {} joined the room", id);
        id
    }

    pub fn remove_player(&mut self, id: u32) {
        self.despawn_player_body(id);
        if self.roster.leave(id).is_none() {
            return;
        }
        for ball in self.balls.values_mut() {
            if ball.last_touch == Some(id) {
                ball.last_touch = None;
            }
        }
        info!("Player {} left the room", id);
        self.evaluate_readiness();
        self.check_forced_end();
    }

    /// Apply one client message. Nothing is changed when an error is returned.
    pub fn handle_message(&mut self, player_id: u32, msg: ClientMsg) -> Result<(), RoomError> {
        if !self.roster.players.contains_key(&player_id) {
            return Err(RoomError::MissingPlayer(player_id));
        }
        let phase = self.lifecycle.phase();
        match msg {
            ClientMsg::JoinTeam(m) => {
                if self.lifecycle.is_active() {
                    return Err(RoomError::InvalidPhase(phase));
                }
                self.roster.join_team(player_id, m.team_id)?;
                info!("Player {} joined {:?}", player_id, m.team_id);
                self.evaluate_readiness();
            }
            ClientMsg::CancelJoin => {
                if self.lifecycle.is_active() {
                    return Err(RoomError::InvalidPhase(phase));
                }
                let team = self.roster.cancel_join(player_id)?;
                info!("Player {} left {:?}", player_id, team);
                self.evaluate_readiness();
            }
            ClientMsg::PlayerReady(m) => {
                if !matches!(phase, MatchPhase::Lobby | MatchPhase::Starting) {
                    return Err(RoomError::InvalidPhase(phase));
                }
                self.roster.set_ready(player_id, m.is_ready)?;
                debug!("Player {} ready: {}", player_id, m.is_ready);
                self.evaluate_readiness();
            }
            ClientMsg::PlayerMove(m) => self.handle_move(player_id, m.player_pos)?,
            ClientMsg::PowerUp(m) => {
                if !self.lifecycle.is_playing() {
                    return Err(RoomError::InvalidPhase(phase));
                }
                self.redeem_powerup(player_id, m.powerup_id)?;
            }
            ClientMsg::PlayerSpectating(m) => {
                if !(self.lifecycle.is_starting() || self.lifecycle.is_active()) {
                    return Err(RoomError::InvalidPhase(phase));
                }
                self.roster.set_spectating(player_id, m.spectating)?;
                if m.spectating {
                    self.despawn_player_body(player_id);
                }
                debug!("Player {} spectating: {}", player_id, m.spectating);
                self.evaluate_readiness();
                self.check_forced_end();
            }
        }
        Ok(())
    }

    fn handle_move(&mut self, player_id: u32, target: Vec3) -> Result<(), RoomError> {
        let max = self.config.max_move_distance;
        let player = self
            .roster
            .players
            .get(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;
        if player.spectating {
            return Err(RoomError::NotOnTeam(player_id));
        }
        let body = self
            .registry
            .lookup(EntityId::Player(player_id))
            .ok_or(RoomError::NoBody(player_id))?;
        if player.effects.has(EffectKind::Frozen) {
            return Err(RoomError::Frozen(player_id));
        }
        let moved = distance(player.position, target);
        if !target.is_finite() || !moved.is_finite() || moved > max {
            return Err(RoomError::ImplausibleMove {
                player: player_id,
                distance: moved,
            });
        }

        self.world.move_kinematic(body, target)?;
        if let Some(player) = self.roster.players.get_mut(&player_id) {
            player.position = target;
            player.stats.distance += moved;
        }
        Ok(())
    }

    /// Advance the room by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.now += dt;

        let contacts = self.world.step(dt);
        self.dispatch_contacts(contacts);
        mirror::sync(
            &self.registry,
            self.world.as_ref(),
            &mut self.balls,
            &mut self.roster.players,
        );
        self.recover_lost_balls();
        self.sweep_effects();
        self.fire_timers();
    }

    fn fire_timers(&mut self) {
        while let Some((handle, kind, due)) = self.scheduler.pop_due(self.now) {
            match kind {
                TimerKind::Countdown => self.on_countdown_timer(handle, due),
                TimerKind::PowerUpSpawn => self.on_powerup_timer(handle),
                TimerKind::IceWall(team) => self.lower_ice_wall(team, Some(handle)),
            }
        }
    }

    /// Put a new ball in play at one of the kickoff points.
    pub(crate) fn spawn_ball(&mut self) -> u32 {
        let id = self.next_ball_id;
        self.next_ball_id += 1;
        let kind = random_ball_kind(&mut self.rng);
        let position = field::ball_spawn_points(&mut self.rng)
            .into_iter()
            .next()
            .unwrap_or(vec3(0.0, 1.0, 0.0));

        let body = self.world.add_body(field::ball_desc(position, &self.config));
        self.registry.register(EntityId::Ball(id), body, Role::Ball);
        self.balls.insert(id, Ball::new(id, kind, position));
        debug!("Spawned {:?} ball {}", kind, id);
        id
    }

    pub(crate) fn remove_ball(&mut self, id: u32) -> Result<(), RoomError> {
        self.balls.remove(&id).ok_or(RoomError::MissingBall(id))?;
        self.registry
            .despawn(self.world.as_mut(), EntityId::Ball(id))?;
        Ok(())
    }

    /// Create (or replace) a player's body at `position`.
    pub(crate) fn spawn_player_body(
        &mut self,
        player_id: u32,
        team: TeamId,
        position: Vec3,
    ) -> Result<(), RoomError> {
        let player = self
            .roster
            .players
            .get_mut(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;
        player.position = position;
        player.velocity = Vec3::ZERO;

        self.registry
            .despawn(self.world.as_mut(), EntityId::Player(player_id))?;
        let body = self
            .world
            .add_body(field::player_desc(team, position, &self.config));
        self.registry
            .register(EntityId::Player(player_id), body, Role::Player);
        Ok(())
    }

    pub(crate) fn despawn_player_body(&mut self, player_id: u32) {
        if let Err(e) = self
            .registry
            .despawn(self.world.as_mut(), EntityId::Player(player_id))
        {
            warn!("Failed to remove body of player {}: {}", player_id, e);
        }
    }

    /// Replicated state as sent to clients.
    pub fn snapshot(&self) -> RoomStateMsg {
        RoomStateMsg {
            match_state: self.lifecycle.to_wire(),
            teams: self.roster.teams().map(team_wire).collect(),
            players: self.roster.players.values().map(player_wire).collect(),
            balls: self.balls.values().map(ball_wire).collect(),
            powerups: self.powerups.iter().map(|p| p.to_wire()).collect(),
        }
    }

    pub fn welcome(&self, player_id: u32) -> WelcomeMsg {
        WelcomeMsg {
            protocol_version: PROTOCOL_VERSION,
            self_id: player_id,
            state: self.snapshot(),
            config: self.config,
        }
    }

    /// Tear everything down: every body, timer and registry entry.
    pub fn dispose(&mut self) {
        let removed = self.registry.despawn_all(self.world.as_mut());
        self.scheduler.clear();
        self.balls.clear();
        self.powerups.clear(&mut self.scheduler);
        for team in TeamId::ALL {
            self.roster.team_mut(team).ice_wall = None;
        }
        for player in self.roster.players.values_mut() {
            player.effects.drain();
            player.immune = false;
        }
        self.outbox.clear();
        info!("Room disposed ({} bodies removed)", removed);
    }

    pub fn body_count(&self) -> usize {
        self.world.body_count()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::physics::ContactPair;
    use blitz_shared::protocol::{
        JoinTeamMsg, PlayerMoveMsg, PlayerSpectatingMsg, PowerUpMsg,
    };
    use blitz_shared::vec3::vec3;

    #[test]
    fn new_room_is_an_empty_lobby() {
        let room = Room::new(BlitzConfig::default(), 1);
        assert_eq!(room.phase(), MatchPhase::Lobby);
        assert_eq!(room.player_count(), 0);
        assert_eq!(room.ball_count(), 0);
        assert!(room.body_count() > 0, "arena geometry exists");
    }

    #[test]
    fn players_get_unique_ids() {
        let mut room = Room::new(BlitzConfig::default(), 1);
        let a = room.add_player();
        let b = room.add_player();
        assert_ne!(a, b);
        room.remove_player(a);
        let c = room.add_player();
        assert_ne!(c, a);
    }

    #[test]
    fn unknown_player_rejected() {
        let mut room = Room::new(BlitzConfig::default(), 1);
        assert_eq!(
            room.handle_message(9, ClientMsg::CancelJoin),
            Err(RoomError::MissingPlayer(9))
        );
    }

    #[test]
    fn team_switching_locked_during_match() {
        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        assert_eq!(
            room.handle_message(
                red,
                ClientMsg::JoinTeam(JoinTeamMsg {
                    team_id: TeamId::Blue
                })
            ),
            Err(RoomError::InvalidPhase(MatchPhase::Active))
        );
        assert_eq!(
            room.handle_message(red, ClientMsg::CancelJoin),
            Err(RoomError::InvalidPhase(MatchPhase::Active))
        );
    }

    #[test]
    fn moves_before_kickoff_have_no_body() {
        let mut room = Room::new(BlitzConfig::default(), 1);
        let id = room.add_player();
        let msg = ClientMsg::PlayerMove(PlayerMoveMsg {
            player_pos: vec3(1.0, 0.75, 1.0),
        });
        assert_eq!(room.handle_message(id, msg), Err(RoomError::NoBody(id)));
    }

    #[test]
    fn move_accumulates_distance_and_rejects_jumps() {
        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        let start = room.player(red).unwrap().position;
        let step = vec3(start.x + 1.5, start.y, start.z + 2.0);
        room.handle_message(red, ClientMsg::PlayerMove(PlayerMoveMsg { player_pos: step }))
            .unwrap();
        assert!((room.player(red).unwrap().stats.distance - 2.5).abs() < 1e-9);

        let jump = vec3(step.x + 50.0, step.y, step.z);
        assert!(matches!(
            room.handle_message(red, ClientMsg::PlayerMove(PlayerMoveMsg { player_pos: jump })),
            Err(RoomError::ImplausibleMove { .. })
        ));
        assert_eq!(room.player(red).unwrap().position, step);

        room.tick(1.0 / 60.0);
        let body = room.registry.lookup(EntityId::Player(red)).unwrap();
        let state = room.world.body_state(body).unwrap();
        assert!(distance(state.position, step) < 1e-4);
    }

    #[test]
    fn frozen_player_cannot_move() {
        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        room.apply_player_effect(red, EffectKind::Frozen, 3.0)
            .unwrap();
        let pos = room.player(red).unwrap().position;
        assert_eq!(
            room.handle_message(red, ClientMsg::PlayerMove(PlayerMoveMsg { player_pos: pos })),
            Err(RoomError::Frozen(red))
        );
    }

    #[test]
    fn powerup_outside_play_rejected() {
        let mut room = Room::new(BlitzConfig::default(), 1);
        let id = room.add_player();
        assert_eq!(
            room.handle_message(id, ClientMsg::PowerUp(PowerUpMsg { powerup_id: 1 })),
            Err(RoomError::InvalidPhase(MatchPhase::Lobby))
        );
    }

    #[test]
    fn spectating_only_while_starting_or_active() {
        let mut room = Room::new(BlitzConfig::default(), 1);
        let id = room.add_player();
        let msg = ClientMsg::PlayerSpectating(PlayerSpectatingMsg { spectating: true });
        assert_eq!(
            room.handle_message(id, msg.clone()),
            Err(RoomError::InvalidPhase(MatchPhase::Lobby))
        );

        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        room.handle_message(red, msg).unwrap();
        assert!(!room.has_body(red));
        assert!(room.player(red).unwrap().spectating);
        assert_eq!(room.roster.team(TeamId::Red).player_count, 0);
        assert!(room.roster.check_counts());
    }

    #[test]
    fn snapshot_reflects_room() {
        let (room, red, _blue) = active_room(BlitzConfig::default());
        let snap = room.snapshot();
        assert_eq!(snap.match_state.phase, MatchPhase::Active);
        assert!(snap.match_state.is_game_playing);
        assert_eq!(snap.teams.len(), 2);
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.balls.len(), 1);
        let wire = snap.players.iter().find(|p| p.id == red).unwrap();
        assert_eq!(wire.team_id, Some(TeamId::Red));
    }

    #[test]
    fn lobby_to_goal_to_respawn() {
        let (mut room, _red, blue) = active_room(BlitzConfig::default());
        let ball = *room.balls.keys().next().unwrap();
        room.balls.get_mut(&ball).unwrap().last_touch = Some(blue);

        // Carry the ball into the mouth of Red's goal and let physics report the contact
        let body = room.registry.lookup(EntityId::Ball(ball)).unwrap();
        let l = room.config.arena_half_length;
        room.world
            .set_position(body, vec3(0.0, 1.0, -(l - 0.5)))
            .unwrap();
        room.world.set_linvel(body, vec3(0.0, 0.0, -12.0)).unwrap();
        drain_events(&mut room);

        run_until(&mut room, 1.0 / 60.0, 120, |r| !r.balls.contains_key(&ball));

        assert_eq!(room.team_score(TeamId::Blue), 1);
        assert_eq!(room.player(blue).unwrap().score, 1);
        assert_eq!(room.ball_count(), 1, "replacement ball spawned");
        let events = drain_events(&mut room);
        assert!(events.iter().any(|m| matches!(
            m,
            ServerMsg::Goal(g) if g.team_id == TeamId::Blue && g.player_id == Some(blue) && !g.own_goal
        )));
    }

    #[test]
    fn straggler_contacts_after_removal_are_ignored() {
        let (mut room, _red, _blue) = active_room(BlitzConfig::default());
        let ball = *room.balls.keys().next().unwrap();
        let body = room.registry.lookup(EntityId::Ball(ball)).unwrap();
        let goal = room.registry.lookup(EntityId::Goal(TeamId::Blue)).unwrap();
        room.remove_ball(ball).unwrap();
        room.dispatch_contacts(vec![ContactPair { a: body, b: goal }]);
        assert_eq!(room.team_score(TeamId::Red), 0);
        assert_eq!(room.ball_count(), 0);
    }

    #[test]
    fn dispose_releases_everything() {
        let (mut room, _red, _blue) = active_room(BlitzConfig::default());
        room.raise_ice_wall(TeamId::Red);
        room.dispose();
        assert_eq!(room.body_count(), 0);
        assert_eq!(room.pending_timers(), 0);
        assert!(room.registry.is_empty());
        assert_eq!(room.ball_count(), 0);

        // Ticking a disposed room fires nothing
        room.tick(30.0);
        assert!(room.take_outbound().is_empty());
    }
}
