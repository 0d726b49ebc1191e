//! Team membership and readiness.
//!
//! A team's `player_count` is the number of non-spectating players assigned to it. Every path
//! that takes a player off a team goes through [`Roster::release_slot`], so each increment in
//! [`Roster::join_team`] is matched by exactly one decrement.

use crate::error::RoomError;
use crate::player::Player;
use crate::timer::TimerHandle;
use blitz_shared::protocol::TeamId;
use std::collections::BTreeMap;

/// Temporary wall in front of a team's goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IceWall {
    pub timer: TimerHandle,
    pub expires_at: f64,
}

#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub player_count: u32,
    pub score: u32,
    pub ice_wall: Option<IceWall>,
}

impl Team {
    fn new(id: TeamId) -> Self {
        Self {
            id,
            name: id.display_name().to_string(),
            player_count: 0,
            score: 0,
            ice_wall: None,
        }
    }
}

#[derive(Debug)]
pub struct Roster {
    pub players: BTreeMap<u32, Player>,
    teams: [Team; 2],
    capacity: u32,
}

impl Roster {
    pub fn new(capacity: u32) -> Self {
        Self {
            players: BTreeMap::new(),
            teams: [Team::new(TeamId::Red), Team::new(TeamId::Blue)],
            capacity,
        }
    }

    pub fn team(&self, id: TeamId) -> &Team {
        &self.teams[id.index()]
    }

    pub fn team_mut(&mut self, id: TeamId) -> &mut Team {
        &mut self.teams[id.index()]
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.teams.iter()
    }

    pub fn add(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn join_team(&mut self, player_id: u32, team: TeamId) -> Result<(), RoomError> {
        let capacity = self.capacity;
        let player = self
            .players
            .get(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;
        if player.team == Some(team) && !player.spectating {
            return Err(RoomError::AlreadyOnTeam(player_id, team));
        }
        if player.ready {
            return Err(RoomError::PlayerLocked(player_id));
        }
        if self.team(team).player_count >= capacity {
            return Err(RoomError::TeamFull(team));
        }

        self.release_slot(player_id);
        if let Some(player) = self.players.get_mut(&player_id) {
            player.team = Some(team);
            player.spectating = false;
        }
        self.team_mut(team).player_count += 1;
        Ok(())
    }

    /// Send a player back to unassigned. Readiness goes with the team.
    pub fn cancel_join(&mut self, player_id: u32) -> Result<TeamId, RoomError> {
        let player = self
            .players
            .get(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;
        let team = player.team.ok_or(RoomError::NotOnTeam(player_id))?;
        self.release_slot(player_id);
        if let Some(player) = self.players.get_mut(&player_id) {
            player.ready = false;
        }
        Ok(team)
    }

    /// Remove a player from the room entirely.
    pub fn leave(&mut self, player_id: u32) -> Option<Player> {
        self.release_slot(player_id);
        self.players.remove(&player_id)
    }

    pub fn set_ready(&mut self, player_id: u32, ready: bool) -> Result<(), RoomError> {
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;
        if !player.is_on_team() {
            return Err(RoomError::NotOnTeam(player_id));
        }
        player.ready = ready;
        Ok(())
    }

    /// Spectating players hold no team slot and are never ready.
    pub fn set_spectating(&mut self, player_id: u32, spectating: bool) -> Result<(), RoomError> {
        if !self.players.contains_key(&player_id) {
            return Err(RoomError::MissingPlayer(player_id));
        }
        if spectating {
            self.release_slot(player_id);
        }
        if let Some(player) = self.players.get_mut(&player_id) {
            player.spectating = spectating;
            if spectating {
                player.ready = false;
            }
        }
        Ok(())
    }

    /// The single decrement path: unassign the player and free their slot, if they held one.
    fn release_slot(&mut self, player_id: u32) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        let held_slot = player.is_on_team();
        let team = player.team.take();
        if let (true, Some(team)) = (held_slot, team) {
            let t = self.team_mut(team);
            debug_assert!(t.player_count > 0, "{:?} count underflow", team);
            t.player_count = t.player_count.saturating_sub(1);
        }
    }

    /// Ready, non-spectating players per team, indexed by [`TeamId::index`].
    pub fn ready_counts(&self) -> [u32; 2] {
        let mut counts = [0u32; 2];
        for player in self.players.values() {
            if let (true, Some(team)) = (player.is_active(), player.team) {
                counts[team.index()] += 1;
            }
        }
        counts
    }

    /// Both teams have at least one ready player.
    pub fn readiness_met(&self) -> bool {
        self.ready_counts().iter().all(|&c| c > 0)
    }

    pub fn active_count(&self) -> usize {
        self.players.values().filter(|p| p.is_active()).count()
    }

    /// Active players of one team, in id order.
    pub fn active_on(&self, team: TeamId) -> Vec<u32> {
        self.players
            .values()
            .filter(|p| p.is_active() && p.team == Some(team))
            .map(|p| p.id)
            .collect()
    }

    /// True if every team's count matches its actual membership.
    pub fn check_counts(&self) -> bool {
        TeamId::ALL.iter().all(|&team| {
            let members = self
                .players
                .values()
                .filter(|p| p.is_on_team() && p.team == Some(team))
                .count() as u32;
            self.team(team).player_count == members
        })
    }
}
