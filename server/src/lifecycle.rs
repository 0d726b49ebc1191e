//! Match state machine: Lobby → Starting → PreRound → Active → Cooldown → Lobby.
//!
//! Every phase after Lobby carries its own [`Countdown`]. [`Lifecycle::transition`] cancels
//! the outgoing countdown before the next phase is installed, so a countdown tick can only
//! ever land on the phase that armed it.

use crate::field;
use crate::profile::StatsDelta;
use crate::room::{Outbound, Room};
use crate::timer::{Countdown, Scheduler, TimerHandle};
use blitz_shared::protocol::{
    CountdownMsg, EndGameMsg, MatchPhase, MatchPhaseMsg, MatchWire, ResetGameMsg, ServerMsg,
    SpawnPlayerMsg, TeamId,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Lobby,
    Starting(Countdown),
    PreRound(Countdown),
    Active(Countdown),
    Cooldown(Countdown),
}

impl Phase {
    pub fn kind(&self) -> MatchPhase {
        match self {
            Phase::Lobby => MatchPhase::Lobby,
            Phase::Starting(_) => MatchPhase::Starting,
            Phase::PreRound(_) => MatchPhase::PreRound,
            Phase::Active(_) => MatchPhase::Active,
            Phase::Cooldown(_) => MatchPhase::Cooldown,
        }
    }

    fn countdown(&self) -> Option<&Countdown> {
        match self {
            Phase::Lobby => None,
            Phase::Starting(cd) | Phase::PreRound(cd) | Phase::Active(cd) | Phase::Cooldown(cd) => {
                Some(cd)
            }
        }
    }

    fn countdown_mut(&mut self) -> Option<&mut Countdown> {
        match self {
            Phase::Lobby => None,
            Phase::Starting(cd) | Phase::PreRound(cd) | Phase::Active(cd) | Phase::Cooldown(cd) => {
                Some(cd)
            }
        }
    }
}

/// Result of a countdown timer firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// The timer belongs to a phase that has already been left
    Stale,
    Tick { phase: MatchPhase, remaining: u32 },
    Elapsed(MatchPhase),
}

#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { phase: Phase::Lobby }
    }
}

impl Lifecycle {
    pub fn phase(&self) -> MatchPhase {
        self.phase.kind()
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.phase.countdown().map_or(0, |cd| cd.remaining)
    }

    pub fn is_starting(&self) -> bool {
        matches!(self.phase, Phase::Starting(_))
    }

    /// Players are on the pitch.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::PreRound(_) | Phase::Active(_))
    }

    /// The match clock is running and goals count.
    pub fn is_playing(&self) -> bool {
        matches!(self.phase, Phase::Active(_))
    }

    /// Replace the current phase, cancelling its countdown first.
    pub fn transition(&mut self, next: Phase, sched: &mut Scheduler) {
        if let Some(cd) = self.phase.countdown() {
            cd.cancel(sched);
        }
        self.phase = next;
    }

    pub fn on_countdown(&mut self, handle: TimerHandle, due: f64, sched: &mut Scheduler) -> CountdownStep {
        let phase = self.phase.kind();
        let Some(cd) = self.phase.countdown_mut() else {
            return CountdownStep::Stale;
        };
        if !cd.owns(handle) {
            return CountdownStep::Stale;
        }
        if cd.advance(due, sched) {
            CountdownStep::Elapsed(phase)
        } else {
            CountdownStep::Tick {
                phase,
                remaining: cd.remaining,
            }
        }
    }

    pub fn to_wire(&self) -> MatchWire {
        MatchWire {
            phase: self.phase(),
            seconds_remaining: self.seconds_remaining(),
            is_game_starting: self.is_starting(),
            is_game_active: self.is_active(),
            is_game_playing: self.is_playing(),
        }
    }
}

impl Room {
    /// Start or cancel the starting countdown depending on team readiness.
    pub(crate) fn evaluate_readiness(&mut self) {
        let met = self.roster.readiness_met();
        match self.lifecycle.phase() {
            MatchPhase::Lobby if met => self.enter_phase(MatchPhase::Starting),
            MatchPhase::Starting if !met => {
                info!("Start cancelled, a team has no ready players");
                self.enter_phase(MatchPhase::Lobby);
                self.broadcast(ServerMsg::StartCancelled);
            }
            _ => {}
        }
    }

    pub(crate) fn enter_phase(&mut self, kind: MatchPhase) {
        let secs = match kind {
            MatchPhase::Lobby => 0,
            MatchPhase::Starting => self.config.starting_countdown_secs,
            MatchPhase::PreRound => self.config.pre_round_countdown_secs,
            MatchPhase::Active => self.config.match_secs,
            MatchPhase::Cooldown => self.config.cooldown_secs,
        };
        let next = match kind {
            MatchPhase::Lobby => Phase::Lobby,
            MatchPhase::Starting => {
                Phase::Starting(Countdown::start(&mut self.scheduler, self.now, secs))
            }
            MatchPhase::PreRound => {
                Phase::PreRound(Countdown::start(&mut self.scheduler, self.now, secs))
            }
            MatchPhase::Active => Phase::Active(Countdown::start(&mut self.scheduler, self.now, secs)),
            MatchPhase::Cooldown => {
                Phase::Cooldown(Countdown::start(&mut self.scheduler, self.now, secs))
            }
        };
        self.lifecycle.transition(next, &mut self.scheduler);
        info!("Match phase -> {:?} ({}s)", kind, secs);
        self.broadcast(ServerMsg::MatchPhase(MatchPhaseMsg {
            phase: kind,
            seconds: secs,
        }));
    }

    pub(crate) fn on_countdown_timer(&mut self, handle: TimerHandle, due: f64) {
        match self.lifecycle.on_countdown(handle, due, &mut self.scheduler) {
            CountdownStep::Stale => debug!("Ignoring stale countdown timer"),
            CountdownStep::Tick { phase, remaining } => {
                self.broadcast(ServerMsg::Countdown(CountdownMsg {
                    phase,
                    seconds: remaining,
                }));
            }
            CountdownStep::Elapsed(MatchPhase::Starting) => self.begin_pre_round(),
            CountdownStep::Elapsed(MatchPhase::PreRound) => self.begin_play(),
            CountdownStep::Elapsed(MatchPhase::Active) => self.end_match(false),
            CountdownStep::Elapsed(MatchPhase::Cooldown) => self.reset_room(),
            CountdownStep::Elapsed(MatchPhase::Lobby) => {}
        }
    }

    /// Teleport ready players onto the pitch and drop the kickoff balls.
    fn begin_pre_round(&mut self) {
        self.enter_phase(MatchPhase::PreRound);
        for team in TeamId::ALL {
            let points = field::team_spawn_points(team, &self.config, &mut self.rng);
            let ids = self.roster.active_on(team);
            for (id, position) in ids.into_iter().zip(points) {
                if let Err(e) = self.spawn_player_body(id, team, position) {
                    warn!("Failed to spawn player {}: {}", id, e);
                    continue;
                }
                self.broadcast(ServerMsg::SpawnPlayer(SpawnPlayerMsg {
                    position,
                    player: id,
                }));
            }
        }
        for _ in 0..self.config.starting_balls {
            self.spawn_ball();
        }
    }

    fn begin_play(&mut self) {
        self.enter_phase(MatchPhase::Active);
        self.schedule_powerup_spawn();
    }

    /// Close the match. A forced end (nobody left playing) has no result and no payout.
    pub(crate) fn end_match(&mut self, forced: bool) {
        let red = self.roster.team(TeamId::Red).score;
        let blue = self.roster.team(TeamId::Blue).score;
        let winner = match red.cmp(&blue) {
            _ if forced => None,
            std::cmp::Ordering::Greater => Some(TeamId::Red),
            std::cmp::Ordering::Less => Some(TeamId::Blue),
            std::cmp::Ordering::Equal => None,
        };
        let tied = !forced && winner.is_none();
        let top_scorer = if forced { None } else { self.top_scorer() };

        info!(
            "Match over: red {} - blue {} (winner {:?}, forced {})",
            red, blue, winner, forced
        );
        self.broadcast(ServerMsg::EndGame(EndGameMsg {
            winner,
            tied,
            forced,
            top_scorer,
        }));

        if !forced {
            self.pay_out(winner, top_scorer);
        }

        let ball_ids: Vec<u32> = self.balls.keys().copied().collect();
        for id in ball_ids {
            if let Err(e) = self.remove_ball(id) {
                warn!("Failed to remove ball {}: {}", id, e);
            }
        }
        self.powerups.clear(&mut self.scheduler);

        self.enter_phase(MatchPhase::Cooldown);
        self.broadcast(ServerMsg::ResetGame(ResetGameMsg { freeze: true }));
    }

    /// Highest-scoring active player with at least one point; lowest id wins ties.
    fn top_scorer(&self) -> Option<u32> {
        self.roster
            .players
            .values()
            .filter(|p| p.is_active() && p.score > 0)
            .max_by(|a, b| a.score.cmp(&b.score).then(b.id.cmp(&a.id)))
            .map(|p| p.id)
    }

    /// Credit dust and stats to everyone who played, and queue the deltas for persistence.
    fn pay_out(&mut self, winner: Option<TeamId>, top_scorer: Option<u32>) {
        let win_dust = self.config.win_dust as u64;
        let bonus = self.config.top_scorer_dust as u64;
        let mut deltas = Vec::new();

        for player in self.roster.players.values_mut() {
            let Some(team) = player.team.filter(|_| player.is_active()) else {
                continue;
            };
            let won = winner == Some(team);
            let lost = winner.is_some() && !won;
            if won {
                player.stats.wins += 1;
            }
            if lost {
                player.stats.losses += 1;
            }
            let mut dust = if won { win_dust } else { 0 };
            if top_scorer == Some(player.id) {
                dust += bonus;
            }
            deltas.push(StatsDelta {
                player_id: player.id,
                dust,
                won,
                lost,
                goals: player.stats.goals,
                distance: player.stats.distance,
            });
        }

        for delta in deltas {
            self.outbox.push(Outbound::Persist(delta));
        }
    }

    /// Back to an empty lobby. Team membership survives; everything else from the match goes.
    pub(crate) fn reset_room(&mut self) {
        let ids: Vec<u32> = self.roster.players.keys().copied().collect();
        for id in ids {
            self.despawn_player_body(id);
            if let Some(player) = self.roster.players.get_mut(&id) {
                player.reset_for_lobby();
            }
        }
        for team in TeamId::ALL {
            self.roster.team_mut(team).score = 0;
            self.lower_ice_wall(team, None);
        }
        let ball_ids: Vec<u32> = self.balls.keys().copied().collect();
        for id in ball_ids {
            if let Err(e) = self.remove_ball(id) {
                warn!("Failed to remove ball {}: {}", id, e);
            }
        }
        self.powerups.clear(&mut self.scheduler);

        self.enter_phase(MatchPhase::Lobby);
        self.broadcast(ServerMsg::ResetGame(ResetGameMsg { freeze: false }));
    }

    /// End the match early once nobody is left playing.
    pub(crate) fn check_forced_end(&mut self) {
        if self.lifecycle.is_active() && self.roster.active_count() == 0 {
            info!("No active players left, ending match");
            self.end_match(true);
        }
    }
}
