//! Timed player effects.
//!
//! A player carries at most one [`ActiveEffect`] per [`EffectKind`]; applying a kind that is
//! already active only pushes its expiry out. Side effects (immune flag, frozen body, ghosted
//! collision filter) are installed when an effect first lands and undone in exactly one place,
//! [`Room::sweep_effects`], which runs once per tick.

use crate::error::RoomError;
use crate::physics::{groups, BodyKind};
use crate::registry::EntityId;
use crate::room::Room;
use blitz_shared::protocol::{EffectKind, PlayerRefMsg, RemoveEffectMsg, ServerMsg};
use tracing::{debug, warn};

/// Score multiplier carried by a double-points effect.
pub const DOUBLE_POINTS_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveEffect {
    pub kind: EffectKind,
    /// Room time at which the effect ends
    pub expires_at: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectList {
    effects: Vec<ActiveEffect>,
}

impl EffectList {
    /// Add or refresh an effect. Returns true if the kind was not active before.
    pub fn apply(&mut self, kind: EffectKind, expires_at: f64, value: f64) -> bool {
        if let Some(existing) = self.effects.iter_mut().find(|e| e.kind == kind) {
            existing.expires_at = existing.expires_at.max(expires_at);
            existing.value = value;
            return false;
        }
        self.effects.push(ActiveEffect {
            kind,
            expires_at,
            value,
        });
        true
    }

    pub fn has(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    pub fn get(&self, kind: EffectKind) -> Option<&ActiveEffect> {
        self.effects.iter().find(|e| e.kind == kind)
    }

    /// Remove and return every effect with `now >= expires_at`, in application order.
    pub fn take_expired(&mut self, now: f64) -> Vec<ActiveEffect> {
        let mut expired = Vec::new();
        self.effects.retain(|e| {
            if now >= e.expires_at {
                expired.push(*e);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn drain(&mut self) -> Vec<ActiveEffect> {
        std::mem::take(&mut self.effects)
    }

    pub fn kinds(&self) -> Vec<EffectKind> {
        self.effects.iter().map(|e| e.kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Room {
    /// Put `kind` on a player for `duration` seconds.
    ///
    /// Returns `Ok(false)` when an immune player shrugs off a negative effect.
    pub(crate) fn apply_player_effect(
        &mut self,
        player_id: u32,
        kind: EffectKind,
        duration: f64,
    ) -> Result<bool, RoomError> {
        let now = self.now;
        let player = self
            .roster
            .players
            .get_mut(&player_id)
            .ok_or(RoomError::MissingPlayer(player_id))?;

        if kind.is_negative() && player.immune {
            debug!("Player {} is immune to {:?}", player_id, kind);
            return Ok(false);
        }

        let value = match kind {
            EffectKind::DoublePoints => DOUBLE_POINTS_MULTIPLIER,
            _ => 1.0,
        };
        let fresh = player.effects.apply(kind, now + duration, value);
        if !fresh {
            return Ok(true);
        }

        match kind {
            EffectKind::Immunity => player.immune = true,
            EffectKind::DoublePoints => {}
            EffectKind::Frozen => {
                if let Some(body) = self.registry.lookup(EntityId::Player(player_id)) {
                    if let Err(e) = self.world.set_body_kind(body, BodyKind::Fixed) {
                        warn!("Failed to freeze player {}: {}", player_id, e);
                    }
                }
            }
            EffectKind::Ghost => {
                if let Some(body) = self.registry.lookup(EntityId::Player(player_id)) {
                    if let Some(current) = self.world.collision_groups(body) {
                        let ghosted = current.without_filter(groups::BALL);
                        if let Err(e) = self.world.set_collision_groups(body, ghosted) {
                            warn!("Failed to ghost player {}: {}", player_id, e);
                        }
                    }
                }
                self.broadcast(ServerMsg::PlayerGhosted(PlayerRefMsg { player_id }));
            }
        }
        Ok(true)
    }

    /// End every effect whose time has come and undo what it did.
    pub(crate) fn sweep_effects(&mut self) {
        let now = self.now;
        let ids: Vec<u32> = self.roster.players.keys().copied().collect();
        for id in ids {
            let expired = match self.roster.players.get_mut(&id) {
                Some(player) => player.effects.take_expired(now),
                None => continue,
            };
            for effect in expired {
                self.undo_effect(id, effect.kind);
            }
        }
    }

    fn undo_effect(&mut self, player_id: u32, kind: EffectKind) {
        let body = self.registry.lookup(EntityId::Player(player_id));
        match kind {
            EffectKind::Immunity => {
                if let Some(player) = self.roster.players.get_mut(&player_id) {
                    player.immune = false;
                }
            }
            EffectKind::DoublePoints => {}
            EffectKind::Frozen => {
                if let Some(body) = body {
                    if let Err(e) = self.world.set_body_kind(body, BodyKind::Kinematic) {
                        warn!("Failed to unfreeze player {}: {}", player_id, e);
                    }
                }
            }
            EffectKind::Ghost => {
                if let Some(body) = body {
                    if let Some(current) = self.world.collision_groups(body) {
                        let restored = current.with_filter(groups::BALL);
                        if let Err(e) = self.world.set_collision_groups(body, restored) {
                            warn!("Failed to restore player {} filter: {}", player_id, e);
                        }
                    }
                }
                self.broadcast(ServerMsg::PlayerVisible(PlayerRefMsg { player_id }));
            }
        }
        debug!("Effect {:?} ended for player {}", kind, player_id);
        self.broadcast(ServerMsg::RemoveEffect(RemoveEffectMsg {
            player_id,
            effect: kind,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::test_support::{active_room, drain_events};
    use blitz_shared::config::BlitzConfig;

    #[test]
    fn reapplying_refreshes_instead_of_duplicating() {
        let mut list = EffectList::default();
        assert!(list.apply(EffectKind::Ghost, 5.0, 1.0));
        assert!(!list.apply(EffectKind::Ghost, 8.0, 1.0));
        assert_eq!(list.kinds(), vec![EffectKind::Ghost]);
        assert_eq!(list.get(EffectKind::Ghost).map(|e| e.expires_at), Some(8.0));
    }

    #[test]
    fn expiry_is_inclusive_at_deadline() {
        let mut list = EffectList::default();
        list.apply(EffectKind::Frozen, 3.0, 1.0);
        assert!(list.take_expired(2.999).is_empty());
        assert!(list.has(EffectKind::Frozen));
        assert_eq!(list.take_expired(3.0).len(), 1);
        assert!(list.is_empty());
        assert!(list.take_expired(10.0).is_empty());
    }

    #[test]
    fn ghost_expires_exactly_once_and_restores_filter() {
        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        let body = room.registry.lookup(EntityId::Player(red)).unwrap();
        let original = room.world.collision_groups(body).unwrap();

        let duration = room.config.ghost_secs;
        assert_eq!(
            room.apply_player_effect(red, EffectKind::Ghost, duration),
            Ok(true)
        );
        let ghosted = room.world.collision_groups(body).unwrap();
        assert_eq!(ghosted.filter & groups::BALL, 0);

        let expires_at = room.now + duration;
        room.now = expires_at - 0.01;
        room.sweep_effects();
        assert!(room.player(red).unwrap().effects.has(EffectKind::Ghost));
        drain_events(&mut room);

        room.now = expires_at;
        room.sweep_effects();
        assert_eq!(room.world.collision_groups(body), Some(original));
        let events = drain_events(&mut room);
        let removals = events
            .iter()
            .filter(|m| matches!(m, ServerMsg::RemoveEffect(r) if r.player_id == red))
            .count();
        assert_eq!(removals, 1);
        assert!(events
            .iter()
            .any(|m| matches!(m, ServerMsg::PlayerVisible(r) if r.player_id == red)));

        room.now = expires_at + 5.0;
        room.sweep_effects();
        assert!(drain_events(&mut room).is_empty());
    }

    #[test]
    fn immune_player_shrugs_off_freeze() {
        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        room.apply_player_effect(red, EffectKind::Immunity, 10.0)
            .unwrap();
        assert!(room.player(red).unwrap().immune);
        assert_eq!(
            room.apply_player_effect(red, EffectKind::Frozen, 3.0),
            Ok(false)
        );
        let body = room.registry.lookup(EntityId::Player(red)).unwrap();
        assert_eq!(room.world.body_kind(body), Some(BodyKind::Kinematic));

        room.now += 10.0;
        room.sweep_effects();
        assert!(!room.player(red).unwrap().immune);
    }

    #[test]
    fn freeze_fixes_body_until_swept() {
        let (mut room, red, _blue) = active_room(BlitzConfig::default());
        let body = room.registry.lookup(EntityId::Player(red)).unwrap();
        room.apply_player_effect(red, EffectKind::Frozen, 3.0)
            .unwrap();
        assert_eq!(room.world.body_kind(body), Some(BodyKind::Fixed));

        room.now += 3.0;
        room.sweep_effects();
        assert_eq!(room.world.body_kind(body), Some(BodyKind::Kinematic));
    }
}
