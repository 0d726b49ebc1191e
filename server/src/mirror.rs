//! Copies body transforms into replicated records after every physics step.

use crate::ball::Ball;
use crate::physics::{BodyState, PhysicsWorld};
use crate::player::Player;
use crate::registry::{EntityId, PhysicsRegistry};
use std::collections::BTreeMap;

/// A replicated record backed by a physics body.
pub trait Mirrored {
    fn mirror(&mut self, state: &BodyState);
}

impl Mirrored for Ball {
    fn mirror(&mut self, state: &BodyState) {
        self.position = state.position;
        self.orientation = state.orientation;
        self.velocity = state.linvel;
    }
}

impl Mirrored for Player {
    fn mirror(&mut self, state: &BodyState) {
        self.position = state.position;
        self.velocity = state.linvel;
    }
}

/// Mirror every ball and player body. Entries without a record, or whose body the world no
/// longer knows, are skipped. Returns how many records were updated.
pub fn sync(
    registry: &PhysicsRegistry,
    world: &dyn PhysicsWorld,
    balls: &mut BTreeMap<u32, Ball>,
    players: &mut BTreeMap<u32, Player>,
) -> usize {
    let mut synced = 0;
    for (id, entry) in registry.iter() {
        if !entry.role.is_mirrored() {
            continue;
        }
        let record: Option<&mut dyn Mirrored> = match id {
            EntityId::Ball(ball_id) => balls.get_mut(&ball_id).map(|b| b as &mut dyn Mirrored),
            EntityId::Player(player_id) => {
                players.get_mut(&player_id).map(|p| p as &mut dyn Mirrored)
            }
            _ => None,
        };
        let (Some(record), Some(state)) = (record, world.body_state(entry.body)) else {
            continue;
        };
        record.mirror(&state);
        synced += 1;
    }
    synced
}
