//! Side table between game entities and the physics bodies that represent them.
//!
//! Every body the room creates is registered here under an [`EntityId`] with a [`Role`], and
//! contact pairs coming out of the world are resolved back to entities through the reverse map.
//! A body that has been unregistered resolves to nothing, so late contacts against it are
//! dropped instead of acting on a stale entity.

use crate::physics::{BodyHandle, PhysicsError, PhysicsWorld};
use blitz_shared::protocol::TeamId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Ball(u32),
    Player(u32),
    /// Goal mouth sensor of the team that defends it
    Goal(TeamId),
    /// Ice wall in front of the given team's goal
    IceWall(TeamId),
    Ground,
    /// Side, end and crossbar colliders, numbered at field build time
    Boundary(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Ball,
    Player,
    Goal,
    Ground,
    Wall,
}

impl Role {
    /// Roles whose transforms are copied into replicated state every tick.
    pub fn is_mirrored(self) -> bool {
        matches!(self, Role::Ball | Role::Player)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub body: BodyHandle,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct PhysicsRegistry {
    entries: BTreeMap<EntityId, RegistryEntry>,
    by_body: HashMap<BodyHandle, EntityId>,
}

impl PhysicsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. Returns the entry it replaced, whose body is no longer indexed.
    pub fn register(&mut self, id: EntityId, body: BodyHandle, role: Role) -> Option<RegistryEntry> {
        let previous = self.entries.insert(id, RegistryEntry { body, role });
        if let Some(prev) = previous {
            self.by_body.remove(&prev.body);
        }
        self.by_body.insert(body, id);
        previous
    }

    pub fn unregister(&mut self, id: EntityId) -> Option<RegistryEntry> {
        let entry = self.entries.remove(&id)?;
        self.by_body.remove(&entry.body);
        Some(entry)
    }

    pub fn lookup(&self, id: EntityId) -> Option<BodyHandle> {
        self.entries.get(&id).map(|e| e.body)
    }

    pub fn entity_for_body(&self, body: BodyHandle) -> Option<(EntityId, Role)> {
        let id = *self.by_body.get(&body)?;
        self.entries.get(&id).map(|e| (id, e.role))
    }

    /// Unregister `id` and remove its body from the world.
    ///
    /// Returns `Ok(false)` if nothing was registered under `id`. The registry entry is gone
    /// even when the world no longer knows the body.
    pub fn despawn(
        &mut self,
        world: &mut dyn PhysicsWorld,
        id: EntityId,
    ) -> Result<bool, PhysicsError> {
        match self.unregister(id) {
            Some(entry) => {
                world.remove_body(entry.body)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every registered body. Returns how many the world still knew.
    pub fn despawn_all(&mut self, world: &mut dyn PhysicsWorld) -> usize {
        let entries = std::mem::take(&mut self.entries);
        self.by_body.clear();
        entries
            .values()
            .filter(|e| world.remove_body(e.body).is_ok())
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, RegistryEntry)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, *e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
