//! Physics world boundary.
//!
//! The room talks to physics only through [`PhysicsWorld`]: add and remove bodies, step the
//! world, read transforms back, and collect the contact pairs that started touching during a
//! step. [`RapierWorld`] backs it with rapier3d.

mod rapier;

pub use rapier::RapierWorld;

use blitz_shared::vec3::{Quat, Vec3};
use thiserror::Error;

/// Opaque handle to a body owned by the physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Collision group bits. A body's memberships say what it is, its filter says what it
/// collides with.
pub mod groups {
    pub const BALL: u32 = 1 << 0;
    pub const TEAM_RED: u32 = 1 << 1;
    pub const TEAM_BLUE: u32 = 1 << 2;
    pub const WORLD: u32 = 1 << 3;
    pub const GOAL: u32 = 1 << 4;
    pub const ICE_WALL: u32 = 1 << 5;
    pub const PROJECTILE: u32 = 1 << 6;
    pub const ALL: u32 = u32::MAX;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionGroups {
    pub memberships: u32,
    pub filter: u32,
}

impl CollisionGroups {
    pub const fn new(memberships: u32, filter: u32) -> Self {
        Self {
            memberships,
            filter,
        }
    }

    /// Two bodies interact only if each one's memberships intersect the other's filter.
    pub fn interacts_with(&self, other: &CollisionGroups) -> bool {
        (self.memberships & other.filter) != 0 && (other.memberships & self.filter) != 0
    }

    pub fn without_filter(self, bits: u32) -> Self {
        Self {
            memberships: self.memberships,
            filter: self.filter & !bits,
        }
    }

    pub fn with_filter(self, bits: u32) -> Self {
        Self {
            memberships: self.memberships,
            filter: self.filter | bits,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Integrated under gravity and pushed by contacts
    Dynamic,
    /// Moved only by explicit targets; pushes dynamic bodies
    Kinematic,
    /// Never moves
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f64 },
    /// Axis-aligned box given by half extents
    Cuboid { half_extents: Vec3 },
}

/// Everything needed to create a body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub shape: Shape,
    pub position: Vec3,
    pub groups: CollisionGroups,
    /// Sensors report contacts but never push anything
    pub sensor: bool,
    pub restitution: f64,
    pub linear_damping: f64,
}

impl BodyDesc {
    fn new(kind: BodyKind, shape: Shape) -> Self {
        Self {
            kind,
            shape,
            position: Vec3::ZERO,
            groups: CollisionGroups::new(groups::ALL, groups::ALL),
            sensor: false,
            restitution: 0.0,
            linear_damping: 0.0,
        }
    }

    pub fn dynamic(shape: Shape) -> Self {
        Self::new(BodyKind::Dynamic, shape)
    }

    pub fn kinematic(shape: Shape) -> Self {
        Self::new(BodyKind::Kinematic, shape)
    }

    pub fn fixed(shape: Shape) -> Self {
        Self::new(BodyKind::Fixed, shape)
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_groups(mut self, groups: CollisionGroups) -> Self {
        self.groups = groups;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_linear_damping(mut self, damping: f64) -> Self {
        self.linear_damping = damping;
        self
    }
}

/// Transform and velocity snapshot of one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub orientation: Quat,
    pub linvel: Vec3,
    pub angvel: Vec3,
}

/// Two bodies that started touching during a step. Order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPair {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsError {
    #[error("unknown body {0:?}")]
    UnknownBody(BodyHandle),

    #[error("body {0:?} is not kinematic")]
    NotKinematic(BodyHandle),
}

/// The physics engine as seen by the room.
pub trait PhysicsWorld: Send {
    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle;

    fn remove_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError>;

    /// Advance the simulation and return the contact pairs that began during the step.
    fn step(&mut self, dt: f64) -> Vec<ContactPair>;

    fn body_state(&self, handle: BodyHandle) -> Option<BodyState>;

    /// Teleport a body and zero its velocity.
    fn set_position(&mut self, handle: BodyHandle, position: Vec3) -> Result<(), PhysicsError>;

    /// Set the position a kinematic body reaches at the end of the next step.
    fn move_kinematic(&mut self, handle: BodyHandle, target: Vec3) -> Result<(), PhysicsError>;

    fn set_linvel(&mut self, handle: BodyHandle, linvel: Vec3) -> Result<(), PhysicsError>;

    fn body_kind(&self, handle: BodyHandle) -> Option<BodyKind>;

    fn set_body_kind(&mut self, handle: BodyHandle, kind: BodyKind) -> Result<(), PhysicsError>;

    fn collision_groups(&self, handle: BodyHandle) -> Option<CollisionGroups>;

    fn set_collision_groups(
        &mut self,
        handle: BodyHandle,
        groups: CollisionGroups,
    ) -> Result<(), PhysicsError>;

    fn body_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_interact_only_when_both_filters_agree() {
        let ball = CollisionGroups::new(groups::BALL, groups::ALL);
        let player = CollisionGroups::new(groups::TEAM_RED, groups::BALL | groups::WORLD);
        assert!(ball.interacts_with(&player));
        assert!(player.interacts_with(&ball));

        let ghosted = player.without_filter(groups::BALL);
        assert!(!ball.interacts_with(&ghosted));
        assert!(!ghosted.interacts_with(&ball));
    }

    #[test]
    fn without_filter_keeps_memberships() {
        let player = CollisionGroups::new(groups::TEAM_BLUE, groups::ALL);
        let ghosted = player.without_filter(groups::BALL);
        assert_eq!(ghosted.memberships, groups::TEAM_BLUE);
        assert_eq!(ghosted.filter & groups::BALL, 0);
        assert_ne!(ghosted.filter & groups::WORLD, 0);
        assert_eq!(ghosted.with_filter(groups::BALL), player);
    }
}
