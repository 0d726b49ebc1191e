use super::{
    BodyDesc, BodyHandle, BodyKind, BodyState, CollisionGroups, ContactPair, PhysicsError,
    PhysicsWorld, Shape,
};
use blitz_shared::vec3::{Quat, Vec3};
use std::sync::mpsc::{channel, Receiver};
use rapier3d::prelude::{
    ActiveEvents, BroadPhaseBvh, CCDSolver, ChannelEventCollector, Collider, ColliderBuilder,
    ColliderHandle, ColliderSet, CollisionEvent, Group, ImpulseJointSet, IntegrationParameters,
    InteractionGroups, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline, Real,
    RigidBody, RigidBodyBuilder, RigidBodyHandle, RigidBodySet, RigidBodyType, Vector,
};
use std::collections::BTreeMap;

const DEFAULT_GRAVITY: f64 = -9.81;
/// Longest integration step; longer frames are split into substeps
const MAX_SUBSTEP: f64 = 1.0 / 60.0;
const MAX_SUBSTEPS: u32 = 8;
const ANGULAR_DAMPING: Real = 0.5;
const FRICTION: Real = 0.4;

/// Rapier bodies and colliders behind one room handle.
#[derive(Debug, Clone, Copy)]
struct Slot {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    groups: CollisionGroups,
}

/// Rapier-backed [`PhysicsWorld`]. Every body has exactly one collider, and the collider's
/// user data carries the room handle so collision events map straight back.
pub struct RapierWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    events: ChannelEventCollector,
    collisions: Receiver<CollisionEvent>,
    slots: BTreeMap<BodyHandle, Slot>,
    next_handle: u32,
}

impl RapierWorld {
    pub fn new() -> Self {
        Self::with_gravity(DEFAULT_GRAVITY)
    }

    pub fn with_gravity(gravity: f64) -> Self {
        let (collision_send, collisions) = channel();
        // Contact force events are never enabled on our colliders
        let (force_send, _) = channel();
        Self {
            gravity: Vector::new(0.0, gravity as Real, 0.0),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            events: ChannelEventCollector::new(collision_send, force_send),
            collisions,
            slots: BTreeMap::new(),
            next_handle: 1,
        }
    }

    fn slot(&self, handle: BodyHandle) -> Result<Slot, PhysicsError> {
        self.slots
            .get(&handle)
            .copied()
            .ok_or(PhysicsError::UnknownBody(handle))
    }

    fn rigid_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.slots
            .get(&handle)
            .and_then(|slot| self.bodies.get(slot.body))
    }

    fn rigid_body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody, PhysicsError> {
        let slot = self.slot(handle)?;
        self.bodies
            .get_mut(slot.body)
            .ok_or(PhysicsError::UnknownBody(handle))
    }

    fn owner(&self, collider: ColliderHandle) -> Option<BodyHandle> {
        self.colliders
            .get(collider)
            .map(|c| BodyHandle(c.user_data as u32))
    }

    /// Pull begin-contact events out of the collector, dropping pairs whose bodies are gone.
    fn drain_started(&self, contacts: &mut Vec<ContactPair>) {
        while let Ok(event) = self.collisions.try_recv() {
            if let CollisionEvent::Started(c1, c2, _) = event {
                if let (Some(a), Some(b)) = (self.owner(c1), self.owner(c2)) {
                    contacts.push(ContactPair { a, b });
                }
            }
        }
    }
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn to_vector(v: Vec3) -> Vector<Real> {
    Vector::new(v.x as Real, v.y as Real, v.z as Real)
}

fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x as f64, v.y as f64, v.z as f64)
}

fn interaction_groups(groups: CollisionGroups) -> InteractionGroups {
    InteractionGroups::all()
        .with_memberships(Group::from_bits_truncate(groups.memberships))
        .with_filter(Group::from_bits_truncate(groups.filter))
}

fn rigid_body_type(kind: BodyKind) -> RigidBodyType {
    match kind {
        BodyKind::Dynamic => RigidBodyType::Dynamic,
        BodyKind::Kinematic => RigidBodyType::KinematicPositionBased,
        BodyKind::Fixed => RigidBodyType::Fixed,
    }
}

fn collider_from_desc(desc: &BodyDesc, handle: BodyHandle) -> Collider {
    let builder = match desc.shape {
        Shape::Sphere { radius } => ColliderBuilder::ball(radius as Real),
        Shape::Cuboid { half_extents } => ColliderBuilder::cuboid(
            half_extents.x as Real,
            half_extents.y as Real,
            half_extents.z as Real,
        ),
    };
    builder
        .sensor(desc.sensor)
        .restitution(desc.restitution as Real)
        .friction(FRICTION)
        .collision_groups(interaction_groups(desc.groups))
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .user_data(handle.0 as u128)
        .build()
}

impl PhysicsWorld for RapierWorld {
    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);

        let body = RigidBodyBuilder::new(rigid_body_type(desc.kind))
            .translation(to_vector(desc.position))
            .linear_damping(desc.linear_damping as Real)
            .angular_damping(ANGULAR_DAMPING)
            .build();
        let body_handle = self.bodies.insert(body);
        let collider = self.colliders.insert_with_parent(
            collider_from_desc(&desc, handle),
            body_handle,
            &mut self.bodies,
        );

        self.slots.insert(
            handle,
            Slot {
                body: body_handle,
                collider,
                groups: desc.groups,
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> Result<(), PhysicsError> {
        let slot = self
            .slots
            .remove(&handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        // Removing the body takes its collider with it
        self.bodies.remove(
            slot.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        Ok(())
    }

    fn step(&mut self, dt: f64) -> Vec<ContactPair> {
        let mut contacts = Vec::new();
        if !dt.is_finite() || dt <= 0.0 {
            return contacts;
        }

        let substeps = ((dt / MAX_SUBSTEP).ceil() as u32).clamp(1, MAX_SUBSTEPS);
        self.params.dt = (dt / substeps as f64) as Real;
        for _ in 0..substeps {
            self.pipeline.step(
                &self.gravity,
                &self.params,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd,
                &(),
                &self.events,
            );
            self.drain_started(&mut contacts);
        }
        contacts
    }

    fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        self.rigid_body(handle).map(|rb| {
            let rot = rb.rotation();
            BodyState {
                position: from_vector(rb.translation()),
                orientation: Quat {
                    w: rot.w as f64,
                    x: rot.i as f64,
                    y: rot.j as f64,
                    z: rot.k as f64,
                },
                linvel: from_vector(rb.linvel()),
                angvel: from_vector(rb.angvel()),
            }
        })
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec3) -> Result<(), PhysicsError> {
        let rb = self.rigid_body_mut(handle)?;
        rb.set_translation(to_vector(position), true);
        rb.set_linvel(Vector::zeros(), true);
        rb.set_angvel(Vector::zeros(), true);
        Ok(())
    }

    fn move_kinematic(&mut self, handle: BodyHandle, target: Vec3) -> Result<(), PhysicsError> {
        let rb = self.rigid_body_mut(handle)?;
        if !rb.is_kinematic() {
            return Err(PhysicsError::NotKinematic(handle));
        }
        rb.set_next_kinematic_translation(to_vector(target));
        Ok(())
    }

    fn set_linvel(&mut self, handle: BodyHandle, linvel: Vec3) -> Result<(), PhysicsError> {
        self.rigid_body_mut(handle)?
            .set_linvel(to_vector(linvel), true);
        Ok(())
    }

    fn body_kind(&self, handle: BodyHandle) -> Option<BodyKind> {
        self.rigid_body(handle).map(|rb| match rb.body_type() {
            RigidBodyType::Dynamic => BodyKind::Dynamic,
            RigidBodyType::Fixed => BodyKind::Fixed,
            _ => BodyKind::Kinematic,
        })
    }

    fn set_body_kind(&mut self, handle: BodyHandle, kind: BodyKind) -> Result<(), PhysicsError> {
        let rb = self.rigid_body_mut(handle)?;
        rb.set_body_type(rigid_body_type(kind), true);
        if kind != BodyKind::Dynamic {
            rb.set_linvel(Vector::zeros(), true);
            rb.set_angvel(Vector::zeros(), true);
        }
        Ok(())
    }

    fn collision_groups(&self, handle: BodyHandle) -> Option<CollisionGroups> {
        self.slots.get(&handle).map(|slot| slot.groups)
    }

    fn set_collision_groups(
        &mut self,
        handle: BodyHandle,
        groups: CollisionGroups,
    ) -> Result<(), PhysicsError> {
        let slot = self
            .slots
            .get_mut(&handle)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        let collider = self
            .colliders
            .get_mut(slot.collider)
            .ok_or(PhysicsError::UnknownBody(handle))?;
        collider.set_collision_groups(interaction_groups(groups));
        slot.groups = groups;
        Ok(())
    }

    fn body_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::groups;
    use blitz_shared::vec3::vec3;

    fn ground() -> BodyDesc {
        BodyDesc::fixed(Shape::Cuboid {
            half_extents: vec3(50.0, 0.5, 50.0),
        })
        .at(vec3(0.0, -0.5, 0.0))
        .with_groups(CollisionGroups::new(groups::WORLD, groups::ALL))
    }

    fn ball_at(pos: Vec3) -> BodyDesc {
        BodyDesc::dynamic(Shape::Sphere { radius: 0.5 })
            .at(pos)
            .with_groups(CollisionGroups::new(groups::BALL, groups::ALL))
            .with_restitution(0.5)
    }

    fn touches(contacts: &[ContactPair], x: BodyHandle, y: BodyHandle) -> bool {
        contacts
            .iter()
            .any(|c| (c.a == x && c.b == y) || (c.a == y && c.b == x))
    }

    #[test]
    fn ball_falls_under_gravity() {
        let mut world = RapierWorld::new();
        let ball = world.add_body(ball_at(vec3(0.0, 10.0, 0.0)));
        world.step(0.5);
        let state = world.body_state(ball).unwrap();
        assert!(state.position.y < 10.0);
        assert!(state.linvel.y < 0.0);
    }

    #[test]
    fn ball_comes_to_rest_on_ground() {
        let mut world = RapierWorld::new();
        world.add_body(ground());
        let ball = world.add_body(ball_at(vec3(0.0, 3.0, 0.0)));
        for _ in 0..600 {
            world.step(1.0 / 60.0);
        }
        let state = world.body_state(ball).unwrap();
        assert!(state.position.y > 0.4, "ball sank to {}", state.position.y);
        assert!(state.position.y < 0.6);
    }

    #[test]
    fn resting_contact_reported_once() {
        let mut world = RapierWorld::with_gravity(0.0);
        let floor = world.add_body(ground());
        let ball = world.add_body(ball_at(vec3(0.0, 0.45, 0.0)));
        let first = world.step(1.0 / 60.0);
        assert!(touches(&first, floor, ball));
        world.set_position(ball, vec3(0.0, 0.45, 0.0)).unwrap();
        let second = world.step(1.0 / 60.0);
        assert!(second.is_empty(), "resting contact must not repeat");
    }

    #[test]
    fn sensor_reports_without_pushing() {
        let mut world = RapierWorld::with_gravity(0.0);
        let sensor = world.add_body(
            BodyDesc::fixed(Shape::Cuboid {
                half_extents: vec3(1.0, 1.0, 1.0),
            })
            .sensor(),
        );
        let ball = world.add_body(ball_at(vec3(0.0, 0.0, 0.0)));
        world.set_linvel(ball, vec3(1.0, 0.0, 0.0)).unwrap();
        let contacts = world.step(0.1);
        assert!(touches(&contacts, sensor, ball));
        let state = world.body_state(ball).unwrap();
        assert!((state.linvel.x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn filtered_pairs_never_touch() {
        let mut world = RapierWorld::with_gravity(0.0);
        let ghost = world.add_body(
            BodyDesc::kinematic(Shape::Sphere { radius: 1.0 }).with_groups(
                CollisionGroups::new(groups::TEAM_RED, groups::ALL).without_filter(groups::BALL),
            ),
        );
        let ball = world.add_body(ball_at(vec3(0.5, 0.0, 0.0)));
        let contacts = world.step(1.0 / 60.0);
        assert!(contacts.is_empty());
        assert!(world.body_state(ghost).is_some());
        assert!((world.body_state(ball).unwrap().position.x - 0.5).abs() < 1e-4);
    }

    #[test]
    fn regrouping_a_body_lets_it_collide_again() {
        let mut world = RapierWorld::with_gravity(0.0);
        let player = CollisionGroups::new(groups::TEAM_RED, groups::ALL);
        let ghost = world.add_body(
            BodyDesc::kinematic(Shape::Sphere { radius: 1.0 })
                .with_groups(player.without_filter(groups::BALL)),
        );
        let ball = world.add_body(ball_at(vec3(0.5, 0.0, 0.0)));
        assert!(world.step(1.0 / 60.0).is_empty());

        world.set_collision_groups(ghost, player).unwrap();
        assert_eq!(world.collision_groups(ghost), Some(player));
        let contacts = world.step(1.0 / 60.0);
        assert!(touches(&contacts, ghost, ball));
    }

    #[test]
    fn kinematic_body_pushes_ball() {
        let mut world = RapierWorld::with_gravity(0.0);
        let player = world.add_body(
            BodyDesc::kinematic(Shape::Sphere { radius: 0.75 }).at(vec3(-2.0, 0.0, 0.0)),
        );
        let ball = world.add_body(ball_at(vec3(0.0, 0.0, 0.0)));
        for i in 1..=30 {
            let x = -2.0 + i as f64 * 0.1;
            world.move_kinematic(player, vec3(x, 0.0, 0.0)).unwrap();
            world.step(1.0 / 60.0);
        }
        let state = world.body_state(ball).unwrap();
        assert!(state.position.x > 0.5, "ball should be pushed away");
    }

    #[test]
    fn fixed_body_rejects_kinematic_moves() {
        let mut world = RapierWorld::new();
        let body = world.add_body(BodyDesc::kinematic(Shape::Sphere { radius: 0.75 }));
        world.set_body_kind(body, BodyKind::Fixed).unwrap();
        assert_eq!(world.body_kind(body), Some(BodyKind::Fixed));
        assert_eq!(
            world.move_kinematic(body, vec3(1.0, 0.0, 0.0)),
            Err(PhysicsError::NotKinematic(body))
        );
    }

    #[test]
    fn removed_body_is_unknown() {
        let mut world = RapierWorld::new();
        let ball = world.add_body(ball_at(Vec3::ZERO));
        world.remove_body(ball).unwrap();
        assert_eq!(world.remove_body(ball), Err(PhysicsError::UnknownBody(ball)));
        assert!(world.body_state(ball).is_none());
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn non_positive_dt_is_ignored() {
        let mut world = RapierWorld::new();
        let ball = world.add_body(ball_at(vec3(0.0, 5.0, 0.0)));
        assert!(world.step(0.0).is_empty());
        assert!(world.step(f64::NAN).is_empty());
        assert_eq!(world.body_state(ball).unwrap().position.y, 5.0);
    }
}
