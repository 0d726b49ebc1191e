//! Arena geometry and spawn locations.
//!
//! The pitch runs along Z. Red defends the goal at `z = -half_length`, Blue the one at
//! `z = +half_length`. Each goal is a gap in the end wall with a sensor box behind the line.

use crate::physics::{groups, BodyDesc, CollisionGroups, PhysicsWorld, Shape};
use crate::registry::{EntityId, PhysicsRegistry, Role};
use blitz_shared::config::BlitzConfig;
use blitz_shared::protocol::TeamId;
use blitz_shared::vec3::{vec3, Vec3};
use rand::seq::SliceRandom;
use rand::Rng;

const WALL_HEIGHT: f64 = 3.0;
const WALL_THICKNESS: f64 = 1.0;
/// Depth of the goal pocket behind the goal line
const GOAL_DEPTH: f64 = 3.0;
const ICE_WALL_THICKNESS: f64 = 0.6;
const BALL_DROP_HEIGHT: f64 = 3.0;
const PLAYER_SPACING: f64 = 2.5;
const BALL_RESTITUTION: f64 = 0.6;
const BALL_DAMPING: f64 = 0.3;

pub fn player_groups(team: TeamId) -> CollisionGroups {
    let membership = match team {
        TeamId::Red => groups::TEAM_RED,
        TeamId::Blue => groups::TEAM_BLUE,
    };
    CollisionGroups::new(
        membership,
        groups::BALL | groups::WORLD | groups::ICE_WALL | groups::PROJECTILE,
    )
}

pub fn ball_groups() -> CollisionGroups {
    CollisionGroups::new(groups::BALL, groups::ALL)
}

fn world_groups() -> CollisionGroups {
    CollisionGroups::new(groups::WORLD, groups::ALL)
}

fn goal_groups() -> CollisionGroups {
    CollisionGroups::new(groups::GOAL, groups::BALL)
}

fn ice_wall_groups() -> CollisionGroups {
    CollisionGroups::new(
        groups::ICE_WALL,
        groups::BALL | groups::TEAM_RED | groups::TEAM_BLUE,
    )
}

/// Sign of the Z coordinate of the goal a team defends.
fn goal_side(team: TeamId) -> f64 {
    match team {
        TeamId::Red => -1.0,
        TeamId::Blue => 1.0,
    }
}

fn cuboid(half_extents: Vec3) -> Shape {
    Shape::Cuboid { half_extents }
}

/// Create every static body of the arena and register it.
pub fn build(world: &mut dyn PhysicsWorld, registry: &mut PhysicsRegistry, config: &BlitzConfig) {
    let w = config.arena_half_width;
    let l = config.arena_half_length;
    let gw = config.goal_half_width;
    let gh = config.goal_height;
    let t = WALL_THICKNESS / 2.0;
    let wh = WALL_HEIGHT;

    let ground = world.add_body(
        BodyDesc::fixed(cuboid(vec3(w + 5.0, 0.5, l + GOAL_DEPTH + 5.0)))
            .at(vec3(0.0, -0.5, 0.0))
            .with_groups(world_groups()),
    );
    registry.register(EntityId::Ground, ground, Role::Ground);

    let mut walls: Vec<(Vec3, Vec3)> = vec![
        // Side walls
        (vec3(-(w + t), wh, 0.0), vec3(t, wh, l + 2.0 * t)),
        (vec3(w + t, wh, 0.0), vec3(t, wh, l + 2.0 * t)),
    ];
    let segment_half = (w - gw) / 2.0;
    for team in TeamId::ALL {
        let z = goal_side(team);
        // End wall either side of the goal mouth
        for x in [-1.0, 1.0] {
            walls.push((
                vec3(x * (gw + segment_half), wh, z * (l + t)),
                vec3(segment_half, wh, t),
            ));
        }
        // Crossbar above the mouth
        let bar_half = (wh * 2.0 - gh) / 2.0;
        walls.push((vec3(0.0, gh + bar_half, z * (l + t)), vec3(gw, bar_half, t)));
        // Goal pocket: back and sides
        walls.push((
            vec3(0.0, wh, z * (l + GOAL_DEPTH + t)),
            vec3(gw + 2.0 * t, wh, t),
        ));
        for x in [-1.0, 1.0] {
            walls.push((
                vec3(x * (gw + t), wh, z * (l + GOAL_DEPTH / 2.0)),
                vec3(t, wh, GOAL_DEPTH / 2.0),
            ));
        }
    }

    for (i, (center, half)) in walls.into_iter().enumerate() {
        let body = world.add_body(
            BodyDesc::fixed(cuboid(half))
                .at(center)
                .with_groups(world_groups()),
        );
        registry.register(EntityId::Boundary(i as u8), body, Role::Wall);
    }

    for team in TeamId::ALL {
        let z = goal_side(team);
        let sensor = world.add_body(
            BodyDesc::fixed(cuboid(vec3(gw, gh / 2.0, GOAL_DEPTH / 2.0 - t)))
                .at(vec3(0.0, gh / 2.0, z * (l + GOAL_DEPTH / 2.0 + t)))
                .with_groups(goal_groups())
                .sensor(),
        );
        registry.register(EntityId::Goal(team), sensor, Role::Goal);
    }
}

/// Fixed wall body blocking the mouth of `team`'s goal.
pub fn ice_wall_desc(team: TeamId, config: &BlitzConfig) -> BodyDesc {
    let z = goal_side(team) * (config.arena_half_length - ICE_WALL_THICKNESS);
    BodyDesc::fixed(cuboid(vec3(
        config.goal_half_width,
        config.goal_height / 2.0,
        ICE_WALL_THICKNESS / 2.0,
    )))
    .at(vec3(0.0, config.goal_height / 2.0, z))
    .with_groups(ice_wall_groups())
}

pub fn ball_desc(position: Vec3, config: &BlitzConfig) -> BodyDesc {
    BodyDesc::dynamic(Shape::Sphere {
        radius: config.ball_radius,
    })
    .at(position)
    .with_groups(ball_groups())
    .with_restitution(BALL_RESTITUTION)
    .with_linear_damping(BALL_DAMPING)
}

pub fn player_desc(team: TeamId, position: Vec3, config: &BlitzConfig) -> BodyDesc {
    BodyDesc::kinematic(Shape::Sphere {
        radius: config.player_radius,
    })
    .at(position)
    .with_groups(player_groups(team))
}

/// Line-up points in a team's own half, shuffled.
pub fn team_spawn_points<R: Rng + ?Sized>(
    team: TeamId,
    config: &BlitzConfig,
    rng: &mut R,
) -> Vec<Vec3> {
    let n = config.team_capacity.max(1) as usize;
    let z = goal_side(team) * config.arena_half_length / 2.0;
    let mut points: Vec<Vec3> = (0..n)
        .map(|i| {
            let x = (i as f64 - (n - 1) as f64 / 2.0) * PLAYER_SPACING;
            let x = x.clamp(-config.arena_half_width + 1.0, config.arena_half_width - 1.0);
            vec3(x, config.player_radius, z)
        })
        .collect();
    points.shuffle(rng);
    points
}

/// Kickoff points around the centre spot, shuffled.
pub fn ball_spawn_points<R: Rng + ?Sized>(rng: &mut R) -> Vec<Vec3> {
    let mut points = vec![
        vec3(0.0, BALL_DROP_HEIGHT, 0.0),
        vec3(-3.0, BALL_DROP_HEIGHT, 0.0),
        vec3(3.0, BALL_DROP_HEIGHT, 0.0),
        vec3(0.0, BALL_DROP_HEIGHT, -3.0),
        vec3(0.0, BALL_DROP_HEIGHT, 3.0),
    ];
    points.shuffle(rng);
    points
}

/// Uniform point on the pitch, kept clear of the walls and goal mouths.
pub fn random_point_in_bounds<R: Rng + ?Sized>(rng: &mut R, config: &BlitzConfig) -> Vec3 {
    let x_max = (config.arena_half_width - 2.0).max(0.5);
    let z_max = (config.arena_half_length - 4.0).max(0.5);
    vec3(
        rng.gen_range(-x_max..=x_max),
        1.0,
        rng.gen_range(-z_max..=z_max),
    )
}
