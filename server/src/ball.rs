use blitz_shared::protocol::BallKind;
use blitz_shared::vec3::{Quat, Vec3};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Spawn weights per ball kind. Normal balls dominate; the rest carry a side effect on goal.
pub const BALL_KIND_WEIGHTS: [(BallKind, u32); 5] = [
    (BallKind::Normal, 50),
    (BallKind::Ice, 15),
    (BallKind::Bomb, 15),
    (BallKind::Light, 10),
    (BallKind::Ghost, 10),
];

/// A ball in play. Transform fields are mirrored from its physics body every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub id: u32,
    pub kind: BallKind,
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    /// Set once when the ball enters a goal; a scored ball never scores again
    pub scored: bool,
    /// Last player whose body touched the ball
    pub last_touch: Option<u32>,
}

impl Ball {
    pub fn new(id: u32, kind: BallKind, position: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            scored: false,
            last_touch: None,
        }
    }

    /// Flip the scored flag. Returns false if the ball had already scored.
    pub fn mark_scored(&mut self) -> bool {
        if self.scored {
            return false;
        }
        self.scored = true;
        true
    }
}

/// Weighted draw from `table`. An empty or all-zero table yields `fallback`.
pub fn weighted_pick<T: Copy, R: Rng + ?Sized>(rng: &mut R, table: &[(T, u32)], fallback: T) -> T {
    match WeightedIndex::new(table.iter().map(|(_, w)| *w)) {
        Ok(dist) => table[dist.sample(rng)].0,
        Err(_) => fallback,
    }
}

pub fn random_ball_kind<R: Rng + ?Sized>(rng: &mut R) -> BallKind {
    weighted_pick(rng, &BALL_KIND_WEIGHTS, BallKind::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    #[test]
    fn ball_scores_at_most_once() {
        let mut ball = Ball::new(1, BallKind::Normal, Vec3::ZERO);
        assert!(ball.mark_scored());
        assert!(!ball.mark_scored());
        assert!(ball.scored);
    }

    #[test]
    fn weighted_draw_follows_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut counts: HashMap<BallKind, u32> = HashMap::new();
        for _ in 0..10_000 {
            *counts.entry(random_ball_kind(&mut rng)).or_default() += 1;
        }
        let normal = counts[&BallKind::Normal];
        assert!(normal > 4_500 && normal < 5_500, "normal drawn {} times", normal);
        for (kind, _) in BALL_KIND_WEIGHTS {
            assert!(counts.get(&kind).copied().unwrap_or(0) > 0, "{:?} never drawn", kind);
        }
    }

    #[test]
    fn zero_weights_fall_back() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let table = [(BallKind::Ice, 0), (BallKind::Bomb, 0)];
        assert_eq!(weighted_pick(&mut rng, &table, BallKind::Normal), BallKind::Normal);
        assert_eq!(weighted_pick(&mut rng, &[], BallKind::Light), BallKind::Light);
    }
}
