use crate::effect::EffectList;
use blitz_shared::protocol::TeamId;
use blitz_shared::vec3::Vec3;

/// Cumulative per-match stats, flushed to the profile store when the match ends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerStats {
    /// Meters moved through accepted player-move updates
    pub distance: f64,
    pub goals: u32,
    pub wins: u32,
    pub losses: u32,
}

/// A connected client.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub color: u32,
    /// None while unassigned or spectating
    pub team: Option<TeamId>,
    /// Ready players are locked to their team
    pub ready: bool,
    pub spectating: bool,
    /// Negative effects do not land while set
    pub immune: bool,
    pub score: u32,
    pub effects: EffectList,
    pub stats: PlayerStats,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Player {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            color: color_from_id(id),
            team: None,
            ready: false,
            spectating: false,
            immune: false,
            score: 0,
            effects: EffectList::default(),
            stats: PlayerStats::default(),
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        }
    }

    /// Assigned to a team and taking part, i.e. counted in the team's player count.
    pub fn is_on_team(&self) -> bool {
        self.team.is_some() && !self.spectating
    }

    /// Counted toward readiness and kept in the match once it starts.
    pub fn is_active(&self) -> bool {
        self.is_on_team() && self.ready
    }

    /// Drop everything that only lives for one match. Team membership stays.
    pub fn reset_for_lobby(&mut self) {
        self.ready = false;
        self.spectating = false;
        self.immune = false;
        self.score = 0;
        self.effects.drain();
        self.stats = PlayerStats::default();
        self.position = Vec3::ZERO;
        self.velocity = Vec3::ZERO;
    }
}

/// Generate a color from player ID using golden angle hue distribution.
pub fn color_from_id(id: u32) -> u32 {
    let hue = id.wrapping_mul(137) % 360;
    hsv_to_rgb(hue as f64, 0.55, 0.95)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> u32 {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    let ri = ((r + m) * 255.0).round() as u32;
    let gi = ((g + m) * 255.0).round() as u32;
    let bi = ((b + m) * 255.0).round() as u32;

    (ri << 16) | (gi << 8) | bi
}
