/// Gameplay configuration for a Blitz room. Sent to clients in `welcome`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BlitzConfig {
    /// Maximum players per team
    pub team_capacity: u32,
    /// Seconds between both teams being ready and the pre-round
    pub starting_countdown_secs: u32,
    /// Seconds between teleport-in and kickoff
    pub pre_round_countdown_secs: u32,
    /// Length of the main match clock (seconds)
    pub match_secs: u32,
    /// Seconds between match end and lobby reset
    pub cooldown_secs: u32,
    /// Balls put into play at kickoff
    pub starting_balls: u32,
    pub max_active_powerups: u32,
    /// Bounds of the random power-up spawn delay (seconds)
    pub powerup_spawn_delay_min: f64,
    pub powerup_spawn_delay_max: f64,
    pub double_points_secs: f64,
    pub immunity_secs: f64,
    pub ghost_secs: f64,
    pub freeze_secs: f64,
    pub ice_wall_secs: f64,
    /// Dust credited to every player of the winning team
    pub win_dust: u32,
    /// Extra dust for the match's top scorer
    pub top_scorer_dust: u32,
    /// Largest accepted displacement for a single player-move (meters)
    pub max_move_distance: f64,
    pub arena_half_width: f64,
    pub arena_half_length: f64,
    pub goal_half_width: f64,
    pub goal_height: f64,
    pub ball_radius: f64,
    pub player_radius: f64,
    /// Balls below this height are considered lost and replaced
    pub kill_plane_y: f64,
}

impl Default for BlitzConfig {
    fn default() -> Self {
        Self {
            team_capacity: 5,
            starting_countdown_secs: 10,
            pre_round_countdown_secs: 3,
            match_secs: 180,
            cooldown_secs: 10,
            starting_balls: 1,
            max_active_powerups: 2,
            powerup_spawn_delay_min: 5.0,
            powerup_spawn_delay_max: 15.0,
            double_points_secs: 15.0,
            immunity_secs: 10.0,
            ghost_secs: 8.0,
            freeze_secs: 3.0,
            ice_wall_secs: 10.0,
            win_dust: 50,
            top_scorer_dust: 25,
            max_move_distance: 5.0,
            arena_half_width: 20.0,
            arena_half_length: 30.0,
            goal_half_width: 5.0,
            goal_height: 4.0,
            ball_radius: 0.5,
            player_radius: 0.75,
            kill_plane_y: -10.0,
        }
    }
}

impl BlitzConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.team_capacity == 0 {
            return Err("team_capacity must be > 0".to_string());
        }
        for (name, secs) in [
            ("starting_countdown_secs", self.starting_countdown_secs),
            ("pre_round_countdown_secs", self.pre_round_countdown_secs),
            ("match_secs", self.match_secs),
            ("cooldown_secs", self.cooldown_secs),
        ] {
            if secs == 0 {
                return Err(format!("{} must be > 0", name));
            }
        }
        if !self.powerup_spawn_delay_min.is_finite() || self.powerup_spawn_delay_min <= 0.0 {
            return Err("powerup_spawn_delay_min must be finite and > 0".to_string());
        }
        if !self.powerup_spawn_delay_max.is_finite()
            || self.powerup_spawn_delay_max < self.powerup_spawn_delay_min
        {
            return Err(
                "powerup_spawn_delay_max must be finite and >= powerup_spawn_delay_min".to_string(),
            );
        }
        for (name, secs) in [
            ("double_points_secs", self.double_points_secs),
            ("immunity_secs", self.immunity_secs),
            ("ghost_secs", self.ghost_secs),
            ("freeze_secs", self.freeze_secs),
            ("ice_wall_secs", self.ice_wall_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(format!("{} must be finite and > 0", name));
            }
        }
        if !self.max_move_distance.is_finite() || self.max_move_distance <= 0.0 {
            return Err("max_move_distance must be finite and > 0".to_string());
        }
        if self.goal_half_width >= self.arena_half_width {
            return Err("goal_half_width must be < arena_half_width".to_string());
        }
        if self.ball_radius <= 0.0 || self.player_radius <= 0.0 {
            return Err("ball_radius and player_radius must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blitz_config_is_valid() {
        assert!(BlitzConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_spawn_delays_invalid() {
        let config = BlitzConfig {
            powerup_spawn_delay_min: 10.0,
            powerup_spawn_delay_max: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_invalid() {
        let config = BlitzConfig {
            team_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_length_phases_invalid() {
        let zeroed = [
            BlitzConfig {
                starting_countdown_secs: 0,
                ..Default::default()
            },
            BlitzConfig {
                pre_round_countdown_secs: 0,
                ..Default::default()
            },
            BlitzConfig {
                match_secs: 0,
                ..Default::default()
            },
            BlitzConfig {
                cooldown_secs: 0,
                ..Default::default()
            },
        ];
        for config in zeroed {
            let err = config.validate().unwrap_err();
            assert!(err.ends_with("must be > 0"), "unexpected error: {}", err);
        }
    }

    #[test]
    fn goal_wider_than_arena_invalid() {
        let config = BlitzConfig {
            goal_half_width: 25.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
